//! Native OS services used by the discovery pipeline
//!
//! Notifications, existence checks and archive extraction sit behind
//! [`NativeService`] so the loader can be exercised without a desktop session.

use async_trait::async_trait;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum NativeError {
    #[error("failed to open archive {path}")]
    OpenArchive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid archive {path}")]
    InvalidArchive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("failed to extract {entry} from archive")]
    Extract {
        entry: String,
        #[source]
        source: io::Error,
    },
    #[error("archive extraction was cancelled")]
    Cancelled,
    #[error("archive extraction task failed: {0}")]
    Task(String),
}

#[async_trait]
pub trait NativeService: Send + Sync {
    /// Non-fatal, user-visible message
    fn show_notification(&self, message: &str, title: &str);

    async fn exists(&self, path: &Path) -> bool;

    /// Extract `archive` into `dest`; `cancel` is checked between entries
    async fn unzip(
        &self,
        archive: &Path,
        dest: &Path,
        cancel: CancellationToken,
    ) -> Result<(), NativeError>;
}

/// Desktop implementation: `notify-send` for notifications, `zip` for archives
#[derive(Debug, Default, Clone)]
pub struct DesktopNative;

#[async_trait]
impl NativeService for DesktopNative {
    fn show_notification(&self, message: &str, title: &str) {
        info!(title = %title, message = %message, "Notification");
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime for notify-send, notification only logged");
            return;
        };
        let (title, message) = (title.to_string(), message.to_string());
        runtime.spawn(async move {
            match run_notifier(NOTIFIER, &title, &message).await {
                Ok(status) if !status.success() => debug!(%status, "notify-send failed"),
                Ok(_) => {}
                Err(e) => debug!(error = %e, "notify-send unavailable, notification only logged"),
            }
        });
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn unzip(
        &self,
        archive: &Path,
        dest: &Path,
        cancel: CancellationToken,
    ) -> Result<(), NativeError> {
        let archive = archive.to_path_buf();
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || extract_archive(&archive, &dest, &cancel))
            .await
            .map_err(|e| NativeError::Task(e.to_string()))?
    }
}

const NOTIFIER: &str = "notify-send";

/// Run the notifier to completion so the child is reaped
async fn run_notifier(program: &str, title: &str, message: &str) -> io::Result<ExitStatus> {
    tokio::process::Command::new(program)
        .arg(title)
        .arg(message)
        .kill_on_drop(true)
        .status()
        .await
}

/// Blocking zip extraction; entries escaping `dest` are skipped
pub fn extract_archive(
    archive: &Path,
    dest: &Path,
    cancel: &CancellationToken,
) -> Result<(), NativeError> {
    let file = File::open(archive).map_err(|source| NativeError::OpenArchive {
        path: archive.to_path_buf(),
        source,
    })?;
    let mut zip = zip::ZipArchive::new(file).map_err(|source| NativeError::InvalidArchive {
        path: archive.to_path_buf(),
        source,
    })?;

    info!(archive = %archive.display(), dest = %dest.display(), entries = zip.len(), "Extracting archive");

    for index in 0..zip.len() {
        if cancel.is_cancelled() {
            return Err(NativeError::Cancelled);
        }

        let mut entry = zip.by_index(index).map_err(|source| NativeError::InvalidArchive {
            path: archive.to_path_buf(),
            source,
        })?;
        let name = entry.name().to_string();
        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = %name, "Skipping archive entry with unsafe path");
            continue;
        };
        let target = dest.join(relative);
        let extract_err = |source| NativeError::Extract {
            entry: name.clone(),
            source,
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&target).map_err(extract_err)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(extract_err)?;
        }
        let mut out = File::create(&target).map_err(extract_err)?;
        io::copy(&mut entry, &mut out).map_err(extract_err)?;
    }

    Ok(())
}
