//! Bulk discovery of wallpaper packages under the resource root
//!
//! 1. list immediate subdirectories that contain a registered marker
//! 2. parse them concurrently, each failure isolated to its directory
//! 3. map accepted packages into [`WallpaperEntry`] records
//! 4. drop entries that fail validation
//!
//! The whole pipeline is retried; when every attempt fails the player starts
//! with an empty playlist and the user is notified.

use futures::future::join_all;
use std::fmt::Display;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::constants::loader::{
    EXTRACT_FAILED_MESSAGE, LOAD_FAILED_MESSAGE, MAX_ATTEMPTS, NOTIFICATION_TITLE,
};
use crate::native::NativeService;
use crate::resource::WallpaperEntry;
use crate::resource::parser::parse_resource;
use crate::resource::schema::SchemaRegistry;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to list resource root {path}")]
    ListRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("load pipeline failed after {attempts} attempts")]
    Exhausted { attempts: usize },
}

/// Why an entry was dropped after parsing
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("entry has no name")]
    MissingName,
    #[error("playable file {0} does not exist")]
    MissingPlayFile(PathBuf),
    #[error("resource directory {0} does not exist")]
    MissingResourceDir(PathBuf),
    #[error("playable file {0} is not inside the package directory")]
    OutsidePackage(String),
}

/// Structural and file-existence checks on a catalog entry
pub async fn validate_entry(entry: &WallpaperEntry) -> Result<(), ValidationError> {
    if entry.name.trim().is_empty() {
        return Err(ValidationError::MissingName);
    }
    let src = &entry.raw_configuration.src;
    let contained = Path::new(src)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !contained || !entry.play_path.starts_with(&entry.resource_path) {
        return Err(ValidationError::OutsidePackage(src.clone()));
    }
    let is_dir = tokio::fs::metadata(&entry.resource_path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return Err(ValidationError::MissingResourceDir(entry.resource_path.clone()));
    }
    let is_file = tokio::fs::metadata(&entry.play_path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(ValidationError::MissingPlayFile(entry.play_path.clone()));
    }
    Ok(())
}

/// Run `op` up to `attempts` times, returning the first success
///
/// `op` receives the 1-based attempt number.
pub async fn retry<T, E, F, Fut>(attempts: usize, mut op: F) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                warn!(attempt = attempt, max = attempts, error = %e, "Attempt failed, retrying");
                attempt += 1;
            }
            Err(e) => {
                error!(attempt = attempt, max = attempts, error = %e, "Final attempt failed");
                return Err(e);
            }
        }
    }
}

pub struct WallpaperLoader {
    registry: Arc<SchemaRegistry>,
    native: Arc<dyn NativeService>,
    bundled_archive: Option<PathBuf>,
}

impl WallpaperLoader {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        native: Arc<dyn NativeService>,
        bundled_archive: Option<PathBuf>,
    ) -> Self {
        Self {
            registry,
            native,
            bundled_archive,
        }
    }

    /// Startup load: bootstrap the root if needed, then load with retry
    ///
    /// Never fails; an exhausted pipeline yields an empty playlist.
    pub async fn initialize(&self, root: &Path) -> Vec<WallpaperEntry> {
        self.initialize_with(root, move |_| self.load(root)).await
    }

    async fn initialize_with<F, Fut>(&self, root: &Path, load: F) -> Vec<WallpaperEntry>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<Vec<WallpaperEntry>, LoadError>>,
    {
        self.bootstrap(root).await;
        let loaded = retry(MAX_ATTEMPTS, load).await.map_err(|_| LoadError::Exhausted {
            attempts: MAX_ATTEMPTS,
        });
        match loaded {
            Ok(entries) => entries,
            Err(e) => {
                error!(root = %root.display(), error = %e, "Giving up on wallpaper resources");
                self.native
                    .show_notification(LOAD_FAILED_MESSAGE, NOTIFICATION_TITLE);
                Vec::new()
            }
        }
    }

    pub async fn load_with_retry(&self, root: &Path) -> Result<Vec<WallpaperEntry>, LoadError> {
        retry(MAX_ATTEMPTS, move |_| self.load(root))
            .await
            .map_err(|_| LoadError::Exhausted {
                attempts: MAX_ATTEMPTS,
            })
    }

    /// One pass of the pipeline
    pub async fn load(&self, root: &Path) -> Result<Vec<WallpaperEntry>, LoadError> {
        info!(
            root = %root.display(),
            markers = %self.registry.marker_files().join(", "),
            "Loading wallpaper resources"
        );

        let candidates = self.candidate_dirs(root).await?;
        let parsed = join_all(
            candidates
                .iter()
                .map(|dir| parse_resource(&self.registry, dir)),
        )
        .await;

        let entries: Vec<WallpaperEntry> = parsed
            .into_iter()
            .flatten()
            .map(WallpaperEntry::from_parsed)
            .collect();

        let checks = join_all(entries.iter().map(validate_entry)).await;
        let valid: Vec<WallpaperEntry> = entries
            .into_iter()
            .zip(checks)
            .filter_map(|(entry, check)| match check {
                Ok(()) => Some(entry),
                Err(e) => {
                    warn!(path = %entry.resource_path.display(), error = %e, "Dropping invalid wallpaper");
                    None
                }
            })
            .collect();

        info!(count = valid.len(), candidates = candidates.len(), "Loaded wallpaper resources");
        Ok(valid)
    }

    /// Immediate subdirectories holding at least one marker, sorted by name
    async fn candidate_dirs(&self, root: &Path) -> Result<Vec<PathBuf>, LoadError> {
        let list_err = |source| LoadError::ListRoot {
            path: root.to_path_buf(),
            source,
        };
        let mut reader = tokio::fs::read_dir(root).await.map_err(list_err)?;

        let mut dirs = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(list_err)? {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir && self.registry.has_marker(&entry.path()).await {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// Materialize a missing resource root from the bundled archive
    async fn bootstrap(&self, root: &Path) {
        if self.native.exists(root).await {
            return;
        }
        let Some(archive) = &self.bundled_archive else {
            warn!(root = %root.display(), "Resource root missing and no bundled archive configured");
            return;
        };
        if !self.native.exists(archive).await {
            warn!(archive = %archive.display(), "Bundled resource archive not found");
            return;
        }

        let dest = root.parent().unwrap_or(root);
        match self
            .native
            .unzip(archive, dest, CancellationToken::new())
            .await
        {
            Ok(()) => info!(dest = %dest.display(), "Extracted bundled wallpaper resources"),
            Err(e) => {
                error!(archive = %archive.display(), error = %e, "Failed to extract bundled resources");
                self.native
                    .show_notification(EXTRACT_FAILED_MESSAGE, NOTIFICATION_TITLE);
            }
        }
    }
}
