//! Single-directory package parsing

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::constants::markers;
use crate::resource::ThemeManifest;
use crate::resource::schema::SchemaRegistry;

/// Why a directory with a marker file was rejected
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read marker file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("marker file {path} is not valid JSON")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("marker file {path} was rejected by its schema")]
    Rejected { path: PathBuf },
}

/// A package directory accepted by its schema
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResource {
    pub base_path: PathBuf,
    pub manifest: ThemeManifest,
}

/// Parse `base_path` with the first schema whose marker exists
///
/// `Ok(None)` means no registered marker is present, i.e. the directory is
/// not a wallpaper package at all.
pub async fn try_parse(
    registry: &SchemaRegistry,
    base_path: &Path,
) -> Result<Option<ParsedResource>, ParseError> {
    for schema in registry.schemas() {
        let marker = schema.marker_path(base_path);
        if !tokio::fs::try_exists(&marker).await.unwrap_or(false) {
            continue;
        }

        let contents = tokio::fs::read(&marker)
            .await
            .map_err(|source| ParseError::Read {
                path: marker.clone(),
                source,
            })?;
        let raw: serde_json::Value =
            serde_json::from_slice(&contents).map_err(|source| ParseError::Decode {
                path: marker.clone(),
                source,
            })?;

        let manifest = schema
            .transform(base_path, &raw)
            .ok_or(ParseError::Rejected { path: marker })?;

        if !schema.is_native() {
            write_native_manifest(base_path, &manifest).await;
        }

        return Ok(Some(ParsedResource {
            base_path: base_path.to_path_buf(),
            manifest,
        }));
    }

    Ok(None)
}

/// Parse a directory, logging and swallowing rejections
pub async fn parse_resource(registry: &SchemaRegistry, base_path: &Path) -> Option<ParsedResource> {
    match try_parse(registry, base_path).await {
        Ok(Some(parsed)) => Some(parsed),
        Ok(None) => {
            debug!(path = %base_path.display(), "No marker file, not a wallpaper package");
            None
        }
        Err(e) => {
            warn!(path = %base_path.display(), error = %e, "Rejected wallpaper package");
            None
        }
    }
}

/// Store the normalized manifest as `theme.lmw` so later scans use the native format
async fn write_native_manifest(base_path: &Path, manifest: &ThemeManifest) {
    let target = base_path.join(format!("{}.{}", markers::NATIVE_NAME, markers::NATIVE_EXT));
    let json = match serde_json::to_vec_pretty(manifest) {
        Ok(json) => json,
        Err(e) => {
            error!(path = %target.display(), error = %e, "Failed to serialize normalized manifest");
            return;
        }
    };
    if let Err(e) = tokio::fs::write(&target, json).await {
        error!(path = %target.display(), error = %e, "Failed to write normalized manifest");
    }
}
