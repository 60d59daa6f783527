//! Wallpaper resource discovery
//!
//! Turns package directories under the resource root into canonical
//! [`WallpaperEntry`] records, either in bulk ([`loader`]) or incrementally
//! from filesystem notifications ([`watcher`]).

pub mod loader;
pub mod parser;
pub mod schema;
pub mod watcher;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub use loader::{WallpaperLoader, validate_entry};
pub use parser::{ParseError, ParsedResource, parse_resource};
pub use schema::{SchemaDefinition, SchemaRegistry};
pub use watcher::{DirEvent, ResourceWatcher, diff_dir_event};

/// Normalized package manifest, the shape every schema transform produces
///
/// Serialized with the field names of the native `theme.lmw` format so it can
/// be written back to disk unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeManifest {
    pub name: String,
    /// Playable file, relative to the package directory
    pub src: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub preview: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used: Option<Value>,
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_time: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessibility: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Value>,
}

/// Canonical catalog item
///
/// `id` is generated every time an entry is materialized, so entries are only
/// stable across reloads by `resource_path` / `play_path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WallpaperEntry {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub preview: String,
    pub play_path: PathBuf,
    pub resource_path: PathBuf,
    /// Resource root the entry was discovered under
    pub base_resource_path: PathBuf,
    #[serde(default)]
    pub dir_name: String,
    #[serde(default)]
    pub raw_configuration: ThemeManifest,
}

impl WallpaperEntry {
    /// Build an entry for a parsed package directory with a fresh id
    pub fn from_parsed(parsed: ParsedResource) -> Self {
        let ParsedResource { base_path, manifest } = parsed;
        let base_resource_path = base_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let dir_name = base_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            id: Uuid::new_v4(),
            name: manifest.name.clone(),
            author: manifest.author.clone(),
            description: manifest.description.clone(),
            preview: manifest.preview.clone(),
            play_path: base_path.join(&manifest.src),
            resource_path: base_path,
            base_resource_path,
            dir_name,
            raw_configuration: manifest,
        }
    }

    /// Rewrite the stored root prefix of both paths onto `new_root`
    ///
    /// Returns `None` when the paths do not live under `base_resource_path`.
    pub fn relocated(&self, new_root: &Path) -> Option<WallpaperEntry> {
        let play = self.play_path.strip_prefix(&self.base_resource_path).ok()?;
        let resource = self
            .resource_path
            .strip_prefix(&self.base_resource_path)
            .ok()?;

        let mut entry = self.clone();
        entry.play_path = new_root.join(play);
        entry.resource_path = new_root.join(resource);
        entry.base_resource_path = new_root.to_path_buf();
        Some(entry)
    }
}

/// Catalog delta communicated from discovery to the player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PlaylistChange {
    Added { configuration: WallpaperEntry },
    Deleted { id: Uuid },
    All { configuration: Vec<WallpaperEntry> },
}
