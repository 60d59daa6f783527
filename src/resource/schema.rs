//! Schema registry for wallpaper package formats
//!
//! A schema is a marker file (`name.ext`) plus a transform that turns the
//! marker's JSON into a [`ThemeManifest`]. Registration order matters: the
//! first schema whose marker exists in a directory is the only one consulted.

use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::constants::markers;
use crate::resource::ThemeManifest;

/// Transform from `(package dir, raw marker JSON)` to a manifest, `None` rejects
pub type TransformFn = Arc<dyn Fn(&Path, &Value) -> Option<ThemeManifest> + Send + Sync>;

#[derive(Clone)]
pub struct SchemaDefinition {
    pub marker_name: String,
    pub marker_ext: String,
    transform: TransformFn,
}

impl fmt::Debug for SchemaDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaDefinition")
            .field("marker", &self.marker_file())
            .finish_non_exhaustive()
    }
}

impl SchemaDefinition {
    pub fn new<F>(marker_name: impl Into<String>, marker_ext: impl Into<String>, transform: F) -> Self
    where
        F: Fn(&Path, &Value) -> Option<ThemeManifest> + Send + Sync + 'static,
    {
        Self {
            marker_name: marker_name.into(),
            marker_ext: marker_ext.into(),
            transform: Arc::new(transform),
        }
    }

    /// Marker filename, e.g. `theme.lmw`
    pub fn marker_file(&self) -> String {
        format!("{}.{}", self.marker_name, self.marker_ext)
    }

    pub fn marker_path(&self, base_path: &Path) -> PathBuf {
        base_path.join(self.marker_file())
    }

    pub fn transform(&self, base_path: &Path, raw: &Value) -> Option<ThemeManifest> {
        (self.transform)(base_path, raw)
    }

    /// Whether this schema reads the native format
    pub fn is_native(&self) -> bool {
        self.marker_name == markers::NATIVE_NAME && self.marker_ext == markers::NATIVE_EXT
    }
}

/// Ordered list of schemas, first structural match wins
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: Vec<SchemaDefinition>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the native, UpUp and Lively formats, in that order
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(SchemaDefinition::new(
            markers::NATIVE_NAME,
            markers::NATIVE_EXT,
            transform_native,
        ));
        registry.register(SchemaDefinition::new(
            markers::UPUP_NAME,
            markers::UPUP_EXT,
            transform_upup,
        ));
        registry.register(SchemaDefinition::new(
            markers::LIVELY_NAME,
            markers::LIVELY_EXT,
            transform_lively,
        ));
        registry
    }

    /// Append a schema. Duplicated markers are kept but can never match.
    pub fn register(&mut self, schema: SchemaDefinition) {
        self.schemas.push(schema);
    }

    pub fn schemas(&self) -> &[SchemaDefinition] {
        &self.schemas
    }

    pub fn marker_files(&self) -> Vec<String> {
        self.schemas.iter().map(SchemaDefinition::marker_file).collect()
    }

    /// Membership test only: does any registered marker exist under `dir`
    pub async fn has_marker(&self, dir: &Path) -> bool {
        for schema in &self.schemas {
            if tokio::fs::try_exists(schema.marker_path(dir))
                .await
                .unwrap_or(false)
            {
                return true;
            }
        }
        false
    }
}

/// First non-empty string value among `keys`
fn str_field(raw: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn string_list(raw: &Value, key: &str) -> Vec<String> {
    raw.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Native `theme.lmw` packages; requires `name` and `src`
pub fn transform_native(_base_path: &Path, raw: &Value) -> Option<ThemeManifest> {
    Some(ThemeManifest {
        name: str_field(raw, &["name"])?,
        src: str_field(raw, &["src"])?,
        author: str_field(raw, &["author"]).unwrap_or_default(),
        description: str_field(raw, &["description"]).unwrap_or_default(),
        preview: str_field(raw, &["preview"]).unwrap_or_default(),
        kind: str_field(raw, &["type"]),
        used: raw.get("used").cloned(),
        package_id: str_field(raw, &["_id"]),
        tags: string_list(raw, "tags"),
        create_time: raw.get("createTime").cloned(),
        upload_time: raw.get("uploadTime").cloned(),
        accessibility: str_field(raw, &["accessibility"]),
        version: raw.get("version").cloned(),
    })
}

/// UpUp `theme.upup` packages
pub fn transform_upup(_base_path: &Path, raw: &Value) -> Option<ThemeManifest> {
    Some(ThemeManifest {
        name: str_field(raw, &["title", "name"])?,
        src: str_field(raw, &["file", "src", "url"])?,
        author: str_field(raw, &["author"]).unwrap_or_default(),
        description: str_field(raw, &["desc", "description"]).unwrap_or_default(),
        preview: str_field(raw, &["cover", "preview"]).unwrap_or_default(),
        kind: str_field(raw, &["type"]),
        tags: string_list(raw, "tags"),
        version: raw.get("version").cloned(),
        ..Default::default()
    })
}

/// Lively `LivelyInfo.json` packages
pub fn transform_lively(_base_path: &Path, raw: &Value) -> Option<ThemeManifest> {
    let kind = raw
        .get("Type")
        .and_then(Value::as_u64)
        .map(|t| lively_kind(t).to_string());

    Some(ThemeManifest {
        name: str_field(raw, &["Title"])?,
        src: str_field(raw, &["FileName"])?,
        author: str_field(raw, &["Author"]).unwrap_or_default(),
        description: str_field(raw, &["Desc"]).unwrap_or_default(),
        preview: str_field(raw, &["Preview", "Thumbnail"]).unwrap_or_default(),
        kind,
        version: raw.get("AppVersion").cloned(),
        ..Default::default()
    })
}

/// Lively's numeric wallpaper type
fn lively_kind(kind: u64) -> &'static str {
    match kind {
        1..=3 => "html",
        4 | 8 => "video",
        5 | 9 => "image",
        _ => "app",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_order() {
        let registry = SchemaRegistry::with_builtin();
        assert_eq!(
            registry.marker_files(),
            vec!["theme.lmw", "theme.upup", "LivelyInfo.json"]
        );
        assert!(registry.schemas()[0].is_native());
        assert!(!registry.schemas()[1].is_native());
    }

    #[test]
    fn test_register_keeps_duplicates() {
        let mut registry = SchemaRegistry::with_builtin();
        registry.register(SchemaDefinition::new("theme", "lmw", |_, _| None));
        assert_eq!(registry.schemas().len(), 4);
    }

    #[test]
    fn test_native_transform_requires_name_and_src() {
        let base = Path::new("/tmp/pkg");
        assert!(transform_native(base, &json!({ "name": "Sea" })).is_none());
        assert!(transform_native(base, &json!({ "src": "a.mp4" })).is_none());
        assert!(transform_native(base, &json!({ "name": "  ", "src": "a.mp4" })).is_none());

        let manifest = transform_native(
            base,
            &json!({
                "name": "Sea",
                "src": "sea.mp4",
                "author": "kai",
                "type": "video",
                "tags": ["blue", 3, "calm"],
                "_id": "abc",
            }),
        )
        .unwrap();
        assert_eq!(manifest.name, "Sea");
        assert_eq!(manifest.src, "sea.mp4");
        assert_eq!(manifest.kind.as_deref(), Some("video"));
        assert_eq!(manifest.tags, vec!["blue", "calm"]);
        assert_eq!(manifest.package_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_upup_transform_field_fallbacks() {
        let manifest = transform_upup(
            Path::new("/tmp/pkg"),
            &json!({ "title": "Forest", "file": "forest.webm", "cover": "cover.jpg" }),
        )
        .unwrap();
        assert_eq!(manifest.name, "Forest");
        assert_eq!(manifest.src, "forest.webm");
        assert_eq!(manifest.preview, "cover.jpg");

        assert!(transform_upup(Path::new("/tmp/pkg"), &json!({ "title": "x" })).is_none());
    }

    #[test]
    fn test_lively_transform_maps_type() {
        let manifest = transform_lively(
            Path::new("/tmp/pkg"),
            &json!({
                "Title": "City",
                "FileName": "index.html",
                "Desc": "night city",
                "Thumbnail": "thumb.jpg",
                "Type": 1,
            }),
        )
        .unwrap();
        assert_eq!(manifest.kind.as_deref(), Some("html"));
        assert_eq!(manifest.description, "night city");
        assert_eq!(manifest.preview, "thumb.jpg");
        assert_eq!(lively_kind(4), "video");
        assert_eq!(lively_kind(9), "image");
        assert_eq!(lively_kind(0), "app");
    }

    #[tokio::test]
    async fn test_has_marker() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SchemaRegistry::with_builtin();
        assert!(!registry.has_marker(dir.path()).await);

        std::fs::write(dir.path().join("LivelyInfo.json"), "{}").unwrap();
        assert!(registry.has_marker(dir.path()).await);
    }
}
