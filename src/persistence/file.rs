use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::{Mutex, broadcast};
use tracing::debug;

use super::{Document, DocumentChange, DocumentStore, StoreError, check_revision, next_revision};
use crate::constants::events::CHANNEL_CAPACITY;

/// One `<id>.json` file per document
pub struct JsonFileStore {
    dir: PathBuf,
    // Serializes read-check-write so revision checks are atomic
    write_lock: Mutex<()>,
    changes: broadcast::Sender<DocumentChange>,
}

impl JsonFileStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
        let (changes, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
            changes,
        })
    }

    fn doc_path(&self, id: &str) -> PathBuf {
        let safe: String = id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    async fn read(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let path = self.doc_path(id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| StoreError::Malformed {
                    id: id.to_string(),
                    source,
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        self.read(id).await
    }

    async fn put(&self, mut doc: Document) -> Result<Document, StoreError> {
        let _guard = self.write_lock.lock().await;

        let stored = self.read(&doc.id).await?;
        check_revision(stored.as_ref(), &doc)?;
        doc.rev = Some(next_revision(doc.rev.as_deref()));

        let path = self.doc_path(&doc.id);
        let json = serde_json::to_vec_pretty(&doc).map_err(|source| StoreError::Malformed {
            id: doc.id.clone(),
            source,
        })?;
        // Atomic replace via rename
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        debug!(id = %doc.id, rev = ?doc.rev, "Document written");

        let _ = self.changes.send(DocumentChange {
            id: doc.id.clone(),
            doc: Some(doc.clone()),
        });
        Ok(doc)
    }

    fn changes(&self) -> broadcast::Receiver<DocumentChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JsonFileStore::open(dir.path()).await.unwrap();
            store
                .put(Document::new("configuration", json!({ "volume": 0.3 }), None))
                .await
                .unwrap();
        }

        let store = JsonFileStore::open(dir.path()).await.unwrap();
        let doc = store.get("configuration").await.unwrap().unwrap();
        assert_eq!(doc.data["volume"], 0.3);
        assert!(dir.path().join("configuration.json").is_file());
    }

    #[tokio::test]
    async fn test_conflict_leaves_document_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        store.put(Document::new("rt-configuration", json!(1), None)).await.unwrap();

        let err = store
            .put(Document::new("rt-configuration", json!(2), Some("9-stale".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.get("rt-configuration").await.unwrap().unwrap().data, json!(1));
    }

    #[tokio::test]
    async fn test_malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("configuration.json"), "{").unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();

        let err = store.get("configuration").await.unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }
}
