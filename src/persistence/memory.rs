use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

use super::{Document, DocumentChange, DocumentStore, StoreError, check_revision, next_revision};
use crate::constants::events::CHANNEL_CAPACITY;

/// In-process store, same revision semantics as the file store
pub struct MemoryStore {
    docs: Mutex<HashMap<String, Document>>,
    changes: broadcast::Sender<DocumentChange>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        let (changes, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            docs: Mutex::new(HashMap::new()),
            changes,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.docs.lock().unwrap().get(id).cloned())
    }

    async fn put(&self, mut doc: Document) -> Result<Document, StoreError> {
        {
            let mut docs = self.docs.lock().unwrap();
            let stored = docs.get(&doc.id);
            check_revision(stored, &doc)?;
            doc.rev = Some(next_revision(doc.rev.as_deref()));
            docs.insert(doc.id.clone(), doc.clone());
        }

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
