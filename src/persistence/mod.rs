//! Durable document store
//!
//! Revisioned JSON documents with a change feed. A `put` must carry the
//! revision of the stored document (or none when creating it); anything else
//! is a [`StoreError::Conflict`]. Callers treat persistence as best effort and
//! do not retry conflicts.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub data: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Value, rev: Option<String>) -> Self {
        Self {
            id: id.into(),
            rev,
            data,
        }
    }
}

/// Emitted after every successful put
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub id: String,
    pub doc: Option<Document>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("revision conflict on document {id}: expected {expected:?}, got {given:?}")]
    Conflict {
        id: String,
        expected: Option<String>,
        given: Option<String>,
    },
    #[error("failed to access document file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed document {id}")]
    Malformed {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError>;

    /// Write `doc`, returning it with its new revision
    async fn put(&self, doc: Document) -> Result<Document, StoreError>;

    fn changes(&self) -> broadcast::Receiver<DocumentChange>;
}

/// Reject a put whose revision does not match the stored document
fn check_revision(stored: Option<&Document>, incoming: &Document) -> Result<(), StoreError> {
    let expected = stored.and_then(|d| d.rev.clone());
    if expected != incoming.rev {
        return Err(StoreError::Conflict {
            id: incoming.id.clone(),
            expected,
            given: incoming.rev.clone(),
        });
    }
    Ok(())
}

/// Revision tokens look like `<generation>-<uuid>`
fn next_revision(current: Option<&str>) -> String {
    let generation = current
        .and_then(|rev| rev.split_once('-'))
        .and_then(|(n, _)| n.parse::<u64>().ok())
        .unwrap_or(0);
    format!("{}-{}", generation + 1, Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_revision_increments_generation() {
        let first = next_revision(None);
        assert!(first.starts_with("1-"));
        let second = next_revision(Some(&first));
        assert!(second.starts_with("2-"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_check_revision() {
        let stored = Document::new("a", Value::Null, Some("1-x".into()));
        assert!(check_revision(Some(&stored), &Document::new("a", Value::Null, Some("1-x".into()))).is_ok());
        assert!(check_revision(Some(&stored), &Document::new("a", Value::Null, None)).is_err());
        assert!(check_revision(None, &Document::new("a", Value::Null, None)).is_ok());
        assert!(check_revision(None, &Document::new("a", Value::Null, Some("1-x".into()))).is_err());
    }

    #[test]
    fn test_document_wire_shape() {
        let doc = Document::new("configuration", serde_json::json!({ "mute": true }), Some("3-abc".into()));
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["_id"], "configuration");
        assert_eq!(json["_rev"], "3-abc");
        assert_eq!(json["data"]["mute"], true);
    }
}
