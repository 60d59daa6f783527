//! Reactive configuration store
//!
//! All runtime configuration writes go through [`ConfigStore::set`] or
//! [`ConfigStore::replace`]. Each write updates the in-memory runtime object,
//! mirrors durable fields into the persisted configuration and queues
//! background writes of both documents. Writes to one document run one at a
//! time and serialize the state current when they run, so the newest state
//! wins. A revision conflict from an outside writer drops that write and is
//! only logged.

use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::runtime::{PersistedConfiguration, RuntimeConfiguration, RuntimeField};
use crate::constants::documents as doc_ids;
use crate::persistence::{Document, DocumentChange, DocumentStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Runtime,
    Persisted,
}

impl Target {
    fn id(self) -> &'static str {
        match self {
            Target::Runtime => doc_ids::RUNTIME_CONFIGURATION,
            Target::Persisted => doc_ids::CONFIGURATION,
        }
    }

    fn index(self) -> usize {
        match self {
            Target::Runtime => 0,
            Target::Persisted => 1,
        }
    }
}

pub struct ConfigStore {
    runtime: Mutex<RuntimeConfiguration>,
    persisted: Mutex<PersistedConfiguration>,
    documents: Arc<dyn DocumentStore>,
    writes: Mutex<JoinSet<()>>,
    // Held across get, snapshot and put of one document
    write_turns: [tokio::sync::Mutex<()>; 2],
}

impl ConfigStore {
    /// Initialize both documents and seed the runtime state from the durable one
    pub async fn open(documents: Arc<dyn DocumentStore>) -> Result<Arc<Self>> {
        let runtime_id = doc_ids::RUNTIME_CONFIGURATION;
        let existing_rev = documents
            .get(runtime_id)
            .await
            .with_context(|| format!("Failed to read document {runtime_id}"))?
            .and_then(|doc| doc.rev);
        let defaults = serde_json::to_value(RuntimeConfiguration::default())
            .context("Failed to serialize default runtime configuration")?;
        documents
            .put(Document::new(runtime_id, defaults, existing_rev))
            .await
            .with_context(|| format!("Failed to reset document {runtime_id}"))?;

        let persisted_id = doc_ids::CONFIGURATION;
        let persisted = match documents
            .get(persisted_id)
            .await
            .with_context(|| format!("Failed to read document {persisted_id}"))?
        {
            Some(doc) => serde_json::from_value(doc.data).unwrap_or_else(|e| {
                warn!(id = persisted_id, error = %e, "Stored configuration unreadable, using defaults");
                PersistedConfiguration::default()
            }),
            None => {
                info!(id = persisted_id, "Creating default configuration document");
                let defaults = PersistedConfiguration::default();
                let data = serde_json::to_value(&defaults)
                    .context("Failed to serialize default configuration")?;
                documents
                    .put(Document::new(persisted_id, data, None))
                    .await
                    .with_context(|| format!("Failed to create document {persisted_id}"))?;
                defaults
            }
        };

        let runtime = RuntimeConfiguration::seeded_from(&persisted);
        debug!(?runtime, "Runtime configuration seeded");

        Ok(Arc::new(Self {
            runtime: Mutex::new(runtime),
            persisted: Mutex::new(persisted),
            documents,
            writes: Mutex::new(JoinSet::new()),
            write_turns: [tokio::sync::Mutex::new(()), tokio::sync::Mutex::new(())],
        }))
    }

    /// Snapshot of the live runtime configuration
    pub fn runtime(&self) -> RuntimeConfiguration {
        self.runtime.lock().unwrap().clone()
    }

    pub fn persisted(&self) -> PersistedConfiguration {
        self.persisted.lock().unwrap().clone()
    }

    /// Read one value out of the runtime configuration without cloning it all
    pub fn read<T>(&self, f: impl FnOnce(&RuntimeConfiguration) -> T) -> T {
        f(&self.runtime.lock().unwrap())
    }

    pub fn set(self: &Arc<Self>, field: RuntimeField) {
        self.runtime.lock().unwrap().apply(&field);
        let durable = self.persisted.lock().unwrap().propagate(&field);
        debug!(field = field.name(), durable, "Runtime configuration updated");

        self.queue_write(Target::Runtime);
        if durable {
            self.queue_write(Target::Persisted);
        }
    }

    /// Install a whole new runtime configuration and fan it into the durable one
    pub fn replace(self: &Arc<Self>, runtime: RuntimeConfiguration) {
        self.persisted.lock().unwrap().absorb(&runtime);
        *self.runtime.lock().unwrap() = runtime;
        info!("Runtime configuration replaced");

        self.queue_write(Target::Runtime);
        self.queue_write(Target::Persisted);
    }

    /// Change feed of the runtime mirror document
    pub fn subscribe(&self) -> ConfigurationFeed {
        ConfigurationFeed {
            changes: self.documents.changes(),
        }
    }

    /// Wait for every queued write to finish
    pub async fn settle(&self) {
        loop {
            let mut pending = std::mem::take(&mut *self.writes.lock().unwrap());
            if pending.is_empty() {
                return;
            }
            while let Some(result) = pending.join_next().await {
                if let Err(e) = result {
                    error!(error = %e, "Configuration write task failed");
                }
            }
        }
    }

    fn queue_write(self: &Arc<Self>, target: Target) {
        let this = Arc::clone(self);
        let mut writes = self.writes.lock().unwrap();
        while writes.try_join_next().is_some() {}
        writes.spawn(async move { this.write(target).await });
    }

    fn snapshot(&self, target: Target) -> serde_json::Result<Value> {
        match target {
            Target::Runtime => serde_json::to_value(&*self.runtime.lock().unwrap()),
            Target::Persisted => serde_json::to_value(&*self.persisted.lock().unwrap()),
        }
    }

    async fn write(&self, target: Target) {
        let id = target.id();
        let _turn = self.write_turns[target.index()].lock().await;
        let rev = match self.documents.get(id).await {
            Ok(doc) => doc.and_then(|doc| doc.rev),
            Err(e) => {
                error!(id, error = %e, "Failed to read document before write");
                return;
            }
        };

        // Taken after the revision so the last write carries the newest state
        let data = match self.snapshot(target) {
            Ok(data) => data,
            Err(e) => {
                error!(id, error = %e, "Failed to serialize configuration");
                return;
            }
        };

        match self.documents.put(Document::new(id, data, rev)).await {
            Ok(doc) => debug!(id, rev = ?doc.rev, "Configuration persisted"),
            Err(e @ StoreError::Conflict { .. }) => {
                warn!(id, error = %e, "Configuration write dropped");
            }
            Err(e) => error!(id, error = %e, "Failed to persist configuration"),
        }
    }
}

/// Runtime configuration snapshots as they are persisted
pub struct ConfigurationFeed {
    changes: broadcast::Receiver<DocumentChange>,
}

impl ConfigurationFeed {
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            match self.changes.recv().await {
                Ok(change) if change.id == doc_ids::RUNTIME_CONFIGURATION => {
                    if let Some(doc) = change.doc {
                        return Some(doc.data);
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Configuration feed lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
