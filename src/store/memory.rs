//! In-memory key-value store.
//!
//! Used by tests and local dry runs. A batch is staged on an overlay of the
//! keys it touches and merged into the map under the write lock only once
//! every mutation has applied, so a failing batch leaves no trace.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{apply_mutation, KeyValueStore, StoreError, StoredValue};
use crate::batch::{Batch, StoreKey};

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<RwLock<HashMap<String, StoredValue>>>,
    fail_next: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `submit_batch` fail as if the store were unreachable.
    pub fn fail_next_batch(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Copy of every entry, ordered by key.
    pub async fn snapshot(&self) -> BTreeMap<String, StoredValue> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &StoreKey) -> Result<Option<StoredValue>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries.get(&key.to_string()).cloned())
    }

    async fn submit_batch(&self, batch: &Batch) -> Result<usize, StoreError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".into()));
        }

        let mut entries = self.entries.write().await;
        let mut overlay: HashMap<String, Option<StoredValue>> = HashMap::new();

        for mutation in batch {
            let key = mutation.key().to_string();
            let current = match overlay.get(&key) {
                Some(staged) => staged.clone(),
                None => entries.get(&key).cloned(),
            };
            let next = apply_mutation(current, mutation)?;
            overlay.insert(key, next);
        }

        for (key, value) in overlay {
            match value {
                Some(v) => {
                    entries.insert(key, v);
                }
                None => {
                    entries.remove(&key);
                }
            }
        }

        Ok(batch.len())
    }
}
