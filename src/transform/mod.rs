//! Changelog entry -> index mutation batch -> store.
//!
//! One entry is handled start to finish in a single call: decode, build the
//! canonical record, plan the batch, submit it. Entries are independent; no
//! state is kept between calls.

pub mod decode;
pub mod errors;
pub mod executor;
pub mod plan;
pub mod record;

use std::sync::Arc;

pub use decode::{DecodedEntry, DecodedModify, DecodedPolicy, DecodedRemoval};
pub use errors::TransformError;
pub use executor::{exec, BatchOutcome};
pub use plan::{plan_add, plan_delete, plan_modify};
pub use record::{build, PolicyRecord, StoredPolicy};

use crate::batch::{Batch, StoreKey};
use crate::changelog::{Change, ChangelogEntry};
use crate::rules::RuleParser;
use crate::store::KeyValueStore;

/// Mirrors policy changelog entries into a key-value store.
pub struct Replicator<S: ?Sized, P> {
    store: Arc<S>,
    parser: P,
}

impl<S, P> Replicator<S, P>
where
    S: KeyValueStore + ?Sized,
    P: RuleParser,
{
    pub fn new(store: Arc<S>, parser: P) -> Self {
        Self { store, parser }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Decode an entry into typed policy fields.
    ///
    /// For `modify` this reads the current record under `id:<id>` once, to
    /// learn the pre-image.
    pub async fn decode(&self, entry: &ChangelogEntry) -> Result<DecodedEntry, TransformError> {
        match &entry.change {
            Change::Add(attrs) => Ok(DecodedEntry::Add(decode::decode_add(attrs)?)),
            Change::Delete(attrs) => Ok(DecodedEntry::Delete(decode::decode_delete(attrs)?)),
            Change::Modify {
                modifications,
                snapshot,
            } => {
                let id = decode::modify_target_id(snapshot, &entry.target_dn)?;
                let stored = self
                    .store
                    .get(&StoreKey::primary(&id))
                    .await
                    .map_err(|source| TransformError::PreImageLookup {
                        id: id.clone(),
                        source,
                    })?;
                let pre_image = stored.as_ref().and_then(StoredPolicy::from_stored);
                if stored.is_some() && pre_image.is_none() {
                    tracing::warn!(id = %id, "Record under policy id is not a policy; treating pre-image as unknown");
                }
                let decoded = decode::decode_modify(id, modifications, snapshot, pre_image)?;
                Ok(DecodedEntry::Modify(decoded))
            }
        }
    }

    /// Build the mutation batch for an entry without submitting it.
    ///
    /// Fails before producing any batch when a field is missing or a rule
    /// does not parse.
    pub async fn plan(&self, entry: &ChangelogEntry) -> Result<Batch, TransformError> {
        let batch = match self.decode(entry).await? {
            DecodedEntry::Add(policy) => {
                let record = build(&policy, &self.parser)?;
                plan_add(&record)?
            }
            DecodedEntry::Modify(change) => {
                let record = build(&change.post_image, &self.parser)?;
                plan_modify(&change, &record)?
            }
            DecodedEntry::Delete(removal) => plan_delete(&removal),
        };

        tracing::debug!(
            sequence = entry.sequence,
            kind = %entry.kind(),
            ops = batch.len(),
            "Planned batch"
        );
        Ok(batch)
    }

    /// Plan an entry and submit the batch atomically.
    pub async fn apply(&self, entry: &ChangelogEntry) -> Result<BatchOutcome, TransformError> {
        let batch = self.plan(entry).await?;
        let outcome = exec(&*self.store, &batch).await?;
        tracing::info!(
            sequence = entry.sequence,
            kind = %entry.kind(),
            ops = outcome.operations,
            "Applied changelog entry"
        );
        Ok(outcome)
    }
}
