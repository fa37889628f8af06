//! Policy Replicator - mirrors directory account policies into a key-value store
//!
//! Changelog entries for account policies are turned into atomic batches that
//! keep the primary record, the per-account set and the name and role indices
//! in agreement. It exposes all modules for testing purposes.

pub mod batch;
pub mod changelog;
pub mod entities;
pub mod errors;
pub mod replay;
pub mod rules;
pub mod settings;
pub mod store;
pub mod transform;

pub use batch::{Batch, Mutation, StoreKey};
pub use changelog::ChangelogEntry;
pub use errors::ReplicatorError;
pub use transform::{Replicator, TransformError};
