pub mod memory;
pub mod sql;

use std::collections::BTreeSet;

use async_trait::async_trait;
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

use crate::batch::{Batch, Mutation, StoreKey};

pub use memory::InMemoryStore;
pub use sql::SqlStore;

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("Database error: {0}")]
    #[diagnostic(code(policy_replicator::store::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(policy_replicator::store::serde))]
    Serde(#[from] serde_json::Error),

    #[error("`{op}` cannot be applied to `{key}`: {reason}")]
    #[diagnostic(
        code(policy_replicator::store::type_mismatch),
        help("Set operations only apply to account sets; field operations only apply to JSON object records")
    )]
    TypeMismatch {
        op: &'static str,
        key: String,
        reason: String,
    },

    #[error("Store unavailable: {0}")]
    #[diagnostic(code(policy_replicator::store::unavailable))]
    Unavailable(String),
}

/// What lives under a key: a JSON record or a set of member ids.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Value(Value),
    Set(BTreeSet<String>),
}

impl StoredValue {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            StoredValue::Value(v) => Some(v),
            StoredValue::Set(_) => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            StoredValue::Set(s) => Some(s),
            StoredValue::Value(_) => None,
        }
    }
}

/// The key-value store consumed by the transform.
///
/// `submit_batch` must apply every mutation or none of them; readers never
/// observe a partially applied batch. On success it returns the number of
/// operations applied.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &StoreKey) -> Result<Option<StoredValue>, StoreError>;

    async fn submit_batch(&self, batch: &Batch) -> Result<usize, StoreError>;
}

/// Apply one mutation to the current content of its key, returning the new content.
///
/// `field-append` and `field-remove` behave as set operations on the array
/// field so concurrent batches touching the same role commute.
pub fn apply_mutation(
    current: Option<StoredValue>,
    mutation: &Mutation,
) -> Result<Option<StoredValue>, StoreError> {
    let mismatch = |reason: &str| StoreError::TypeMismatch {
        op: mutation.kind(),
        key: mutation.key().to_string(),
        reason: reason.to_string(),
    };

    match mutation {
        Mutation::Put { value, .. } => Ok(Some(StoredValue::Value(value.clone()))),
        Mutation::Remove { .. } => Ok(None),
        Mutation::SetAdd { member, .. } => match current {
            None => Ok(Some(StoredValue::Set(BTreeSet::from([member.clone()])))),
            Some(StoredValue::Set(mut set)) => {
                set.insert(member.clone());
                Ok(Some(StoredValue::Set(set)))
            }
            Some(StoredValue::Value(_)) => Err(mismatch("key holds a record, not a set")),
        },
        Mutation::SetRemove { member, .. } => match current {
            None => Ok(None),
            Some(StoredValue::Set(mut set)) => {
                set.remove(member);
                if set.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(StoredValue::Set(set)))
                }
            }
            Some(StoredValue::Value(_)) => Err(mismatch("key holds a record, not a set")),
        },
        Mutation::FieldAppend { field, member, .. } => {
            let mut record = match current {
                None => Value::Object(serde_json::Map::new()),
                Some(StoredValue::Value(v)) => v,
                Some(StoredValue::Set(_)) => return Err(mismatch("key holds a set, not a record")),
            };
            let object = record
                .as_object_mut()
                .ok_or_else(|| mismatch("record is not a JSON object"))?;
            let entry = object
                .entry(field.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            let items = entry
                .as_array_mut()
                .ok_or_else(|| mismatch(&format!("field `{field}` is not an array")))?;
            if !items.iter().any(|v| v.as_str() == Some(member.as_str())) {
                items.push(Value::String(member.clone()));
            }
            Ok(Some(StoredValue::Value(record)))
        }
        Mutation::FieldRemove { field, member, .. } => {
            let mut record = match current {
                None => return Ok(None),
                Some(StoredValue::Value(v)) => v,
                Some(StoredValue::Set(_)) => return Err(mismatch("key holds a set, not a record")),
            };
            let object = record
                .as_object_mut()
                .ok_or_else(|| mismatch("record is not a JSON object"))?;
            match object.get_mut(field) {
                None => {}
                Some(Value::Array(items)) => {
                    items.retain(|v| v.as_str() != Some(member.as_str()));
                }
                Some(_) => return Err(mismatch(&format!("field `{field}` is not an array"))),
            }
            Ok(Some(StoredValue::Value(record)))
        }
    }
}
