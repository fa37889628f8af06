//! Index mutation planning.
//!
//! Each changelog entry becomes one [`Batch`] that keeps these keys in
//! agreement:
//! - `id:<id>` holds the policy record,
//! - `accountset:<account>` holds the ids of the account's policies,
//! - `name:<account>:<name>` holds the id of the policy with that name,
//! - the `policies` field of each `id:<role>` lists the policies naming the role.
//!
//! Planning performs no I/O; the batch is inspectable before submission.

use std::collections::BTreeSet;

use serde_json::Value;

use super::decode::{AttributeOp, DecodedModify, DecodedRemoval, TrackedAttribute};
use super::errors::TransformError;
use super::record::{PolicyRecord, ROLE_POLICIES_FIELD};
use crate::batch::{Batch, StoreKey};
use crate::changelog::ModOp;

/// Batch for a new policy: 3 + |roles| operations.
///
/// The id is assumed fresh; replaying the same add overwrites the same keys.
pub fn plan_add(record: &PolicyRecord) -> Result<Batch, TransformError> {
    let mut batch = Batch::new();
    batch.put(StoreKey::primary(&record.id), record.to_value()?);
    batch.set_add(StoreKey::account_set(&record.account), &record.id);
    batch.put(
        StoreKey::name(&record.account, &record.name),
        Value::String(record.id.clone()),
    );
    for role in &record.roles {
        batch.field_append(StoreKey::primary(role), ROLE_POLICIES_FIELD, &record.id);
    }
    Ok(batch)
}

/// Batch for a removed policy: 3 + |roles| operations (2 + |roles| without a name).
///
/// Back-references are removed for the roles the delete entry lists, since the
/// primary record disappears in the same batch.
pub fn plan_delete(removal: &DecodedRemoval) -> Batch {
    let mut batch = Batch::new();
    batch.remove(StoreKey::primary(&removal.id));
    batch.set_remove(StoreKey::account_set(&removal.account), &removal.id);
    if let Some(name) = &removal.name {
        batch.remove(StoreKey::name(&removal.account, name));
    }
    let roles: BTreeSet<&String> = removal.role_ids.iter().collect();
    for role in roles {
        batch.field_remove(StoreKey::primary(role), ROLE_POLICIES_FIELD, &removal.id);
    }
    batch
}

/// Batch for a modified policy.
///
/// Operations contribute mutations in entry order:
/// - `name`: drop the old name entry, point the new one at the id, rewrite the record;
/// - `rule`: rewrite the record;
/// - `memberrole`: append/remove back-references for the roles gained/lost, rewrite the record;
/// - anything else: nothing.
///
/// The batch always ends with a rewrite of the full post-image record.
pub fn plan_modify(change: &DecodedModify, record: &PolicyRecord) -> Result<Batch, TransformError> {
    let value = record.to_value()?;
    let primary = StoreKey::primary(&change.id);
    let account = &record.account;

    let mut batch = Batch::new();
    let mut current_name = change.pre_image.name.clone();
    let mut current_roles = change.pre_image.role_ids.clone();
    let mut roles_touched = false;

    for op in &change.operations {
        match &op.attribute {
            TrackedAttribute::Name => {
                plan_name_change(&mut batch, op, &mut current_name, account, &change.id);
                batch.put(primary.clone(), value.clone());
            }
            TrackedAttribute::Rule => {
                batch.put(primary.clone(), value.clone());
            }
            TrackedAttribute::MemberRole => {
                roles_touched = true;
                let (added, removed) =
                    role_delta(&mut current_roles, op, change.pre_image.roles_known);
                for role in added {
                    batch.field_append(StoreKey::primary(role), ROLE_POLICIES_FIELD, &change.id);
                }
                for role in removed {
                    batch.field_remove(StoreKey::primary(role), ROLE_POLICIES_FIELD, &change.id);
                }
                batch.put(primary.clone(), value.clone());
            }
            TrackedAttribute::Other(attribute) => {
                tracing::trace!(id = %change.id, attribute = %attribute, "Untracked attribute changed");
            }
        }
    }

    // The snapshot may name a role set the operations alone do not reach
    // (e.g. the operations were compacted upstream). The record is
    // authoritative, so align the back-references with it.
    if roles_touched && change.pre_image.roles_known {
        for role in record.roles.difference(&current_roles) {
            batch.field_append(StoreKey::primary(role), ROLE_POLICIES_FIELD, &change.id);
        }
        for role in current_roles.difference(&record.roles) {
            batch.field_remove(StoreKey::primary(role), ROLE_POLICIES_FIELD, &change.id);
        }
    }

    batch.put(primary, value);
    Ok(batch)
}

fn plan_name_change(
    batch: &mut Batch,
    op: &AttributeOp,
    current: &mut Option<String>,
    account: &str,
    id: &str,
) {
    match op.operation {
        ModOp::Add | ModOp::Replace => match op.values.first() {
            Some(new) => {
                match current.as_deref() {
                    Some(old) if old != new.as_str() => batch.remove(StoreKey::name(account, old)),
                    Some(_) => {}
                    None => tracing::warn!(
                        id,
                        account,
                        name = %new,
                        "Previous name unknown; its name index entry is left in place"
                    ),
                }
                batch.put(StoreKey::name(account, new), Value::String(id.to_string()));
                *current = Some(new.clone());
            }
            None => {
                if let Some(old) = current.take() {
                    batch.remove(StoreKey::name(account, old));
                }
            }
        },
        ModOp::Delete => {
            let names: Vec<String> = if op.values.is_empty() {
                current.iter().cloned().collect()
            } else {
                op.values.clone()
            };
            for name in names {
                batch.remove(StoreKey::name(account, &name));
                if current.as_deref() == Some(name.as_str()) {
                    *current = None;
                }
            }
        }
    }
}

/// Roles gained and lost by one `memberrole` operation, advancing `current`.
///
/// When the pre-image roles are unknown, a `delete` trusts the listed values.
fn role_delta(
    current: &mut BTreeSet<String>,
    op: &AttributeOp,
    known: bool,
) -> (Vec<String>, Vec<String>) {
    let mut added = Vec::new();
    let mut removed = Vec::new();

    match op.operation {
        ModOp::Add => {
            for role in &op.values {
                if current.insert(role.clone()) {
                    added.push(role.clone());
                }
            }
        }
        ModOp::Delete if op.values.is_empty() => {
            removed.extend(std::mem::take(current));
        }
        ModOp::Delete => {
            for role in &op.values {
                if current.remove(role) || (!known && !removed.contains(role)) {
                    removed.push(role.clone());
                }
            }
        }
        ModOp::Replace => {
            let target: BTreeSet<String> = op.values.iter().cloned().collect();
            added.extend(target.difference(current).cloned());
            removed.extend(current.difference(&target).cloned());
            *current = target;
        }
    }

    (added, removed)
}
