use std::collections::BTreeMap;

use policy_replicator::store::{KeyValueStore, StoredValue};
use policy_replicator::transform::record::{RoleRecord, StoredPolicy};
use policy_replicator::StoreKey;
use serde_json::Value;

pub async fn policy<S: KeyValueStore + ?Sized>(store: &S, id: &str) -> Option<StoredPolicy> {
    store
        .get(&StoreKey::primary(id))
        .await
        .expect("Failed to read policy record")
        .as_ref()
        .and_then(StoredPolicy::from_stored)
}

pub async fn policy_json<S: KeyValueStore + ?Sized>(store: &S, id: &str) -> Option<Value> {
    store
        .get(&StoreKey::primary(id))
        .await
        .expect("Failed to read policy record")
        .and_then(|v| v.as_value().cloned())
}

pub async fn role_policies<S: KeyValueStore + ?Sized>(store: &S, role: &str) -> Option<Vec<String>> {
    let value = store
        .get(&StoreKey::primary(role))
        .await
        .expect("Failed to read role record")?;
    let record = RoleRecord::from_stored(role, &value)?;
    Some(record.policies.into_iter().collect())
}

pub async fn account_members<S: KeyValueStore + ?Sized>(store: &S, account: &str) -> Vec<String> {
    match store
        .get(&StoreKey::account_set(account))
        .await
        .expect("Failed to read account set")
    {
        Some(StoredValue::Set(members)) => members.into_iter().collect(),
        Some(other) => panic!("account set holds {other:?}"),
        None => Vec::new(),
    }
}

pub async fn name_target<S: KeyValueStore + ?Sized>(store: &S, account: &str, name: &str) -> Option<String> {
    store
        .get(&StoreKey::name(account, name))
        .await
        .expect("Failed to read name index")
        .and_then(|v| v.as_value().and_then(Value::as_str).map(str::to_string))
}

/// Every index derived from the policy record points back at it.
pub async fn assert_indexed<S: KeyValueStore + ?Sized>(store: &S, id: &str) {
    let record = policy(store, id).await.expect("policy record missing");
    let account = record.account.clone().expect("record without account");
    let name = record.name.clone().expect("record without name");

    assert!(
        account_members(store, &account).await.contains(&id.to_string()),
        "accountset:{account} does not list {id}"
    );
    assert_eq!(
        name_target(store, &account, &name).await.as_deref(),
        Some(id),
        "name:{account}:{name} does not point at {id}"
    );
    for role in &record.roles {
        let policies = role_policies(store, role).await.unwrap_or_default();
        assert!(policies.contains(&id.to_string()), "role {role} does not list {id}");
    }
}

/// No index mentions the policy any more.
pub async fn assert_gone<S: KeyValueStore + ?Sized>(
    store: &S,
    id: &str,
    account: &str,
    name: &str,
    roles: &[&str],
) {
    assert!(policy_json(store, id).await.is_none(), "id:{id} still present");
    assert!(!account_members(store, account).await.contains(&id.to_string()));
    assert_eq!(name_target(store, account, name).await, None);
    for role in roles {
        let policies = role_policies(store, role).await.unwrap_or_default();
        assert!(!policies.contains(&id.to_string()), "role {role} still lists {id}");
    }
}

/// Every index key in a store dump agrees with the primary records.
///
/// Account sets list only policies of that account, each policy is listed in
/// its account set and named by exactly its name key, every name key resolves
/// to a policy carrying that name, and policy roles mirror role back-references.
pub fn assert_consistent(entries: &BTreeMap<String, StoredValue>) {
    let policies: BTreeMap<&str, StoredPolicy> = entries
        .iter()
        .filter_map(|(key, value)| {
            let id = key.strip_prefix("id:")?;
            StoredPolicy::from_stored(value).map(|p| (id, p))
        })
        .collect();
    let roles: BTreeMap<&str, RoleRecord> = entries
        .iter()
        .filter_map(|(key, value)| {
            let id = key.strip_prefix("id:")?;
            if policies.contains_key(id) {
                return None;
            }
            RoleRecord::from_stored(id, value).map(|r| (id, r))
        })
        .collect();

    for (key, value) in entries {
        if let Some(account) = key.strip_prefix("accountset:") {
            let members = value.as_set().unwrap_or_else(|| panic!("{key} is not a set"));
            for member in members {
                let record = policies
                    .get(member.as_str())
                    .unwrap_or_else(|| panic!("{key} lists {member}, which has no policy record"));
                assert_eq!(record.account.as_deref(), Some(account), "{key} lists {member} of another account");
            }
        } else if let Some(rest) = key.strip_prefix("name:") {
            let (account, name) = rest
                .split_once(':')
                .unwrap_or_else(|| panic!("malformed name key {key}"));
            let target = value
                .as_value()
                .and_then(Value::as_str)
                .unwrap_or_else(|| panic!("{key} does not hold an id"));
            let record = policies
                .get(target)
                .unwrap_or_else(|| panic!("{key} points at {target}, which has no policy record"));
            assert_eq!(record.account.as_deref(), Some(account), "{key} points at another account");
            assert_eq!(record.name.as_deref(), Some(name), "{key} is stale for {target}");
        }
    }

    for (id, record) in &policies {
        let account = record.account.as_deref().unwrap_or_else(|| panic!("{id} has no account"));
        let in_set = entries
            .get(&format!("accountset:{account}"))
            .and_then(StoredValue::as_set)
            .is_some_and(|members| members.contains(*id));
        assert!(in_set, "accountset:{account} does not list {id}");

        if let Some(name) = &record.name {
            let target = entries
                .get(&format!("name:{account}:{name}"))
                .and_then(StoredValue::as_value)
                .and_then(Value::as_str);
            assert_eq!(target, Some(*id), "name:{account}:{name} does not point at {id}");
        }

        for role in &record.roles {
            let listed = roles.get(role.as_str()).is_some_and(|r| r.policies.contains(*id));
            assert!(listed, "role {role} does not list {id}");
        }
    }

    for (role, record) in &roles {
        for id in &record.policies {
            let policy = policies
                .get(id.as_str())
                .unwrap_or_else(|| panic!("role {role} lists {id}, which has no policy record"));
            assert!(policy.roles.contains(*role), "role {role} lists {id}, which does not list it back");
        }
    }
}
