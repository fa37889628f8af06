//! Key layout and the mutation batch exchanged between the planner and the stores.

use serde_json::Value;

/// A structured key in the shared key-value namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKey {
    /// `id:<id>` - canonical policy record, or a role record.
    Primary(String),
    /// `accountset:<account>` - ids of every policy owned by the account.
    AccountSet(String),
    /// `name:<account>:<name>` - id of the policy holding that name.
    Name { account: String, name: String },
}

impl StoreKey {
    pub fn primary(id: impl Into<String>) -> Self {
        StoreKey::Primary(id.into())
    }

    pub fn account_set(account: impl Into<String>) -> Self {
        StoreKey::AccountSet(account.into())
    }

    pub fn name(account: impl Into<String>, name: impl Into<String>) -> Self {
        StoreKey::Name {
            account: account.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKey::Primary(id) => write!(f, "id:{id}"),
            StoreKey::AccountSet(account) => write!(f, "accountset:{account}"),
            StoreKey::Name { account, name } => write!(f, "name:{account}:{name}"),
        }
    }
}

/// One key-value operation inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Put { key: StoreKey, value: Value },
    Remove { key: StoreKey },
    SetAdd { key: StoreKey, member: String },
    SetRemove { key: StoreKey, member: String },
    /// Append `member` to the array field `field` of the record at `key`.
    FieldAppend {
        key: StoreKey,
        field: String,
        member: String,
    },
    FieldRemove {
        key: StoreKey,
        field: String,
        member: String,
    },
}

impl Mutation {
    pub fn key(&self) -> &StoreKey {
        match self {
            Mutation::Put { key, .. }
            | Mutation::Remove { key }
            | Mutation::SetAdd { key, .. }
            | Mutation::SetRemove { key, .. }
            | Mutation::FieldAppend { key, .. }
            | Mutation::FieldRemove { key, .. } => key,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::Put { .. } => "put",
            Mutation::Remove { .. } => "remove",
            Mutation::SetAdd { .. } => "set-add",
            Mutation::SetRemove { .. } => "set-remove",
            Mutation::FieldAppend { .. } => "field-append",
            Mutation::FieldRemove { .. } => "field-remove",
        }
    }
}

/// An ordered list of mutations, applied all-or-nothing by a store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    mutations: Vec<Mutation>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: StoreKey, value: Value) {
        self.mutations.push(Mutation::Put { key, value });
    }

    pub fn remove(&mut self, key: StoreKey) {
        self.mutations.push(Mutation::Remove { key });
    }

    pub fn set_add(&mut self, key: StoreKey, member: impl Into<String>) {
        self.mutations.push(Mutation::SetAdd {
            key,
            member: member.into(),
        });
    }

    pub fn set_remove(&mut self, key: StoreKey, member: impl Into<String>) {
        self.mutations.push(Mutation::SetRemove {
            key,
            member: member.into(),
        });
    }

    pub fn field_append(&mut self, key: StoreKey, field: &str, member: impl Into<String>) {
        self.mutations.push(Mutation::FieldAppend {
            key,
            field: field.to_string(),
            member: member.into(),
        });
    }

    pub fn field_remove(&mut self, key: StoreKey, field: &str, member: impl Into<String>) {
        self.mutations.push(Mutation::FieldRemove {
            key,
            field: field.to_string(),
            member: member.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Mutation> {
        self.mutations.iter()
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a Mutation;
    type IntoIter = std::slice::Iter<'a, Mutation>;

    fn into_iter(self) -> Self::IntoIter {
        self.mutations.iter()
    }
}
