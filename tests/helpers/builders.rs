use policy_replicator::changelog::ChangelogEntry;
use serde_json::{json, Map, Value};

pub const ACCOUNT: &str = "390c229a-8c77-445f-b227-88e41c2bb3cf";

/// Member-role value the directory uses for `role`.
pub fn role_dn(role: &str) -> String {
    format!("role-uuid={role}, uuid={ACCOUNT}, ou=users, o=smartdc")
}

fn policy_dn(id: &str, account: &str) -> String {
    format!("policy-uuid={id}, uuid={account}, ou=users, o=smartdc")
}

fn strings(values: &[&str]) -> Value {
    Value::Array(values.iter().map(|v| Value::String(v.to_string())).collect())
}

enum Kind {
    Add,
    Modify,
    Delete,
}

/// Builder for changelog entries in their JSON wire form
pub struct EntryBuilder {
    kind: Kind,
    id: String,
    sequence: u64,
    account: String,
    /// Attribute map (add/delete) or snapshot (modify)
    attrs: Map<String, Value>,
    ops: Vec<Value>,
    with_snapshot: bool,
}

impl EntryBuilder {
    fn new(kind: Kind, id: &str) -> Self {
        let mut attrs = Map::new();
        attrs.insert("uuid".into(), strings(&[id]));
        attrs.insert("account".into(), strings(&[ACCOUNT]));
        attrs.insert("objectclass".into(), strings(&["sdcaccountpolicy"]));
        Self {
            kind,
            id: id.to_string(),
            sequence: 1,
            account: ACCOUNT.to_string(),
            attrs,
            ops: Vec::new(),
            with_snapshot: true,
        }
    }

    pub fn add(id: &str, name: &str) -> Self {
        Self::new(Kind::Add, id).attr("name", &[name])
    }

    pub fn delete(id: &str) -> Self {
        Self::new(Kind::Delete, id)
    }

    pub fn modify(id: &str) -> Self {
        Self::new(Kind::Modify, id)
    }

    pub fn sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn account(mut self, account: &str) -> Self {
        self.account = account.to_string();
        self.attr("account", &[account])
    }

    /// Set an attribute of the entry (the snapshot, for modify)
    pub fn attr(mut self, name: &str, values: &[&str]) -> Self {
        self.attrs.insert(name.to_string(), strings(values));
        self
    }

    pub fn roles(self, roles: &[&str]) -> Self {
        let dns: Vec<String> = roles.iter().map(|r| role_dn(r)).collect();
        let dns: Vec<&str> = dns.iter().map(String::as_str).collect();
        self.attr("memberrole", &dns)
    }

    pub fn without(mut self, name: &str) -> Self {
        self.attrs.remove(name);
        self
    }

    /// Append a modification (modify only)
    pub fn op(mut self, operation: &str, attribute: &str, values: &[&str]) -> Self {
        self.ops.push(json!({
            "operation": operation,
            "modification": { "type": attribute, "vals": strings(values) }
        }));
        self
    }

    pub fn role_op(self, operation: &str, roles: &[&str]) -> Self {
        let dns: Vec<String> = roles.iter().map(|r| role_dn(r)).collect();
        let dns: Vec<&str> = dns.iter().map(String::as_str).collect();
        self.op(operation, "memberrole", &dns)
    }

    /// Leave out the post-image snapshot of a modify entry
    pub fn without_snapshot(mut self) -> Self {
        self.with_snapshot = false;
        self
    }

    pub fn to_json(&self) -> String {
        let mut entry = json!({
            "dn": format!("changenumber={}, cn=changelog", self.sequence),
            "controls": [],
            "targetdn": policy_dn(&self.id, &self.account),
            "objectclass": "changeLogEntry",
            "changetime": "2014-02-07T18:16:42.315Z",
            "changenumber": self.sequence.to_string(),
        });
        let changetype = match self.kind {
            Kind::Add => "add",
            Kind::Modify => "modify",
            Kind::Delete => "delete",
        };
        entry["changetype"] = json!(changetype);
        match self.kind {
            Kind::Add | Kind::Delete => entry["changes"] = Value::Object(self.attrs.clone()),
            Kind::Modify => {
                entry["changes"] = Value::Array(self.ops.clone());
                if self.with_snapshot {
                    entry["entry"] = json!(Value::Object(self.attrs.clone()).to_string());
                }
            }
        }
        entry.to_string()
    }

    pub fn build(&self) -> ChangelogEntry {
        ChangelogEntry::from_json(&self.to_json()).expect("Failed to parse built entry")
    }
}

/// Recorded directory changelog entries for one policy's lifecycle.
pub mod fixtures {
    use super::*;

    pub const POLICY: &str = "b4301b32-66b4-11e3-ac31-6b349ce5dc45";
    pub const ROLE_A: &str = "781d804a-6ba3-11e4-b4bd-23690a23bdf7";
    pub const ROLE_B: &str = "dd13b7ed-0ec0-ef8b-d436-ba4c9f40cb6c";
    pub const ROLE_C: &str = "bbf6f06c-6ba3-11e4-af38-8f2769fe17db";

    pub const RULE_1: &str = "Can read foo and bar when ip = 10.0.0.0/8";
    pub const RULE_2: &str = "Can read red and blue when ip = 10.0.0.0/16";
    pub const RULE_3: &str = "Can read x and y when ip = 10.0.0.0/32";

    pub fn parse(source: &Value) -> ChangelogEntry {
        ChangelogEntry::from_json(&source.to_string()).expect("Failed to parse fixture")
    }

    fn snapshot(name: &str, rules: &[&str]) -> String {
        json!({
            "account": [ACCOUNT],
            "name": [name],
            "objectclass": ["sdcaccountpolicy"],
            "rule": rules,
            "uuid": [POLICY],
            "_owner": [ACCOUNT],
            "_parent": [format!("uuid={ACCOUNT}, ou=users, o=smartdc")]
        })
        .to_string()
    }

    fn modify(sequence: &str, changes: Value, entry: String) -> Value {
        json!({
            "dn": format!("changenumber={sequence}, cn=changelog"),
            "controls": [],
            "targetdn": policy_dn(POLICY, ACCOUNT),
            "changetype": "modify",
            "objectclass": "changeLogEntry",
            "changetime": "2014-02-07T18:16:42.246Z",
            "changes": changes,
            "entry": entry,
            "changenumber": sequence
        })
    }

    pub fn add_developer_read() -> Value {
        json!({
            "dn": "changenumber=20, cn=changelog",
            "controls": [],
            "targetdn": policy_dn(POLICY, ACCOUNT),
            "changetype": "add",
            "objectclass": "changeLogEntry",
            "changetime": "2014-02-06T21:36:42.353Z",
            "changes": {
                "account": [ACCOUNT],
                "name": ["developer_read"],
                "objectclass": ["sdcaccountpolicy"],
                "rule": [RULE_1, RULE_2],
                "memberrole": [role_dn(ROLE_A)],
                "uuid": [POLICY],
                "_owner": [ACCOUNT],
                "_parent": [format!("uuid={ACCOUNT}, ou=users, o=smartdc")]
            },
            "changenumber": "20"
        })
    }

    pub fn rename_to_newname() -> Value {
        modify(
            "21",
            json!([{ "operation": "replace", "modification": { "type": "name", "vals": ["newname"] } }]),
            snapshot("newname", &[RULE_1, RULE_2]),
        )
    }

    pub fn add_rule() -> Value {
        modify(
            "22",
            json!([{ "operation": "add", "modification": { "type": "rule", "vals": [RULE_3] } }]),
            snapshot("newname", &[RULE_1, RULE_2, RULE_3]),
        )
    }

    pub fn delete_rule() -> Value {
        modify(
            "23",
            json!([{ "operation": "delete", "modification": { "type": "rule", "vals": [RULE_3] } }]),
            snapshot("newname", &[RULE_1, RULE_2]),
        )
    }

    pub fn replace_rules() -> Value {
        modify(
            "24",
            json!([{ "operation": "replace", "modification": { "type": "rule", "vals": [RULE_3] } }]),
            snapshot("newname", &[RULE_3]),
        )
    }

    pub fn replace_member_roles() -> Value {
        modify(
            "25",
            json!([{
                "operation": "replace",
                "modification": { "type": "memberrole", "vals": [role_dn(ROLE_B), role_dn(ROLE_C)] }
            }]),
            snapshot("newname", &[RULE_3]),
        )
    }

    pub fn delete_newname() -> Value {
        json!({
            "dn": "changenumber=26, cn=changelog",
            "controls": [],
            "targetdn": policy_dn(POLICY, ACCOUNT),
            "changetype": "delete",
            "objectclass": "changelogentry",
            "changetime": "2014-02-07t18:16:42.402z",
            "changes": {
                "account": [ACCOUNT],
                "name": ["newname"],
                "objectclass": ["sdcaccountpolicy"],
                "rule": ["can read x and y when ip = 10.0.0.0/24"],
                "memberrole": [role_dn(ROLE_B), role_dn(ROLE_C)],
                "uuid": [POLICY],
                "_owner": [ACCOUNT],
                "_parent": [format!("uuid={ACCOUNT}, ou=users, o=smartdc")]
            },
            "changenumber": "26"
        })
    }

    /// The whole lifecycle in changelog order
    pub fn lifecycle() -> Vec<Value> {
        vec![
            add_developer_read(),
            rename_to_newname(),
            add_rule(),
            delete_rule(),
            replace_rules(),
            replace_member_roles(),
            delete_newname(),
        ]
    }

    /// The whole lifecycle, one JSON entry per line
    pub fn lifecycle_jsonl() -> String {
        lifecycle()
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
