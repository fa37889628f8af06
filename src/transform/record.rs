//! Canonical records kept under `id:<id>` keys.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::decode::DecodedPolicy;
use super::errors::TransformError;
use crate::rules::{ParsedRule, RuleParser};
use crate::store::StoredValue;

/// Array field of a role record listing the policies that grant the role.
pub const ROLE_POLICIES_FIELD: &str = "policies";

/// Canonical policy record, serialized as
/// `{"type": "policy", "uuid", "account", "name", "rules": [[text, parsed]], "roles"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "policy")]
pub struct PolicyRecord {
    #[serde(rename = "uuid")]
    pub id: String,
    pub account: String,
    pub name: String,
    /// Declaration order, duplicates kept
    pub rules: Vec<(String, ParsedRule)>,
    pub roles: BTreeSet<String>,
}

impl PolicyRecord {
    pub fn to_value(&self) -> Result<Value, TransformError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn rule_texts(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|(text, _)| text.as_str())
    }
}

/// Assemble the canonical record, parsing every rule text.
///
/// Fails on the first unparsable rule; no record is produced in that case.
pub fn build<P: RuleParser + ?Sized>(
    decoded: &DecodedPolicy,
    parser: &P,
) -> Result<PolicyRecord, TransformError> {
    let rules = decoded
        .rule_texts
        .iter()
        .map(|text| parser.parse(text).map(|parsed| (text.clone(), parsed)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PolicyRecord {
        id: decoded.id.clone(),
        account: decoded.account.clone(),
        name: decoded.name.clone(),
        rules,
        roles: decoded.role_ids.iter().cloned().collect(),
    })
}

/// Lenient view of a policy record already in the store, used as a modify pre-image.
///
/// Parsed rule bodies are not interpreted; only the texts are needed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoredPolicy {
    #[serde(rename = "uuid")]
    pub id: String,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rules: Vec<(String, Value)>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl StoredPolicy {
    /// `None` when the stored value is not a policy record.
    pub fn from_stored(value: &StoredValue) -> Option<Self> {
        let value = value.as_value()?;
        if value.get("type").and_then(Value::as_str) != Some("policy") {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    pub fn rule_texts(&self) -> Vec<String> {
        self.rules.iter().map(|(text, _)| text.clone()).collect()
    }
}

/// The part of a role record this crate writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleRecord {
    pub id: String,
    pub policies: BTreeSet<String>,
}

impl RoleRecord {
    pub fn from_stored(id: &str, value: &StoredValue) -> Option<Self> {
        let policies = value
            .as_value()?
            .get(ROLE_POLICIES_FIELD)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            id: id.to_string(),
            policies,
        })
    }
}
