//! Typed model of directory changelog entries.
//!
//! The wire shape carries `changes` as a flat attribute map for `add` and
//! `delete`, and as a list of attribute operations for `modify`, where the
//! merged post-image travels JSON-encoded in `entry`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Attribute name (lowercased) -> values.
pub type AttributeMap = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error, Diagnostic)]
pub enum ChangelogError {
    #[error("Malformed changelog JSON: {0}")]
    #[diagnostic(code(policy_replicator::changelog::json))]
    Json(#[from] serde_json::Error),

    #[error("Unknown changetype `{0}`")]
    #[diagnostic(
        code(policy_replicator::changelog::changetype),
        help("changetype must be one of `add`, `modify` or `delete`")
    )]
    UnknownChangeType(String),

    #[error("Invalid changenumber `{0}`")]
    #[diagnostic(code(policy_replicator::changelog::changenumber))]
    InvalidSequence(String),

    #[error("Invalid `{field}` payload: {reason}")]
    #[diagnostic(code(policy_replicator::changelog::payload))]
    InvalidPayload { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Modify,
    Delete,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Add => write!(f, "add"),
            ChangeKind::Modify => write!(f, "modify"),
            ChangeKind::Delete => write!(f, "delete"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModOp {
    Add,
    Delete,
    Replace,
}

/// One attribute operation of a `modify` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub operation: ModOp,
    /// Lowercased attribute name
    pub attribute: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Add(AttributeMap),
    Modify {
        modifications: Vec<Modification>,
        /// Full post-image; empty when the producer did not supply one
        snapshot: AttributeMap,
    },
    Delete(AttributeMap),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangelogEntry {
    pub sequence: u64,
    pub target_dn: String,
    pub changed_at: Option<DateTime<Utc>>,
    pub change: Change,
}

// ---------- wire format ----------

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSequence {
    Number(u64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    changenumber: RawSequence,
    changetype: String,
    #[serde(default)]
    targetdn: String,
    #[serde(default)]
    changetime: Option<String>,
    #[serde(default)]
    changes: Value,
    /// JSON-encoded post-image (modify only)
    #[serde(default)]
    entry: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawModification {
    operation: ModOp,
    modification: RawAttribute,
}

#[derive(Debug, Deserialize)]
struct RawAttribute {
    #[serde(rename = "type")]
    attribute: String,
    #[serde(default)]
    vals: Vec<Value>,
}

impl ChangelogEntry {
    /// Parse one changelog entry from its JSON wire form.
    pub fn from_json(source: &str) -> Result<Self, ChangelogError> {
        let raw: RawEntry = serde_json::from_str(source)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawEntry) -> Result<Self, ChangelogError> {
        let sequence = match raw.changenumber {
            RawSequence::Number(n) => n,
            RawSequence::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| ChangelogError::InvalidSequence(s.clone()))?,
        };

        let changed_at = raw.changetime.as_deref().and_then(|t| {
            match DateTime::parse_from_rfc3339(&t.to_ascii_uppercase()) {
                Ok(d) => Some(d.with_timezone(&Utc)),
                Err(e) => {
                    tracing::debug!(changetime = t, error = %e, "Ignoring unparsable changetime");
                    None
                }
            }
        });

        let change = match raw.changetype.to_ascii_lowercase().as_str() {
            "add" => Change::Add(attribute_map(&raw.changes, "changes")?),
            "delete" => Change::Delete(attribute_map(&raw.changes, "changes")?),
            "modify" => {
                let ops: Vec<RawModification> = serde_json::from_value(raw.changes).map_err(|e| {
                    ChangelogError::InvalidPayload {
                        field: "changes",
                        reason: e.to_string(),
                    }
                })?;
                let modifications = ops
                    .into_iter()
                    .map(|op| Modification {
                        operation: op.operation,
                        attribute: op.modification.attribute.to_ascii_lowercase(),
                        values: op.modification.vals.iter().map(value_text).collect(),
                    })
                    .collect();
                let snapshot = match raw.entry.as_deref() {
                    Some(encoded) if !encoded.trim().is_empty() => {
                        let value: Value = serde_json::from_str(encoded)?;
                        attribute_map(&value, "entry")?
                    }
                    _ => AttributeMap::new(),
                };
                Change::Modify {
                    modifications,
                    snapshot,
                }
            }
            other => return Err(ChangelogError::UnknownChangeType(other.to_string())),
        };

        Ok(Self {
            sequence,
            target_dn: raw.targetdn,
            changed_at,
            change,
        })
    }

    pub fn kind(&self) -> ChangeKind {
        match self.change {
            Change::Add(_) => ChangeKind::Add,
            Change::Modify { .. } => ChangeKind::Modify,
            Change::Delete(_) => ChangeKind::Delete,
        }
    }

    /// Object classes of the changed entry, lowercased.
    pub fn objectclasses(&self) -> Vec<String> {
        let attrs = match &self.change {
            Change::Add(attrs) | Change::Delete(attrs) => attrs,
            Change::Modify { snapshot, .. } => snapshot,
        };
        attrs
            .get("objectclass")
            .map(|v| v.iter().map(|c| c.to_ascii_lowercase()).collect())
            .unwrap_or_default()
    }
}

fn attribute_map(value: &Value, field: &'static str) -> Result<AttributeMap, ChangelogError> {
    let object = value.as_object().ok_or_else(|| ChangelogError::InvalidPayload {
        field,
        reason: "expected an object of attribute values".into(),
    })?;

    let mut attrs = AttributeMap::new();
    for (name, values) in object {
        let values: Vec<String> = match values {
            Value::Array(items) => items.iter().map(value_text).collect(),
            Value::Null => Vec::new(),
            single => vec![value_text(single)],
        };
        attrs
            .entry(name.to_ascii_lowercase())
            .or_default()
            .extend(values);
    }
    Ok(attrs)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
