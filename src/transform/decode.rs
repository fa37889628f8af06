//! Extracts typed policy fields from changelog attribute maps.

use std::collections::BTreeSet;

use super::errors::TransformError;
use super::record::StoredPolicy;
use crate::changelog::{AttributeMap, ModOp, Modification};

pub const ATTR_ID: &str = "uuid";
pub const ATTR_ACCOUNT: &str = "account";
pub const ATTR_NAME: &str = "name";
pub const ATTR_RULE: &str = "rule";
pub const ATTR_MEMBER_ROLE: &str = "memberrole";

/// DN component naming the policy in a changelog `targetdn`.
const DN_POLICY_ID: &str = "policy-uuid";
/// DN component naming the role in a `memberrole` value.
const DN_ROLE_ID: &str = "role-uuid";

/// A changelog entry decoded according to its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEntry {
    Add(DecodedPolicy),
    Modify(DecodedModify),
    Delete(DecodedRemoval),
}

/// Full attribute set of a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPolicy {
    pub id: String,
    pub account: String,
    pub name: String,
    pub rule_texts: Vec<String>,
    /// Bare role ids, in attribute order
    pub role_ids: Vec<String>,
}

/// What a delete entry says about the policy being removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRemoval {
    pub id: String,
    pub account: String,
    pub name: Option<String>,
    pub role_ids: Vec<String>,
}

/// State of the policy before a modify, as far as it is known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreImage {
    pub account: Option<String>,
    pub name: Option<String>,
    /// `None` when only reconstructed from the operations
    pub rule_texts: Option<Vec<String>>,
    pub role_ids: BTreeSet<String>,
    /// False when `role_ids` could not be read from a stored record
    pub roles_known: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackedAttribute {
    Name,
    Rule,
    MemberRole,
    Other(String),
}

/// One modify operation; `memberrole` values are already bare role ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeOp {
    pub operation: ModOp,
    pub attribute: TrackedAttribute,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedModify {
    pub id: String,
    pub account: String,
    pub pre_image: PreImage,
    pub post_image: DecodedPolicy,
    pub operations: Vec<AttributeOp>,
}

fn first<'a>(attrs: &'a AttributeMap, name: &str) -> Option<&'a str> {
    attrs
        .get(name)
        .and_then(|values| values.first())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn required(attrs: &AttributeMap, name: &str, kind: &'static str) -> Result<String, TransformError> {
    first(attrs, name)
        .map(str::to_string)
        .ok_or_else(|| TransformError::decode(kind, format!("missing required attribute `{name}`")))
}

/// Value of the first `attr=value` component of a DN.
pub fn dn_component(dn: &str, attr: &str) -> Option<String> {
    dn.split(',').find_map(|rdn| {
        let (key, value) = rdn.split_once('=')?;
        let value = value.trim();
        (key.trim().eq_ignore_ascii_case(attr) && !value.is_empty()).then(|| value.to_string())
    })
}

/// Bare role id of a `memberrole` value.
///
/// Accepts either a role DN (`role-uuid=<id>, uuid=<account>, ...`) or an id.
pub fn role_id(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if !value.contains('=') && !value.contains(',') {
        return Some(value.to_string());
    }
    dn_component(value, DN_ROLE_ID)
}

fn role_ids<'a>(
    values: impl IntoIterator<Item = &'a String>,
    kind: &'static str,
) -> Result<Vec<String>, TransformError> {
    values
        .into_iter()
        .map(|v| {
            role_id(v).ok_or_else(|| {
                TransformError::decode(kind, format!("`{v}` is not a member role reference"))
            })
        })
        .collect()
}

pub fn decode_add(attrs: &AttributeMap) -> Result<DecodedPolicy, TransformError> {
    let kind = "add";
    Ok(DecodedPolicy {
        id: required(attrs, ATTR_ID, kind)?,
        account: required(attrs, ATTR_ACCOUNT, kind)?,
        name: required(attrs, ATTR_NAME, kind)?,
        rule_texts: attrs.get(ATTR_RULE).cloned().unwrap_or_default(),
        role_ids: role_ids(attrs.get(ATTR_MEMBER_ROLE).into_iter().flatten(), kind)?,
    })
}

/// Delete entries carry the full attribute set of the removed policy.
pub fn decode_delete(attrs: &AttributeMap) -> Result<DecodedRemoval, TransformError> {
    let kind = "delete";
    Ok(DecodedRemoval {
        id: required(attrs, ATTR_ID, kind)?,
        account: required(attrs, ATTR_ACCOUNT, kind)?,
        name: first(attrs, ATTR_NAME).map(str::to_string),
        role_ids: role_ids(attrs.get(ATTR_MEMBER_ROLE).into_iter().flatten(), kind)?,
    })
}

/// Id of the policy a modify entry targets: the snapshot's `uuid`, else the
/// `policy-uuid` component of the target DN.
pub fn modify_target_id(snapshot: &AttributeMap, target_dn: &str) -> Result<String, TransformError> {
    first(snapshot, ATTR_ID)
        .map(str::to_string)
        .or_else(|| dn_component(target_dn, DN_POLICY_ID))
        .ok_or_else(|| {
            TransformError::decode("modify", "neither the entry snapshot nor the target DN names the policy")
        })
}

/// Decode a modify entry.
///
/// `stored` is the record currently under `id:<id>`, if any. Post-image
/// fields come from the snapshot when it carries the attribute, otherwise
/// from the pre-image with the operations applied in order.
pub fn decode_modify(
    id: String,
    modifications: &[Modification],
    snapshot: &AttributeMap,
    stored: Option<StoredPolicy>,
) -> Result<DecodedModify, TransformError> {
    let kind = "modify";

    let operations = modifications
        .iter()
        .map(|m| -> Result<AttributeOp, TransformError> {
            let (attribute, values) = match m.attribute.as_str() {
                ATTR_NAME => (TrackedAttribute::Name, m.values.clone()),
                ATTR_RULE => (TrackedAttribute::Rule, m.values.clone()),
                ATTR_MEMBER_ROLE => (TrackedAttribute::MemberRole, role_ids(&m.values, kind)?),
                other => (TrackedAttribute::Other(other.to_string()), m.values.clone()),
            };
            Ok(AttributeOp {
                operation: m.operation,
                attribute,
                values,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let pre_image = match stored {
        Some(stored) => PreImage {
            rule_texts: Some(stored.rule_texts()),
            account: stored.account,
            name: stored.name,
            role_ids: stored.roles,
            roles_known: true,
        },
        None => reconstruct_pre_image(&operations),
    };

    let account = first(snapshot, ATTR_ACCOUNT)
        .map(str::to_string)
        .or_else(|| pre_image.account.clone())
        .ok_or_else(|| TransformError::decode(kind, "account of the policy is unknown"))?;

    let name = match first(snapshot, ATTR_NAME) {
        Some(name) => name.to_string(),
        None => {
            let current: Vec<String> = pre_image.name.iter().cloned().collect();
            apply_operations(current, &operations, &TrackedAttribute::Name)
                .into_iter()
                .next()
                .ok_or_else(|| TransformError::decode(kind, "name of the policy is unknown"))?
        }
    };

    let rule_texts = match snapshot.get(ATTR_RULE) {
        Some(rules) => rules.clone(),
        None => apply_operations(
            pre_image.rule_texts.clone().unwrap_or_default(),
            &operations,
            &TrackedAttribute::Rule,
        ),
    };

    let role_ids = match snapshot.get(ATTR_MEMBER_ROLE) {
        Some(values) => role_ids(values, kind)?,
        None => apply_operations(
            pre_image.role_ids.iter().cloned().collect(),
            &operations,
            &TrackedAttribute::MemberRole,
        ),
    };

    Ok(DecodedModify {
        post_image: DecodedPolicy {
            id: id.clone(),
            account: account.clone(),
            name,
            rule_texts,
            role_ids,
        },
        id,
        account,
        pre_image,
        operations,
    })
}

/// Without a stored record, the only pre-image facts are the values that
/// `delete` operations name.
fn reconstruct_pre_image(operations: &[AttributeOp]) -> PreImage {
    let name = operations
        .iter()
        .filter(|op| op.attribute == TrackedAttribute::Name && op.operation == ModOp::Delete)
        .find_map(|op| op.values.first().cloned());

    PreImage {
        account: None,
        name,
        rule_texts: None,
        role_ids: BTreeSet::new(),
        roles_known: false,
    }
}

/// Replay the operations on `attribute` over `current`.
///
/// `add` appends, `delete` removes every matching value (or everything when
/// no values are given), `replace` substitutes.
fn apply_operations(
    mut current: Vec<String>,
    operations: &[AttributeOp],
    attribute: &TrackedAttribute,
) -> Vec<String> {
    for op in operations.iter().filter(|op| &op.attribute == attribute) {
        match op.operation {
            ModOp::Add => current.extend(op.values.iter().cloned()),
            ModOp::Delete if op.values.is_empty() => current.clear(),
            ModOp::Delete => current.retain(|v| !op.values.contains(v)),
            ModOp::Replace => current = op.values.clone(),
        }
    }
    current
}
