use miette::Diagnostic;
use thiserror::Error;

use crate::rules::RuleSyntaxError;
use crate::store::StoreError;

/// Why a single changelog entry could not be transformed or applied.
///
/// Every variant means nothing from that entry reached the store.
#[derive(Debug, Error, Diagnostic)]
pub enum TransformError {
    #[error("Cannot decode {kind} entry: {reason}")]
    #[diagnostic(
        code(policy_replicator::transform::decode),
        help("Policy entries need `uuid` and `account` attributes, and `name` on add")
    )]
    Decode { kind: &'static str, reason: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    InvalidRuleSyntax(#[from] RuleSyntaxError),

    #[error("Cannot encode policy record: {0}")]
    #[diagnostic(code(policy_replicator::transform::encode))]
    Encode(#[from] serde_json::Error),

    #[error("Failed to read the current record of policy `{id}`")]
    #[diagnostic(code(policy_replicator::transform::pre_image))]
    PreImageLookup {
        id: String,
        #[source]
        source: StoreError,
    },

    #[error("Store rejected a batch of {ops} operation(s)")]
    #[diagnostic(
        code(policy_replicator::transform::batch_submission),
        help("The batch was not applied; redeliver the changelog entry to retry")
    )]
    BatchSubmission {
        ops: usize,
        #[source]
        source: StoreError,
    },
}

impl TransformError {
    pub(crate) fn decode(kind: &'static str, reason: impl Into<String>) -> Self {
        TransformError::Decode {
            kind,
            reason: reason.into(),
        }
    }
}
