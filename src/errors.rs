use miette::Diagnostic;
use thiserror::Error;

use crate::changelog::ChangelogError;
use crate::transform::TransformError;

#[derive(Debug, Error, Diagnostic)]
pub enum ReplicatorError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(policy_replicator::io))]
    Io(#[from] std::io::Error),

    #[error("Changelog entry at line {line} is unreadable")]
    #[diagnostic(code(policy_replicator::changelog))]
    Changelog {
        line: usize,
        #[source]
        #[diagnostic_source]
        source: ChangelogError,
    },

    #[error("Changelog entry {sequence} could not be applied")]
    #[diagnostic(code(policy_replicator::transform))]
    Transform {
        sequence: u64,
        #[source]
        #[diagnostic_source]
        source: TransformError,
    },
}
