pub mod parser;
pub mod types;

use miette::Diagnostic;
use thiserror::Error;

pub use parser::StatementParser;
pub use types::{Comparison, Condition, Effect, Literal, ParsedRule, ValueType};

/// A rule text that does not follow the rule grammar.
#[derive(Debug, Clone, Error, Diagnostic)]
#[error("Invalid rule syntax in `{rule}`: {reason}")]
#[diagnostic(
    code(policy_replicator::rules::invalid_syntax),
    help("Rules look like: [principals] can <actions> [resources] [when <conditions>]")
)]
pub struct RuleSyntaxError {
    pub rule: String,
    pub reason: String,
}

/// Converts one textual rule into its structured form.
///
/// Implementations must be pure: the same text always yields the same result.
pub trait RuleParser: Send + Sync {
    fn parse(&self, text: &str) -> Result<ParsedRule, RuleSyntaxError>;
}
