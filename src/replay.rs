//! Replays a JSON-lines changelog file through a [`Replicator`].

use std::path::Path;

use crate::changelog::ChangelogEntry;
use crate::errors::ReplicatorError;
use crate::rules::RuleParser;
use crate::store::KeyValueStore;
use crate::transform::decode::dn_component;
use crate::transform::Replicator;

/// Object class of account policy entries.
pub const POLICY_OBJECTCLASS: &str = "sdcaccountpolicy";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Mutations committed across all applied entries
    pub operations: usize,
    /// Sequence of the last entry applied or passed over as non-policy
    pub last_sequence: Option<u64>,
}

/// Whether the entry describes an account policy.
///
/// Modify entries may lack a snapshot; those are recognized by their target DN.
pub fn is_policy_entry(entry: &ChangelogEntry) -> bool {
    let classes = entry.objectclasses();
    if classes.is_empty() {
        return dn_component(&entry.target_dn, "policy-uuid").is_some();
    }
    classes.iter().any(|c| c == POLICY_OBJECTCLASS)
}

/// Apply every policy entry of a changelog file, in file order.
pub async fn replay_file<S, P>(
    replicator: &Replicator<S, P>,
    path: &Path,
    stop_on_error: bool,
) -> Result<ReplayStats, ReplicatorError>
where
    S: KeyValueStore + ?Sized,
    P: RuleParser,
{
    tracing::info!(path = %path.display(), "Replaying changelog");
    let content = tokio::fs::read_to_string(path).await?;
    let stats = replay_lines(replicator, &content, stop_on_error).await?;

    tracing::info!(
        applied = stats.applied,
        skipped = stats.skipped,
        failed = stats.failed,
        operations = stats.operations,
        "Changelog replay complete"
    );
    Ok(stats)
}

/// Apply JSON-lines changelog content. Blank lines are ignored.
///
/// Entries whose sequence number is below the last one handled are skipped;
/// entries sharing a sequence number are all applied. Unless `stop_on_error`
/// is set, unreadable or failing entries are counted and logged and the
/// replay carries on.
pub async fn replay_lines<S, P>(
    replicator: &Replicator<S, P>,
    content: &str,
    stop_on_error: bool,
) -> Result<ReplayStats, ReplicatorError>
where
    S: KeyValueStore + ?Sized,
    P: RuleParser,
{
    let mut stats = ReplayStats::default();

    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let entry = match ChangelogEntry::from_json(line) {
            Ok(entry) => entry,
            Err(source) => {
                if stop_on_error {
                    return Err(ReplicatorError::Changelog {
                        line: line_no,
                        source,
                    });
                }
                tracing::error!(line = line_no, error = %source, "Unreadable changelog entry");
                stats.failed += 1;
                continue;
            }
        };

        // Several entries may share a sequence number; only going backwards is stale.
        if let Some(last) = stats.last_sequence {
            if entry.sequence < last {
                tracing::warn!(
                    sequence = entry.sequence,
                    last_sequence = last,
                    "Out-of-order changelog entry, skipping"
                );
                stats.skipped += 1;
                continue;
            }
        }

        if !is_policy_entry(&entry) {
            tracing::trace!(sequence = entry.sequence, "Not a policy entry");
            stats.last_sequence = Some(entry.sequence);
            stats.skipped += 1;
            continue;
        }

        // A failed entry leaves `last_sequence` alone so a redelivery is applied.
        match replicator.apply(&entry).await {
            Ok(outcome) => {
                stats.last_sequence = Some(entry.sequence);
                stats.applied += 1;
                stats.operations += outcome.operations;
            }
            Err(source) => {
                if stop_on_error {
                    return Err(ReplicatorError::Transform {
                        sequence: entry.sequence,
                        source,
                    });
                }
                tracing::error!(
                    sequence = entry.sequence,
                    kind = %entry.kind(),
                    error = %source,
                    "Failed to apply changelog entry"
                );
                stats.failed += 1;
            }
        }
    }

    Ok(stats)
}
