use std::str::FromStr;

use thiserror::Error;

use crate::domain::clock::CaptureTimestamp;
use crate::domain::models::{ChargerKey, Snapshot, StatusRecord};

/// What to do with a status update whose charger is not in the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnmatchedPolicy {
    /// Leave the update out and report its key in `Reconciliation::unmatched`.
    #[default]
    Skip,
    /// Abort the whole batch; the input snapshot stays authoritative.
    Fail,
}

impl FromStr for UnmatchedPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "fail" => Ok(Self::Fail),
            other => Err(format!("unknown unmatched policy: {other}")),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("status update #{position} targets charger {key} which is not in the snapshot")]
    UnmatchedKey { key: ChargerKey, position: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub snapshot: Snapshot,
    /// Snapshot row of every applied update, in feed order. Repeats are kept.
    pub updated_rows: Vec<usize>,
    /// Number of status records received, matched or not.
    pub update_count: usize,
    pub unmatched: Vec<ChargerKey>,
}

/// Merges a status feed into a copy of `snapshot`. The result carries `reconciled_at`
/// as its capture time; `snapshot` itself is never modified.
pub fn reconcile(
    snapshot: &Snapshot,
    updates: &[StatusRecord],
    reconciled_at: CaptureTimestamp,
    policy: UnmatchedPolicy,
) -> Result<Reconciliation, ReconcileError> {
    let mut next = snapshot.next_version(reconciled_at);
    let mut updated_rows = Vec::with_capacity(updates.len());
    let mut unmatched = Vec::new();

    for (position, update) in updates.iter().enumerate() {
        let key = update.key();
        let Some(row) = next.row_of(&key) else {
            match policy {
                UnmatchedPolicy::Fail => {
                    return Err(ReconcileError::UnmatchedKey { key, position });
                }
                UnmatchedPolicy::Skip => {
                    unmatched.push(key);
                    continue;
                }
            }
        };

        next.apply_status_at(row, update);
        updated_rows.push(row);
    }

    Ok(Reconciliation {
        snapshot: next,
        updated_rows,
        update_count: updates.len(),
        unmatched,
    })
}
