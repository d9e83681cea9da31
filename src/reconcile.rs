//! Snapshot reconciliation.
//!
//! Merges the rows of the previous snapshot with freshly fetched records:
//!
//! - an existing row whose `case_id` was fetched again is replaced wholesale
//!   by the fresh record (status changes, closures, ...);
//! - an existing row that was not fetched again is kept verbatim, so nothing
//!   is ever deleted;
//! - a fetched record with an unknown or empty `case_id` is appended.
//!
//! The result is stably sorted by `open_date`, with empty dates first and
//! ties keeping their pre-sort order, so the same inputs always produce the
//! same file.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::models::Record;

/// Fatal reconciliation outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// No existing rows and nothing fetched: writing would produce an empty snapshot.
    NothingToPersist,
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileError::NothingToPersist => {
                write!(f, "no records fetched and no existing snapshot to keep")
            }
        }
    }
}

impl std::error::Error for ReconcileError {}

/// Row counts produced by a reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Existing rows kept as they were.
    pub retained: usize,
    /// Existing rows replaced by a fresh record.
    pub updated: usize,
    /// Subset of `updated` whose values actually differed.
    pub changed: usize,
    /// Fresh records added as new rows.
    pub appended: usize,
}

impl ReconcileStats {
    pub fn total(&self) -> usize {
        self.retained + self.updated + self.appended
    }
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub rows: Vec<Record>,
    pub stats: ReconcileStats,
}

/// Identity keys of `rows`, skipping rows without one.
pub fn identity_set(rows: &[Record]) -> HashSet<String> {
    rows.iter()
        .filter_map(|r| r.case_id().map(str::to_owned))
        .collect()
}

/// Merge `fresh` into `existing_rows`.
///
/// `existing_ids` must be the identity set of `existing_rows`. Within
/// `fresh`, a repeated `case_id` resolves to its last occurrence.
pub fn reconcile(
    existing_rows: Vec<Record>,
    existing_ids: &HashSet<String>,
    fresh: Vec<Record>,
) -> Result<Reconciliation, ReconcileError> {
    if existing_rows.is_empty() && fresh.is_empty() {
        return Err(ReconcileError::NothingToPersist);
    }

    let mut updates: HashMap<String, Record> = HashMap::new();
    let mut appended: Vec<Record> = Vec::new();
    let mut appended_at: HashMap<String, usize> = HashMap::new();

    for record in fresh {
        let key = record.case_id().map(str::to_owned);
        match key {
            Some(id) if existing_ids.contains(&id) => {
                updates.insert(id, record);
            }
            Some(id) => match appended_at.get(&id) {
                Some(&i) => appended[i] = record,
                None => {
                    appended_at.insert(id, appended.len());
                    appended.push(record);
                }
            },
            None => appended.push(record),
        }
    }

    let mut stats = ReconcileStats::default();
    let mut rows = Vec::with_capacity(existing_rows.len() + appended.len());
    let mut matched: HashSet<String> = HashSet::with_capacity(updates.len());

    for row in existing_rows {
        let replacement = row
            .case_id()
            .and_then(|id| updates.get_key_value(id))
            .map(|(id, fresh)| (id.clone(), fresh.clone()));

        match replacement {
            Some((id, fresh)) => {
                stats.updated += 1;
                if fresh != row {
                    stats.changed += 1;
                }
                matched.insert(id);
                rows.push(fresh);
            }
            None => {
                stats.retained += 1;
                rows.push(row);
            }
        }
    }

    // An id listed in existing_ids with no backing row still must not be lost.
    let mut orphans: Vec<(String, Record)> = updates
        .into_iter()
        .filter(|(id, _)| !matched.contains(id))
        .collect();
    orphans.sort_by(|a, b| a.0.cmp(&b.0));
    appended.extend(orphans.into_iter().map(|(_, r)| r));

    stats.appended = appended.len();
    rows.extend(appended);

    rows.sort_by(|a, b| a.open_date().cmp(b.open_date()));

    Ok(Reconciliation { rows, stats })
}
