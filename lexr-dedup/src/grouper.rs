//! Identity Grouper
//!
//! Partitions a raw snapshot into groups sharing an identity key. Groups are
//! kept in first-seen order and members keep their fetch order; nothing here
//! sorts.

use crate::error::{ReconcileError, ReconcileResult};
use crate::model::{IdentityKey, KeyMode, Record};
use crate::store::{RecordFilter, RecordStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Records sharing one identity key at scan time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub key: IdentityKey,
    pub records: Vec<Record>,
}

impl Group {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_duplicate(&self) -> bool {
        self.records.len() > 1
    }
}

/// Counts derived from one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub total_records: usize,
    pub unique_combinations: usize,
    pub duplicate_groups: usize,
    /// Σ(|group| - 1) over groups with more than one member
    pub total_duplicate_records: usize,
}

impl ScanStats {
    pub fn is_clean(&self) -> bool {
        self.duplicate_groups == 0
    }
}

/// Output of one grouping pass
#[derive(Debug, Clone, Default)]
pub struct Grouping {
    groups: Vec<Group>,
    total_records: usize,
}

impl Grouping {
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn get(&self, key: &IdentityKey) -> Option<&Group> {
        self.groups.iter().find(|g| &g.key == key)
    }

    /// Groups with more than one member, in first-seen order
    pub fn duplicates(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter().filter(|g| g.is_duplicate())
    }

    /// The `n` largest duplicate groups; ties keep first-seen order
    pub fn largest(&self, n: usize) -> Vec<&Group> {
        let mut dups: Vec<&Group> = self.duplicates().collect();
        dups.sort_by(|a, b| b.len().cmp(&a.len()));
        dups.truncate(n);
        dups
    }

    pub fn stats(&self) -> ScanStats {
        let mut stats = ScanStats {
            total_records: self.total_records,
            unique_combinations: self.groups.len(),
            ..ScanStats::default()
        };
        for group in self.duplicates() {
            stats.duplicate_groups += 1;
            stats.total_duplicate_records += group.len() - 1;
        }
        stats
    }
}

/// Group records in memory by identity key
pub fn group_records(records: Vec<Record>, mode: KeyMode) -> Grouping {
    let total_records = records.len();
    let mut index: HashMap<IdentityKey, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();

    for record in records {
        let key = record.identity_key(mode);
        match index.get(&key) {
            Some(&slot) => groups[slot].records.push(record),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(Group {
                    key,
                    records: vec![record],
                });
            }
        }
    }

    Grouping {
        groups,
        total_records,
    }
}

/// ANALYZE: fetch a raw snapshot and group it
pub async fn analyze<S: RecordStore + ?Sized>(
    store: &S,
    filter: Option<&RecordFilter>,
    mode: KeyMode,
    phase: &'static str,
) -> ReconcileResult<Grouping> {
    let records = store
        .fetch_all(filter)
        .await
        .map_err(|e| ReconcileError::fetch(phase, e))?;

    let grouping = group_records(records, mode);
    let stats = grouping.stats();
    info!(
        phase,
        total_records = stats.total_records,
        unique_combinations = stats.unique_combinations,
        duplicate_groups = stats.duplicate_groups,
        total_duplicate_records = stats.total_duplicate_records,
        "Scan complete"
    );
    Ok(grouping)
}
