//! Reconciliation plan
//!
//! Built once per run from one scan and never recomputed while deleting:
//! if the store changes mid-run, the executor still works from the plan it
//! backed up.

use crate::grouper::Grouping;
use crate::model::{IdentityKey, Record};
use crate::scoring::ScoringPolicy;
use crate::selector::select_survivor;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Keeper and losers for one duplicate group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupDecision {
    pub key: IdentityKey,
    pub keep: Record,
    /// Losers in rank order
    pub delete: Vec<Record>,
}

impl GroupDecision {
    pub fn delete_ids(&self) -> impl Iterator<Item = &str> {
        self.delete.iter().map(|r| r.id.as_str())
    }
}

/// Immutable per-run plan
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationPlan {
    policy: &'static str,
    built_at: DateTime<Utc>,
    decisions: Vec<GroupDecision>,
}

impl ReconciliationPlan {
    /// Score and select every non-singleton group
    pub fn build(grouping: &Grouping, policy: &dyn ScoringPolicy) -> Self {
        let decisions = grouping
            .duplicates()
            .filter_map(|group| {
                let scored = policy.score(&group.records);
                let selection = select_survivor(&scored, policy)?;

                let keep = group.records.iter().find(|r| r.id == selection.keep_id)?.clone();
                let delete = selection
                    .delete_ids
                    .iter()
                    .filter_map(|id| group.records.iter().find(|r| &r.id == id).cloned())
                    .collect();

                Some(GroupDecision {
                    key: group.key.clone(),
                    keep,
                    delete,
                })
            })
            .collect();

        Self {
            policy: policy.name(),
            built_at: Utc::now(),
            decisions,
        }
    }

    pub fn policy(&self) -> &'static str {
        self.policy
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn decisions(&self) -> &[GroupDecision] {
        &self.decisions
    }

    /// Every id slated for deletion, group by group
    pub fn delete_ids(&self) -> Vec<String> {
        self.decisions
            .iter()
            .flat_map(|d| d.delete_ids().map(str::to_string))
            .collect()
    }

    /// Full rows slated for deletion (rollback material)
    pub fn delete_records(&self) -> Vec<&Record> {
        self.decisions.iter().flat_map(|d| d.delete.iter()).collect()
    }

    pub fn total_deletes(&self) -> usize {
        self.decisions.iter().map(|d| d.delete.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }
}
