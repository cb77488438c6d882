//! Report-only analysis
//!
//! Ranks the largest duplicate groups under the report policy so operators
//! can see what each policy would keep. Never mutates the store.

use crate::grouper::{Grouping, ScanStats};
use crate::scoring::{ScoredCandidate, ScoringPolicy};
use crate::selector::rank;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Serialize)]
pub struct AdvisoryGroup {
    pub key: String,
    /// Best-first
    pub candidates: Vec<ScoredCandidate>,
}

impl AdvisoryGroup {
    pub fn keep_id(&self) -> Option<&str> {
        self.candidates.first().map(|c| c.record.id.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AdvisoryReport {
    pub policy: &'static str,
    pub stats: ScanStats,
    pub groups: Vec<AdvisoryGroup>,
}

impl AdvisoryReport {
    pub fn build(grouping: &Grouping, policy: &dyn ScoringPolicy, top_n: usize) -> Self {
        let groups = grouping
            .largest(top_n)
            .into_iter()
            .map(|group| {
                let scored = policy.score(&group.records);
                AdvisoryGroup {
                    key: group.key.to_string(),
                    candidates: rank(&scored, policy).into_iter().cloned().collect(),
                }
            })
            .collect();

        Self {
            policy: policy.name(),
            stats: grouping.stats(),
            groups,
        }
    }
}

impl fmt::Display for AdvisoryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total records:           {}", self.stats.total_records)?;
        writeln!(f, "Unique combinations:     {}", self.stats.unique_combinations)?;
        writeln!(f, "Duplicate groups:        {}", self.stats.duplicate_groups)?;
        writeln!(f, "Total duplicate records: {}", self.stats.total_duplicate_records)?;
        if self.groups.is_empty() {
            return Ok(());
        }
        writeln!(f, "\nLargest groups (advisory keeper under {}):", self.policy)?;
        for group in &self.groups {
            writeln!(f, "\n{} x{}", group.key, group.candidates.len())?;
            for (i, c) in group.candidates.iter().enumerate() {
                let marker = if i == 0 { "KEEP  " } else { "delete" };
                writeln!(
                    f,
                    "  {} {} score={} created={} pos={} [{}]",
                    marker,
                    c.record.id,
                    c.score,
                    c.record.created_at.to_rfc3339(),
                    c.record.position.map_or("-".to_string(), |p| p.to_string()),
                    c.reasons.join("; ")
                )?;
            }
        }
        Ok(())
    }
}
