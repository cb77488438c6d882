//! Survivor Selector
//!
//! Pure ranking of scored candidates: highest score first, then the policy's
//! tie-break, then ascending id. Ids are unique, so the ranking is total and
//! the outcome is the same on every call.

use crate::scoring::{ScoredCandidate, ScoringPolicy};
use std::cmp::Ordering;

/// Keeper and losers for one group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub keep_id: String,
    /// Losers in rank order (best loser first)
    pub delete_ids: Vec<String>,
}

/// Comparator used for ranking; `Less` means `a` ranks ahead of `b`
pub fn rank_order(a: &ScoredCandidate, b: &ScoredCandidate, policy: &dyn ScoringPolicy) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| policy.tie_break(&a.record, &b.record))
        .then_with(|| a.record.id.cmp(&b.record.id))
}

/// Candidates sorted best-first
pub fn rank<'a>(candidates: &'a [ScoredCandidate], policy: &dyn ScoringPolicy) -> Vec<&'a ScoredCandidate> {
    let mut ranked: Vec<&ScoredCandidate> = candidates.iter().collect();
    ranked.sort_by(|a, b| rank_order(a, b, policy));
    ranked
}

/// Pick exactly one keeper; `None` only for an empty group
pub fn select_survivor(candidates: &[ScoredCandidate], policy: &dyn ScoringPolicy) -> Option<Selection> {
    let ranked = rank(candidates, policy);
    let (keep, losers) = ranked.split_first()?;

    Some(Selection {
        keep_id: keep.record.id.clone(),
        delete_ids: losers.iter().map(|c| c.record.id.clone()).collect(),
    })
}
