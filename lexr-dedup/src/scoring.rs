//! Candidate Scorer
//!
//! Scores are relative to the other members of the same group only. Each
//! signal is a pure function `(candidate, group, weights) -> Option<Contribution>`
//! so it can be tested in isolation; a policy sums the signals it uses.
//!
//! # Policies
//!
//! Two ranking policies exist and they pick different keepers for the same
//! group, so every entry point names the one it uses:
//!
//! - [`RecencyAndQuality`]: newest record plus asset-quality signals.
//!   Default for report-only paths (`analyze`, monitor alerts).
//! - [`PositionThenRecency`]: no score signals, pure tie-break on ascending
//!   position then ascending `created_at`, i.e. keeps the earliest-placed,
//!   oldest row. Default for the deleting path (`reconcile`).

use crate::model::Record;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Weights and payload markers used by the quality signals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub recency: i64,
    pub asset_presence: i64,
    pub sizing_marker: i64,
    pub gradient_marker: i64,
    pub pipeline_marker: i64,
    pub asset_size: i64,
    /// Payload length (bytes) at or above which `asset_size` applies
    pub asset_size_threshold: usize,
    pub sizing_token: String,
    pub gradient_tokens: Vec<String>,
    /// Naming convention left by the current SVG generation pipeline
    pub pipeline_token: String,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            recency: 10,
            asset_presence: 5,
            sizing_marker: 2,
            gradient_marker: 3,
            pipeline_marker: 2,
            asset_size: 3,
            asset_size_threshold: 2000,
            sizing_token: "viewBox".to_string(),
            gradient_tokens: vec!["<linearGradient".to_string(), "<radialGradient".to_string()],
            pipeline_token: "data-pipeline=".to_string(),
        }
    }
}

/// One signal's share of a candidate's score
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contribution {
    pub delta: i64,
    pub reason: String,
}

impl Contribution {
    fn new(delta: i64, reason: impl Into<String>) -> Self {
        Self {
            delta,
            reason: reason.into(),
        }
    }
}

/// Signal function signature
pub type Signal = fn(&Record, &[Record], &ScoringWeights) -> Option<Contribution>;

/// Newest `created_at` in the group (ties all qualify)
pub fn recency_signal(candidate: &Record, group: &[Record], w: &ScoringWeights) -> Option<Contribution> {
    let newest = group.iter().map(|r| r.created_at).max()?;
    (candidate.created_at == newest).then(|| Contribution::new(w.recency, "most recent in group"))
}

pub fn asset_presence_signal(candidate: &Record, _group: &[Record], w: &ScoringWeights) -> Option<Contribution> {
    candidate
        .asset()
        .map(|_| Contribution::new(w.asset_presence, "has generated asset"))
}

pub fn sizing_marker_signal(candidate: &Record, _group: &[Record], w: &ScoringWeights) -> Option<Contribution> {
    let asset = candidate.asset()?;
    asset
        .contains(w.sizing_token.as_str())
        .then(|| Contribution::new(w.sizing_marker, format!("asset declares {}", w.sizing_token)))
}

pub fn gradient_marker_signal(candidate: &Record, _group: &[Record], w: &ScoringWeights) -> Option<Contribution> {
    let asset = candidate.asset()?;
    w.gradient_tokens
        .iter()
        .any(|token| asset.contains(token.as_str()))
        .then(|| Contribution::new(w.gradient_marker, "asset defines a gradient"))
}

pub fn pipeline_marker_signal(candidate: &Record, _group: &[Record], w: &ScoringWeights) -> Option<Contribution> {
    let asset = candidate.asset()?;
    asset
        .contains(w.pipeline_token.as_str())
        .then(|| Contribution::new(w.pipeline_marker, "asset from current generation pipeline"))
}

pub fn asset_size_signal(candidate: &Record, _group: &[Record], w: &ScoringWeights) -> Option<Contribution> {
    let asset = candidate.asset()?;
    (asset.len() >= w.asset_size_threshold).then(|| {
        Contribution::new(
            w.asset_size,
            format!("asset size {} >= {} bytes", asset.len(), w.asset_size_threshold),
        )
    })
}

/// Record annotated with its score within one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredCandidate {
    pub record: Record,
    pub score: i64,
    pub reasons: Vec<String>,
}

/// Sum `signals` for every member of `group`, preserving member order
pub fn score_with(signals: &[Signal], group: &[Record], weights: &ScoringWeights) -> Vec<ScoredCandidate> {
    group
        .iter()
        .map(|candidate| {
            let mut score = 0;
            let mut reasons = Vec::new();
            for signal in signals {
                if let Some(c) = signal(candidate, group, weights) {
                    score += c.delta;
                    reasons.push(format!("{:+} {}", c.delta, c.reason));
                }
            }
            ScoredCandidate {
                record: candidate.clone(),
                score,
                reasons,
            }
        })
        .collect()
}

/// Ranking strategy for one group
pub trait ScoringPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Score every member; order matches `group`
    fn score(&self, group: &[Record]) -> Vec<ScoredCandidate>;

    /// Ordering among equal scores; `Less` means `a` is preferred.
    /// The selector breaks any remaining tie on ascending id.
    fn tie_break(&self, a: &Record, b: &Record) -> Ordering;
}

/// Ascending position (absent last), then ascending `created_at`
pub fn position_then_created(a: &Record, b: &Record) -> Ordering {
    let by_position = match (a.position, b.position) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_position.then_with(|| a.created_at.cmp(&b.created_at))
}

/// Newest record plus asset quality
#[derive(Debug, Clone, Default)]
pub struct RecencyAndQuality {
    weights: ScoringWeights,
}

impl RecencyAndQuality {
    pub const SIGNALS: [Signal; 6] = [
        recency_signal,
        asset_presence_signal,
        sizing_marker_signal,
        gradient_marker_signal,
        pipeline_marker_signal,
        asset_size_signal,
    ];

    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }
}

impl ScoringPolicy for RecencyAndQuality {
    fn name(&self) -> &'static str {
        "recency_and_quality"
    }

    fn score(&self, group: &[Record]) -> Vec<ScoredCandidate> {
        score_with(&Self::SIGNALS, group, &self.weights)
    }

    fn tie_break(&self, a: &Record, b: &Record) -> Ordering {
        position_then_created(a, b)
    }
}

/// Earliest position, then oldest record
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionThenRecency;

impl ScoringPolicy for PositionThenRecency {
    fn name(&self) -> &'static str {
        "position_then_recency"
    }

    fn score(&self, group: &[Record]) -> Vec<ScoredCandidate> {
        score_with(&[], group, &ScoringWeights::default())
    }

    fn tie_break(&self, a: &Record, b: &Record) -> Ordering {
        position_then_created(a, b)
    }
}

/// Policy selector for CLI and config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    RecencyAndQuality,
    PositionThenRecency,
}

impl PolicyKind {
    /// Default for `reconcile`
    pub const DELETING_DEFAULT: PolicyKind = PolicyKind::PositionThenRecency;
    /// Default for `analyze` and monitor alerts
    pub const REPORT_DEFAULT: PolicyKind = PolicyKind::RecencyAndQuality;

    pub fn build(self, weights: &ScoringWeights) -> Box<dyn ScoringPolicy> {
        match self {
            PolicyKind::RecencyAndQuality => Box::new(RecencyAndQuality::new(weights.clone())),
            PolicyKind::PositionThenRecency => Box::new(PositionThenRecency),
        }
    }
}
