//! Continuous Monitor
//!
//! Re-scans on demand or on an interval, appends a snapshot to a bounded
//! history log, and raises an alert listing the largest duplicate groups
//! whenever the store is not clean. In CI mode the first alert ends the run
//! with a non-zero exit code.

use crate::artifacts::{write_json, RunLog};
use crate::error::{ReconcileError, ReconcileResult};
use crate::grouper::{analyze, Grouping, ScanStats};
use crate::model::KeyMode;
use crate::scoring::ScoringPolicy;
use crate::selector::select_survivor;
use crate::store::RecordStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One monitor check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalSnapshot {
    pub timestamp: DateTime<Utc>,
    pub total_records: usize,
    pub unique_combinations: usize,
    pub duplicate_groups: usize,
    pub total_duplicate_records: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_groups: Option<Vec<SampleGroup>>,
}

impl HistoricalSnapshot {
    pub fn stats(&self) -> ScanStats {
        ScanStats {
            total_records: self.total_records,
            unique_combinations: self.unique_combinations,
            duplicate_groups: self.duplicate_groups,
            total_duplicate_records: self.total_duplicate_records,
        }
    }
}

/// Duplicate group listed for triage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleGroup {
    pub key: String,
    pub size: usize,
    pub ids: Vec<String>,
    /// Keeper the report policy would choose
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_keep: Option<String>,
}

/// `history.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    pub checks: Vec<HistoricalSnapshot>,
    pub first_check: Option<DateTime<Utc>>,
    pub last_check: Option<DateTime<Utc>>,
    /// All checks ever recorded, including trimmed ones
    pub total_checks: u64,
    /// Checks that found at least one duplicate group
    pub duplicates_detected: u64,
}

impl History {
    /// Load history; a missing file is an empty history
    pub fn load(path: &Path) -> ReconcileResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| ReconcileError::artifact(path, e))?;
        serde_json::from_str(&content).map_err(|e| ReconcileError::artifact(path, e))
    }

    pub fn save(&self, path: &Path) -> ReconcileResult<()> {
        write_json(path, self)
    }

    /// Append a snapshot, trimming the oldest beyond `retention`
    pub fn record(&mut self, snapshot: HistoricalSnapshot, retention: usize) {
        self.first_check.get_or_insert(snapshot.timestamp);
        self.last_check = Some(snapshot.timestamp);
        self.total_checks += 1;
        if snapshot.duplicate_groups > 0 {
            self.duplicates_detected += 1;
        }
        self.checks.push(snapshot);

        if self.checks.len() > retention {
            let excess = self.checks.len() - retention;
            self.checks.drain(..excess);
        }
    }
}

/// Duplicate alert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub duplicate_groups: usize,
    pub total_duplicate_records: usize,
    pub top_groups: Vec<SampleGroup>,
}

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub key_mode: KeyMode,
    pub retention: usize,
    pub top_n: usize,
    /// Log the alert's group listing
    pub alert: bool,
    /// Stop at the first alert with a non-zero exit code
    pub ci: bool,
}

/// Result of one check
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub snapshot: HistoricalSnapshot,
    pub alert: Option<Alert>,
}

/// How a watch loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExit {
    /// Interrupted; history flushed
    Cancelled { checks: u64 },
    /// CI mode saw duplicates
    Alerted { checks: u64 },
}

impl WatchExit {
    pub fn exit_code(&self) -> u8 {
        match self {
            WatchExit::Cancelled { .. } => 0,
            WatchExit::Alerted { .. } => 1,
        }
    }
}

pub struct Monitor<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    policy: &'a dyn ScoringPolicy,
    options: MonitorOptions,
    history_path: PathBuf,
    history: History,
}

impl<'a, S: RecordStore + ?Sized> Monitor<'a, S> {
    /// Open the monitor, loading existing history from `history_path`
    pub fn open(
        store: &'a S,
        policy: &'a dyn ScoringPolicy,
        options: MonitorOptions,
        history_path: PathBuf,
    ) -> ReconcileResult<Self> {
        let history = History::load(&history_path)?;
        Ok(Self {
            store,
            policy,
            options,
            history_path,
            history,
        })
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Persist the in-memory history
    pub fn flush(&self) -> ReconcileResult<()> {
        self.history.save(&self.history_path)
    }

    /// Scan once, record the snapshot, persist history
    pub async fn check(&mut self, log: &mut RunLog) -> ReconcileResult<CheckOutcome> {
        let grouping = analyze(self.store, None, self.options.key_mode, "monitor").await?;
        let stats = grouping.stats();
        let top_groups = if stats.is_clean() {
            Vec::new()
        } else {
            self.top_groups(&grouping)
        };

        let snapshot = HistoricalSnapshot {
            timestamp: Utc::now(),
            total_records: stats.total_records,
            unique_combinations: stats.unique_combinations,
            duplicate_groups: stats.duplicate_groups,
            total_duplicate_records: stats.total_duplicate_records,
            sample_groups: (!top_groups.is_empty()).then(|| top_groups.clone()),
        };

        self.history.record(snapshot.clone(), self.options.retention);
        self.flush()?;

        let alert = if stats.is_clean() {
            log.success(format!(
                "Check passed: {} records, {} unique combinations, no duplicates",
                stats.total_records, stats.unique_combinations
            ));
            None
        } else {
            let alert = Alert {
                duplicate_groups: stats.duplicate_groups,
                total_duplicate_records: stats.total_duplicate_records,
                top_groups,
            };
            self.raise(&alert, log);
            Some(alert)
        };

        Ok(CheckOutcome { snapshot, alert })
    }

    /// Re-check every `interval` until `shutdown` resolves or CI mode alerts
    ///
    /// A failed scan is logged and retried on the next tick. History is
    /// flushed before returning.
    pub async fn watch<F>(&mut self, interval: Duration, shutdown: F, log: &mut RunLog) -> ReconcileResult<WatchExit>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut checks = 0;
        log.info(format!("Watching every {}s", interval.as_secs()));

        loop {
            let check = tokio::select! {
                result = self.check(log) => result,
                _ = &mut shutdown => break,
            };
            checks += 1;

            match check {
                Ok(outcome) if outcome.alert.is_some() && self.options.ci => {
                    log.error("CI mode: duplicates detected, stopping");
                    self.flush()?;
                    return Ok(WatchExit::Alerted { checks });
                }
                Ok(_) => {}
                Err(e) => log.error(format!("Check failed, will retry next interval: {}", e)),
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = &mut shutdown => break,
            }
        }

        log.info("Interrupted; flushing history");
        self.flush()?;
        Ok(WatchExit::Cancelled { checks })
    }

    fn top_groups(&self, grouping: &Grouping) -> Vec<SampleGroup> {
        grouping
            .largest(self.options.top_n)
            .into_iter()
            .map(|group| {
                let scored = self.policy.score(&group.records);
                SampleGroup {
                    key: group.key.to_string(),
                    size: group.len(),
                    ids: group.records.iter().map(|r| r.id.clone()).collect(),
                    suggested_keep: select_survivor(&scored, self.policy).map(|s| s.keep_id),
                }
            })
            .collect()
    }

    fn raise(&self, alert: &Alert, log: &mut RunLog) {
        log.error(format!(
            "ALERT: {} duplicate groups ({} extra records)",
            alert.duplicate_groups, alert.total_duplicate_records
        ));
        if !self.options.alert {
            return;
        }
        for group in &alert.top_groups {
            log.error(format!(
                "  {} x{} keep={} ids=[{}]",
                group.key,
                group.size,
                group.suggested_keep.as_deref().unwrap_or("?"),
                group.ids.join(", ")
            ));
        }
    }
}

/// Read-only history view; performs no scan
pub fn history_report(history: &History) -> String {
    let fmt_ts = |ts: Option<DateTime<Utc>>| ts.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".to_string());
    let mut text = format!(
        "firstCheck:         {}\nlastCheck:          {}\ntotalChecks:        {}\nduplicatesDetected: {}\nretained:           {}\n",
        fmt_ts(history.first_check),
        fmt_ts(history.last_check),
        history.total_checks,
        history.duplicates_detected,
        history.checks.len()
    );
    if let Some(last) = history.checks.last() {
        text.push_str(&format!(
            "latest:             {} records, {} duplicate groups, {} duplicate records\n",
            last.total_records, last.duplicate_groups, last.total_duplicate_records
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn snapshot(minute: u32, duplicate_groups: usize) -> HistoricalSnapshot {
        HistoricalSnapshot {
            timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, minute, 0).unwrap(),
            total_records: 10,
            unique_combinations: 10 - duplicate_groups,
            duplicate_groups,
            total_duplicate_records: duplicate_groups,
            sample_groups: None,
        }
    }

    #[test]
    fn test_history_trims_oldest_but_keeps_totals() {
        let mut history = History::default();
        for minute in 0..5 {
            history.record(snapshot(minute, (minute % 2) as usize), 3);
        }

        assert_eq!(history.checks.len(), 3);
        assert_eq!(history.checks[0].timestamp, snapshot(2, 0).timestamp);
        assert_eq!(history.total_checks, 5);
        assert_eq!(history.duplicates_detected, 2);
        assert_eq!(history.first_check, Some(snapshot(0, 0).timestamp));
        assert_eq!(history.last_check, Some(snapshot(4, 0).timestamp));
    }

    #[test]
    fn test_history_json_shape() {
        let mut history = History::default();
        history.record(snapshot(0, 0), 10);
        let json = serde_json::to_value(&history).unwrap();
        for field in ["checks", "firstCheck", "lastCheck", "totalChecks", "duplicatesDetected"] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
        assert!(json["checks"][0].get("uniqueCombinations").is_some());
        assert!(json["checks"][0].get("sampleGroups").is_none());
    }

    #[test]
    fn test_history_load_missing_is_empty() {
        let temp = tempfile::tempdir().unwrap();
        let history = History::load(&temp.path().join("history.json")).unwrap();
        assert_eq!(history, History::default());
    }

    #[test]
    fn test_history_report_without_checks() {
        let text = history_report(&History::default());
        assert!(text.contains("firstCheck:         never"));
        assert!(text.contains("totalChecks:        0"));
    }
}
