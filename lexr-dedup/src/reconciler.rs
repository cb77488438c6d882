//! Batch Reconciler
//!
//! State machine: `Analyze → Identify → Delete → Verify → Done`, with
//! `Failed` reachable from `Delete` (every batch failed) or `Verify`
//! (duplicates remain, or the verification scan itself failed).
//!
//! - `Analyze` short-circuits to `Done` when the store is already clean.
//! - `Identify` builds the plan once and writes the backup pair before any
//!   mutation, dry runs included.
//! - `Delete` issues batches one at a time with a pause between them. A
//!   failed batch is logged and counted; later batches still run.
//! - `Verify` re-scans the live store. Deletion is trusted only once the
//!   re-scan shows zero duplicate groups.
//!
//! The engine takes no locks. A concurrent writer in the same identity space
//! can reintroduce duplicates during a run; operators should run during a
//! maintenance window or re-run until `Verify` is stable.

use crate::artifacts::{ArtifactDir, BackupPaths, RunLog};
use crate::config::EngineConfig;
use crate::error::{ReconcileError, ReconcileResult};
use crate::grouper::{analyze, Grouping, ScanStats};
use crate::model::KeyMode;
use crate::plan::ReconciliationPlan;
use crate::retry::retry_transient;
use crate::scoring::ScoringPolicy;
use crate::store::{RecordFilter, RecordStore};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Reconciliation phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Analyze,
    Identify,
    Delete,
    Verify,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Analyze => "ANALYZE",
            Phase::Identify => "IDENTIFY",
            Phase::Delete => "DELETE",
            Phase::Verify => "VERIFY",
            Phase::Done => "DONE",
            Phase::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Per-run knobs, taken from [`EngineConfig`] plus CLI overrides
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub dry_run: bool,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub max_batch_retries: u32,
    pub key_mode: KeyMode,
    pub filter: Option<RecordFilter>,
}

impl ReconcileOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            dry_run: false,
            batch_size: config.batch_size,
            batch_delay: config.batch_delay(),
            max_batch_retries: config.max_batch_retries,
            key_mode: config.key_mode,
            filter: None,
        }
    }
}

/// Result of one delete batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// 1-based
    pub index: usize,
    pub size: usize,
    pub deleted: u64,
    pub attempts: u32,
    pub error: Option<String>,
}

/// Group still duplicated after deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResidualGroup {
    pub key: String,
    pub ids: Vec<String>,
}

/// Final verdict of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    AlreadyClean,
    DryRun { would_delete: usize },
    Converged,
    DeleteFailed { errors: usize },
    Residual { duplicate_groups: usize, duplicate_records: usize },
    VerificationUnavailable { reason: String },
}

/// Structured run summary
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub run: String,
    pub policy: &'static str,
    pub dry_run: bool,
    pub transitions: Vec<Phase>,
    pub before: ScanStats,
    pub after: Option<ScanStats>,
    pub planned_deletes: usize,
    pub records_deleted: u64,
    pub batches: Vec<BatchOutcome>,
    pub errors: usize,
    pub backup: Option<BackupPaths>,
    pub residual: Vec<ResidualGroup>,
    pub verdict: Verdict,
}

impl ReconcileSummary {
    pub fn final_phase(&self) -> Phase {
        self.transitions.last().copied().unwrap_or(Phase::Analyze)
    }

    /// Clean no-op, or verified convergence
    pub fn is_success(&self) -> bool {
        matches!(self.verdict, Verdict::AlreadyClean | Verdict::Converged)
    }

    /// 0 only for a verified clean store
    pub fn exit_code(&self) -> u8 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn batches_succeeded(&self) -> usize {
        self.batches.iter().filter(|b| b.error.is_none()).count()
    }

    /// The verification failure as an error, when there is one
    pub fn verification_error(&self) -> Option<ReconcileError> {
        match self.verdict {
            Verdict::Residual {
                duplicate_groups,
                duplicate_records,
            } => Some(ReconcileError::VerificationMismatch {
                duplicate_groups,
                duplicate_records,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path: Vec<String> = self.transitions.iter().map(Phase::to_string).collect();
        writeln!(f, "Reconcile run {} ({})", self.run, path.join(" → "))?;
        writeln!(f, "  policy:              {}", self.policy)?;
        writeln!(f, "  dry run:             {}", self.dry_run)?;
        writeln!(f, "  records scanned:     {}", self.before.total_records)?;
        writeln!(f, "  duplicate groups:    {}", self.before.duplicate_groups)?;
        writeln!(f, "  deletes planned:     {}", self.planned_deletes)?;
        writeln!(
            f,
            "  batches:             {} attempted, {} succeeded, {} failed",
            self.batches.len(),
            self.batches_succeeded(),
            self.errors
        )?;
        writeln!(f, "  records deleted:     {}", self.records_deleted)?;
        if let Some(backup) = &self.backup {
            writeln!(f, "  backup:              {}", backup.ids.display())?;
        }
        if let Some(after) = &self.after {
            writeln!(
                f,
                "  after:               {} records, {} duplicate groups",
                after.total_records, after.duplicate_groups
            )?;
        }
        for group in &self.residual {
            writeln!(f, "  residual {}: {}", group.key, group.ids.join(", "))?;
        }
        let verdict = match &self.verdict {
            Verdict::AlreadyClean => "SUCCESS: already clean, nothing to do".to_string(),
            Verdict::DryRun { would_delete } => {
                format!("DRY RUN: {} records would be deleted; store unchanged", would_delete)
            }
            Verdict::Converged => "SUCCESS: verified zero duplicate groups".to_string(),
            Verdict::DeleteFailed { errors } => {
                format!("FAILED: all {} delete batches failed; store unchanged by this run", errors)
            }
            Verdict::Residual {
                duplicate_groups,
                duplicate_records,
            } => format!(
                "FAILED: {} duplicate groups ({} extra records) remain; re-run reconcile",
                duplicate_groups, duplicate_records
            ),
            Verdict::VerificationUnavailable { reason } => {
                format!("FAILED: verification scan failed ({}); re-run to confirm", reason)
            }
        };
        write!(f, "  verdict:             {}", verdict)
    }
}

/// Drives one reconciliation run
pub struct Reconciler<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    policy: &'a dyn ScoringPolicy,
    artifacts: &'a ArtifactDir,
    options: ReconcileOptions,
    run: String,
}

impl<'a, S: RecordStore + ?Sized> Reconciler<'a, S> {
    pub fn new(
        store: &'a S,
        policy: &'a dyn ScoringPolicy,
        artifacts: &'a ArtifactDir,
        options: ReconcileOptions,
        run: impl Into<String>,
    ) -> Self {
        Self {
            store,
            policy,
            artifacts,
            options,
            run: run.into(),
        }
    }

    /// Run to a terminal phase
    ///
    /// Returns `Err` only when the initial scan or the backup write fails,
    /// i.e. before anything was mutated. Every later failure is reported in
    /// the summary.
    pub async fn run(&self, log: &mut RunLog) -> ReconcileResult<ReconcileSummary> {
        let opts = &self.options;
        log.info(format!(
            "Reconcile run {} started (policy={}, dry_run={}, batch_size={}, key_mode={:?})",
            self.run,
            self.policy.name(),
            opts.dry_run,
            opts.batch_size,
            opts.key_mode
        ));

        // ANALYZE
        let grouping = match analyze(self.store, opts.filter.as_ref(), opts.key_mode, "analyze").await {
            Ok(grouping) => grouping,
            Err(e) => {
                log.error(format!("ANALYZE failed, nothing was changed: {}", e));
                return Err(e);
            }
        };
        let before = grouping.stats();
        log.info(format!(
            "ANALYZE: {} records, {} unique combinations, {} duplicate groups, {} duplicate records",
            before.total_records,
            before.unique_combinations,
            before.duplicate_groups,
            before.total_duplicate_records
        ));

        let mut summary = ReconcileSummary {
            run: self.run.clone(),
            policy: self.policy.name(),
            dry_run: opts.dry_run,
            transitions: vec![Phase::Analyze],
            before,
            after: None,
            planned_deletes: 0,
            records_deleted: 0,
            batches: Vec::new(),
            errors: 0,
            backup: None,
            residual: Vec::new(),
            verdict: Verdict::AlreadyClean,
        };

        if before.is_clean() {
            summary.transitions.push(Phase::Done);
            log.success("Already clean: no duplicate groups");
            return Ok(summary);
        }

        // IDENTIFY
        summary.transitions.push(Phase::Identify);
        let plan = ReconciliationPlan::build(&grouping, self.policy);
        summary.planned_deletes = plan.total_deletes();

        let backup = match self.artifacts.write_backup(&self.run, &plan) {
            Ok(paths) => paths,
            Err(e) => {
                log.error(format!("IDENTIFY: backup could not be written, aborting before any delete: {}", e));
                return Err(e);
            }
        };
        log.info(format!(
            "IDENTIFY: {} groups, {} records to delete; backup at {}",
            plan.decisions().len(),
            plan.total_deletes(),
            backup.ids.display()
        ));
        summary.backup = Some(backup);

        if opts.dry_run {
            for decision in plan.decisions() {
                let ids: Vec<&str> = decision.delete_ids().collect();
                log.info(format!(
                    "DRY RUN {}: keep {}, delete {}",
                    decision.key,
                    decision.keep.id,
                    ids.join(", ")
                ));
            }
            summary.transitions.push(Phase::Done);
            summary.verdict = Verdict::DryRun {
                would_delete: plan.total_deletes(),
            };
            log.warn(format!(
                "Dry run: {} records would be deleted; store not modified",
                plan.total_deletes()
            ));
            return Ok(summary);
        }

        // DELETE
        summary.transitions.push(Phase::Delete);
        self.execute(&plan, &mut summary, log).await;

        if summary.records_deleted == 0 && summary.errors > 0 && summary.errors == summary.batches.len() {
            summary.transitions.push(Phase::Failed);
            summary.verdict = Verdict::DeleteFailed {
                errors: summary.errors,
            };
            log.error(format!("DELETE: all {} batches failed", summary.errors));
            return Ok(summary);
        }

        // VERIFY
        summary.transitions.push(Phase::Verify);
        match analyze(self.store, opts.filter.as_ref(), opts.key_mode, "verify").await {
            Ok(after) => self.conclude(after, &mut summary, log),
            Err(e) => {
                summary.transitions.push(Phase::Failed);
                summary.verdict = Verdict::VerificationUnavailable {
                    reason: e.to_string(),
                };
                log.error(format!("VERIFY: scan failed: {}", e));
            }
        }

        Ok(summary)
    }

    /// Issue the plan's deletes sequentially, one batch at a time
    async fn execute(&self, plan: &ReconciliationPlan, summary: &mut ReconcileSummary, log: &mut RunLog) {
        let ids = plan.delete_ids();
        let batch_count = ids.len().div_ceil(self.options.batch_size);

        for (i, batch) in ids.chunks(self.options.batch_size).enumerate() {
            let index = i + 1;
            if i > 0 && !self.options.batch_delay.is_zero() {
                tokio::time::sleep(self.options.batch_delay).await;
            }

            let (result, attempts) = retry_transient("delete batch", self.options.max_batch_retries, || {
                self.store.delete_by_ids(batch)
            })
            .await;

            let outcome = match result {
                Ok(deleted) => {
                    summary.records_deleted += deleted;
                    if deleted < batch.len() as u64 && attempts > 1 {
                        log.warn(format!(
                            "Batch {}/{}: {} of {} ids were already gone after a retry; a timed-out attempt may have committed, VERIFY will recount",
                            index,
                            batch_count,
                            batch.len() as u64 - deleted,
                            batch.len()
                        ));
                    } else if deleted < batch.len() as u64 {
                        log.warn(format!(
                            "Batch {}/{}: {} of {} ids were already gone",
                            index,
                            batch_count,
                            batch.len() as u64 - deleted,
                            batch.len()
                        ));
                    }
                    log.info(format!("Batch {}/{}: deleted {} records", index, batch_count, deleted));
                    BatchOutcome {
                        index,
                        size: batch.len(),
                        deleted,
                        attempts,
                        error: None,
                    }
                }
                Err(source) => {
                    let err = ReconcileError::BatchDeleteFailure {
                        batch: index,
                        size: batch.len(),
                        source,
                    };
                    summary.errors += 1;
                    log.error(format!("Batch {}/{}: {} (after {} attempts)", index, batch_count, err, attempts));
                    BatchOutcome {
                        index,
                        size: batch.len(),
                        deleted: 0,
                        attempts,
                        error: Some(err.to_string()),
                    }
                }
            };
            summary.batches.push(outcome);
        }

        log.info(format!(
            "DELETE: {} of {} records deleted, {} failed batches",
            summary.records_deleted, summary.planned_deletes, summary.errors
        ));
    }

    fn conclude(&self, after: Grouping, summary: &mut ReconcileSummary, log: &mut RunLog) {
        let stats = after.stats();
        summary.after = Some(stats);

        // A DELETE that timed out client-side can still commit, so its retry
        // reports fewer rows than actually went away
        let observed = (summary.before.total_records.saturating_sub(stats.total_records) as u64)
            .min(summary.planned_deletes as u64);
        if observed > summary.records_deleted {
            log.warn(format!(
                "VERIFY: {} records are gone but batches reported {}; counting {}",
                observed, summary.records_deleted, observed
            ));
            summary.records_deleted = observed;
        }

        if stats.is_clean() {
            summary.transitions.push(Phase::Done);
            summary.verdict = Verdict::Converged;
            log.success(format!(
                "VERIFY: zero duplicate groups ({} records deleted, {} failed batches)",
                summary.records_deleted, summary.errors
            ));
            return;
        }

        summary.residual = after
            .duplicates()
            .map(|g| ResidualGroup {
                key: g.key.to_string(),
                ids: g.records.iter().map(|r| r.id.clone()).collect(),
            })
            .collect();
        summary.transitions.push(Phase::Failed);
        summary.verdict = Verdict::Residual {
            duplicate_groups: stats.duplicate_groups,
            duplicate_records: stats.total_duplicate_records,
        };
        log.error(format!(
            "VERIFY: {} duplicate groups ({} extra records) remain; re-run reconcile",
            stats.duplicate_groups, stats.total_duplicate_records
        ));
        for group in &summary.residual {
            log.error(format!("  residual {}: {}", group.key, group.ids.join(", ")));
        }
    }
}
