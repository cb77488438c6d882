//! Invariant Enforcer
//!
//! Gates a structural uniqueness constraint on the identity key behind a
//! clean scan. The constraint and companion index DDL are written as
//! artifacts; executing them is a separate, operator-requested step
//! (`--apply`). With `--force` the gate is skipped and any rejection from
//! the store is reported verbatim.

use crate::artifacts::{ArtifactDir, RunLog};
use crate::error::{ReconcileError, ReconcileResult};
use crate::grouper::{analyze, ScanStats};
use crate::model::KeyMode;
use crate::store::{ConstraintStatus, RecordStore};
use lexr_common::db::WORD_OCCURRENCES_TABLE;
use serde::Serialize;
use std::path::PathBuf;

/// DDL proposed for the identity key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstraintProposal {
    pub constraint_name: String,
    pub constraint_sql: String,
    /// Non-unique indexes on the full key and on each key column
    pub index_sql: Vec<String>,
}

impl ConstraintProposal {
    pub fn new(constraint_name: &str, key_mode: KeyMode) -> Self {
        let columns = key_mode.columns();
        let constraint_sql = format!(
            "CREATE UNIQUE INDEX {} ON {} ({});",
            constraint_name,
            WORD_OCCURRENCES_TABLE,
            columns.iter().map(|col| unique_key_expr(col)).collect::<Vec<_>>().join(", ")
        );

        let mut index_sql = vec![format!(
            "CREATE INDEX IF NOT EXISTS idx_{}_identity ON {} ({});",
            WORD_OCCURRENCES_TABLE,
            WORD_OCCURRENCES_TABLE,
            columns.join(", ")
        )];
        index_sql.extend(columns.iter().map(|col| {
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {} ({});",
                WORD_OCCURRENCES_TABLE, col, WORD_OCCURRENCES_TABLE, col
            )
        }));

        Self {
            constraint_name: constraint_name.to_string(),
            constraint_sql,
            index_sql,
        }
    }

    fn constraint_artifact(&self, stats: &ScanStats) -> String {
        format!(
            "-- Uniqueness constraint for the word-occurrence identity key.\n\
             -- Pre-flight scan: {} records, {} duplicate groups.\n\
             -- Not applied automatically; run `lexr-dedup enforce --apply` or apply by hand.\n\
             {}\n",
            stats.total_records, stats.duplicate_groups, self.constraint_sql
        )
    }

    fn index_artifact(&self) -> String {
        let mut text = String::from("-- Companion indexes that keep duplicate scans cheap.\n");
        for sql in &self.index_sql {
            text.push_str(sql);
            text.push('\n');
        }
        text
    }
}

/// SQLite treats NULLs in a unique index as distinct, while the identity key
/// treats two absent positions as equal. Text `''` never equals an integer.
fn unique_key_expr(column: &str) -> String {
    match column {
        "position" => "IFNULL(position, '')".to_string(),
        other => other.to_string(),
    }
}

/// Pre-flight gate decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Preflight {
    /// No duplicates; no force needed
    Safe,
    /// Duplicates exist and `--force` was not given
    Refused { duplicate_groups: usize, duplicate_records: usize },
    /// Duplicates exist but `--force` overrides the gate
    Forced { duplicate_groups: usize, duplicate_records: usize },
}

/// Decide whether a constraint may be proposed for this scan
pub fn preflight(stats: &ScanStats, force: bool) -> Preflight {
    if stats.is_clean() {
        return Preflight::Safe;
    }
    let (duplicate_groups, duplicate_records) = (stats.duplicate_groups, stats.total_duplicate_records);
    if force {
        Preflight::Forced {
            duplicate_groups,
            duplicate_records,
        }
    } else {
        Preflight::Refused {
            duplicate_groups,
            duplicate_records,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnforceOptions {
    pub constraint_name: String,
    pub key_mode: KeyMode,
    pub force: bool,
    pub apply: bool,
}

/// What the enforcer did
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnforceOutcome {
    pub existing: ConstraintStatus,
    pub stats: ScanStats,
    pub preflight: Preflight,
    pub proposal: ConstraintProposal,
    pub constraint_path: Option<PathBuf>,
    pub index_path: Option<PathBuf>,
    /// `None` when `--apply` was not requested; `Some(Err(text))` carries the
    /// store's error message unmodified
    pub applied: Option<Result<(), String>>,
}

impl EnforceOutcome {
    pub fn exit_code(&self) -> u8 {
        match &self.applied {
            Some(Err(_)) => 1,
            _ => 0,
        }
    }
}

/// Check for an existing constraint, run the pre-flight scan, emit DDL
/// artifacts and, when asked, apply them
pub async fn enforce<S: RecordStore + ?Sized>(
    store: &S,
    options: &EnforceOptions,
    artifacts: &ArtifactDir,
    run: &str,
    log: &mut RunLog,
) -> ReconcileResult<EnforceOutcome> {
    let proposal = ConstraintProposal::new(&options.constraint_name, options.key_mode);

    let existing = store.introspect_constraint(&options.constraint_name).await;
    match existing {
        ConstraintStatus::Present => log.info(format!(
            "Constraint {} already exists in the store",
            options.constraint_name
        )),
        ConstraintStatus::Absent => log.info(format!("Constraint {} not present", options.constraint_name)),
        ConstraintStatus::Unknown => log.warn(format!(
            "Could not determine whether constraint {} exists; continuing",
            options.constraint_name
        )),
    }

    let grouping = analyze(store, None, options.key_mode, "preflight").await?;
    let stats = grouping.stats();
    let gate = preflight(&stats, options.force);

    let mut outcome = EnforceOutcome {
        existing,
        stats,
        preflight: gate,
        proposal,
        constraint_path: None,
        index_path: None,
        applied: None,
    };

    match gate {
        Preflight::Safe => log.success("Pre-flight: no duplicate groups, safe to add constraint"),
        Preflight::Refused {
            duplicate_groups,
            duplicate_records,
        } => {
            let err = ReconcileError::ConstraintPreflightFailure {
                duplicate_groups,
                duplicate_records,
            };
            log.error(err.to_string());
            for group in grouping.largest(5) {
                log.error(format!("  {} has {} records", group.key, group.len()));
            }
            return Err(err);
        }
        Preflight::Forced {
            duplicate_groups, ..
        } => log.warn(format!(
            "Pre-flight: {} duplicate groups exist; --force given, the store will likely reject the constraint",
            duplicate_groups
        )),
    }

    if existing == ConstraintStatus::Present {
        log.info("Nothing to propose; constraint already enforced");
        return Ok(outcome);
    }

    let constraint_path =
        artifacts.write_text(&format!("constraint-{}.sql", run), &outcome.proposal.constraint_artifact(&stats))?;
    let index_path = artifacts.write_text(&format!("indexes-{}.sql", run), &outcome.proposal.index_artifact())?;
    log.info(format!(
        "Wrote {} and {}",
        constraint_path.display(),
        index_path.display()
    ));
    outcome.constraint_path = Some(constraint_path);
    outcome.index_path = Some(index_path);

    if options.apply {
        outcome.applied = Some(apply(store, &outcome.proposal, log).await);
    }

    Ok(outcome)
}

async fn apply<S: RecordStore + ?Sized>(
    store: &S,
    proposal: &ConstraintProposal,
    log: &mut RunLog,
) -> Result<(), String> {
    for sql in std::iter::once(&proposal.constraint_sql).chain(proposal.index_sql.iter()) {
        if let Err(e) = store.apply_ddl(sql).await {
            let message = e.to_string();
            log.error(format!("Store rejected `{}`: {}", sql, message));
            return Err(message);
        }
        log.info(format!("Applied `{}`", sql));
    }
    log.success(format!("Constraint {} installed", proposal.constraint_name));
    Ok(())
}
