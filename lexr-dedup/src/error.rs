//! Error types for lexr-dedup
//!
//! Each variant is recovered at a phase boundary and surfaced in the run
//! summary; none of them corrupts a plan that is already built.

use lexr_common::Error as CommonError;
use thiserror::Error;

/// Reconciliation engine error
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Store unreachable or query failed while taking a snapshot.
    /// Nothing has been mutated when this is raised.
    #[error("Fetch failed during {phase}: {source}")]
    FetchFailure {
        phase: &'static str,
        #[source]
        source: CommonError,
    },

    /// One delete batch failed after its retries; later batches still run
    #[error("Delete batch {batch} ({size} ids) failed: {source}")]
    BatchDeleteFailure {
        batch: usize,
        size: usize,
        #[source]
        source: CommonError,
    },

    /// Post-delete scan still found duplicates
    #[error(
        "Verification found {duplicate_groups} duplicate groups ({duplicate_records} extra records) after deletion; re-run reconcile"
    )]
    VerificationMismatch {
        duplicate_groups: usize,
        duplicate_records: usize,
    },

    /// Duplicates exist, so the uniqueness constraint would be rejected
    #[error(
        "Refusing to propose uniqueness constraint: {duplicate_groups} duplicate groups ({duplicate_records} extra records) exist. Run reconcile first, or pass --force (the store will likely reject the constraint and that error is shown verbatim)"
    )]
    ConstraintPreflightFailure {
        duplicate_groups: usize,
        duplicate_records: usize,
    },

    /// Re-inserting backed-up rows failed
    #[error("Restore failed: {source}")]
    RestoreFailure {
        #[source]
        source: CommonError,
    },

    /// Backup, log, history, or DDL artifact could not be read or written
    #[error("Artifact error ({path}): {source}")]
    Artifact {
        path: String,
        #[source]
        source: CommonError,
    },
}

/// Result type for engine operations
pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;

impl ReconcileError {
    pub fn fetch(phase: &'static str, source: CommonError) -> Self {
        ReconcileError::FetchFailure { phase, source }
    }

    pub fn artifact(path: impl AsRef<std::path::Path>, source: impl Into<CommonError>) -> Self {
        ReconcileError::Artifact {
            path: path.as_ref().display().to_string(),
            source: source.into(),
        }
    }
}
