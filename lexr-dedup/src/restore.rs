//! Rollback from a records backup
//!
//! Re-inserts the rows saved in `backup-<run>.records.json`. Ids still
//! present in the store are left untouched.

use crate::artifacts::{read_records_backup, RunLog};
use crate::error::{ReconcileError, ReconcileResult};
use crate::store::RecordStore;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreOutcome {
    pub in_backup: usize,
    pub inserted: u64,
    pub skipped: u64,
}

pub async fn restore<S: RecordStore + ?Sized>(
    store: &S,
    backup: &Path,
    log: &mut RunLog,
) -> ReconcileResult<RestoreOutcome> {
    let records = read_records_backup(backup)?;
    log.info(format!("Restoring {} records from {}", records.len(), backup.display()));

    let inserted = store
        .insert_records(&records)
        .await
        .map_err(|source| ReconcileError::RestoreFailure { source })?;

    let outcome = RestoreOutcome {
        in_backup: records.len(),
        inserted,
        skipped: records.len() as u64 - inserted,
    };
    log.success(format!(
        "Restore complete: {} inserted, {} already present",
        outcome.inserted, outcome.skipped
    ));
    Ok(outcome)
}
