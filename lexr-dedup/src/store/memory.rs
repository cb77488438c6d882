//! In-memory record store

use super::{ConstraintStatus, RecordFilter, RecordStore};
use crate::model::Record;
use async_trait::async_trait;
use lexr_common::{Error, Result};
use std::collections::HashSet;
use std::sync::Mutex;

/// Store backed by a `Vec`, preserving insertion order.
///
/// Has no catalog, so constraint introspection reports `Unknown` and DDL is
/// rejected.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<Record>>,
}

impl MemoryRecordStore {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Record>>> {
        self.records
            .lock()
            .map_err(|_| Error::Internal("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn fetch_all(&self, filter: Option<&RecordFilter>) -> Result<Vec<Record>> {
        let records = self.lock()?;
        Ok(records
            .iter()
            .filter(|r| filter.map_or(true, |f| f.matches(r)))
            .cloned()
            .collect())
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<u64> {
        let targets: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut records = self.lock()?;
        let before = records.len();
        records.retain(|r| !targets.contains(r.id.as_str()));
        Ok((before - records.len()) as u64)
    }

    async fn introspect_constraint(&self, _name: &str) -> ConstraintStatus {
        ConstraintStatus::Unknown
    }

    async fn insert_records(&self, new_records: &[Record]) -> Result<u64> {
        let mut records = self.lock()?;
        let mut existing: HashSet<String> = records.iter().map(|r| r.id.clone()).collect();
        let mut inserted = 0;
        for record in new_records {
            if existing.insert(record.id.clone()) {
                records.push(record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn apply_ddl(&self, _sql: &str) -> Result<()> {
        Err(Error::InvalidInput(
            "in-memory store cannot execute DDL".to_string(),
        ))
    }
}
