//! Record Store Gateway
//!
//! The store owns the authoritative copy of every record. Everything the
//! engine holds is a projection taken at fetch time.
//!
//! Snapshots are returned unordered. Callers must not rely on any ordering
//! from the store: the grouper and selector do all ordering in memory after
//! a complete fetch.

use crate::model::Record;
use async_trait::async_trait;
use lexr_common::Result;

mod memory;
mod sqlite;

pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;

/// Optional narrowing of a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub verse_id: Option<String>,
    pub word: Option<String>,
}

impl RecordFilter {
    pub fn is_empty(&self) -> bool {
        self.verse_id.is_none() && self.word.is_none()
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.verse_id.as_deref().map_or(true, |v| v == record.verse_id)
            && self.word.as_deref().map_or(true, |w| w == record.word)
    }
}

/// Result of asking the store whether a named constraint exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintStatus {
    Present,
    Absent,
    /// Introspection unavailable or failed
    Unknown,
}

/// Query/mutate interface to the record store
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Complete, unordered snapshot of matching records
    async fn fetch_all(&self, filter: Option<&RecordFilter>) -> Result<Vec<Record>>;

    /// Delete the given ids; all-or-nothing per call. Returns rows removed.
    async fn delete_by_ids(&self, ids: &[String]) -> Result<u64>;

    /// Best-effort check for a named constraint; never fails
    async fn introspect_constraint(&self, name: &str) -> ConstraintStatus;

    /// Re-insert records (restore). Existing ids are skipped. Returns rows inserted.
    async fn insert_records(&self, records: &[Record]) -> Result<u64>;

    /// Execute an operator-approved DDL statement
    async fn apply_ddl(&self, sql: &str) -> Result<()>;
}
