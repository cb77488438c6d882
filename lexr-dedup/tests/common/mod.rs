//! Shared fixtures for lexr-dedup integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use lexr_common::{Error, Result};
use lexr_dedup::store::{MemoryRecordStore, SqliteRecordStore};
use lexr_dedup::{ConstraintStatus, Record, RecordFilter, RecordStore};
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

pub fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
}

/// In-memory SQLite with the production schema
pub async fn sqlite_store() -> SqliteRecordStore {
    sqlite_store_with_timeout(Duration::from_secs(5)).await
}

/// Single-connection in-memory SQLite; holding its connection stalls every call
pub async fn sqlite_store_with_timeout(timeout: Duration) -> SqliteRecordStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    lexr_common::db::create_schema(&pool).await.unwrap();
    SqliteRecordStore::new(pool, timeout)
}

/// Three groups of four records plus one singleton: nine deletes in total
pub fn twelve_duplicates() -> Vec<Record> {
    let mut records = Vec::new();
    for (g, word) in ["בראשית", "ברא", "אלהים"].iter().enumerate() {
        for n in 0..4u32 {
            records.push(
                Record::new(*word, "gen-1-1", at(n + 1))
                    .with_id(format!("g{}-r{}", g, n))
                    .with_position(g as i64),
            );
        }
    }
    records.push(Record::new("את", "gen-1-1", at(1)).with_id("single"));
    records
}

/// Wraps the memory store to inject delete failures
pub struct FlakyStore {
    pub inner: MemoryRecordStore,
    /// Any batch containing this id fails with a non-retryable error
    pub poison: Option<String>,
    /// Number of leading delete calls that time out
    transient: AtomicU32,
    /// Number of leading delete calls that delete, then report a timeout
    committed_then_timed_out: AtomicU32,
    /// Fetch calls from this one (1-based) onward time out
    fail_fetch_from: Option<u32>,
    pub delete_calls: AtomicU32,
    pub fetch_calls: AtomicU32,
}

impl FlakyStore {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            inner: MemoryRecordStore::new(records),
            poison: None,
            transient: AtomicU32::new(0),
            committed_then_timed_out: AtomicU32::new(0),
            fail_fetch_from: None,
            delete_calls: AtomicU32::new(0),
            fetch_calls: AtomicU32::new(0),
        }
    }

    pub fn committing_then_timing_out(self, calls: u32) -> Self {
        self.committed_then_timed_out.store(calls, Ordering::SeqCst);
        self
    }

    pub fn failing_fetch_from(mut self, call: u32) -> Self {
        self.fail_fetch_from = Some(call);
        self
    }

    pub fn poisoned(mut self, id: &str) -> Self {
        self.poison = Some(id.to_string());
        self
    }

    pub fn timing_out(self, calls: u32) -> Self {
        self.transient.store(calls, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn fetch_all(&self, filter: Option<&RecordFilter>) -> Result<Vec<Record>> {
        let call = self.fetch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_fetch_from.is_some_and(|from| call >= from) {
            return Err(Error::Timeout("fetch_all".to_string()));
        }
        self.inner.fetch_all(filter).await
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<u64> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .transient
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::Timeout("delete".to_string()));
        }
        if let Some(poison) = &self.poison {
            if ids.iter().any(|id| id == poison) {
                return Err(Error::InvalidInput(format!("rejected batch containing {}", poison)));
            }
        }
        if self
            .committed_then_timed_out
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            self.inner.delete_by_ids(ids).await?;
            return Err(Error::Timeout("delete".to_string()));
        }
        self.inner.delete_by_ids(ids).await
    }

    async fn introspect_constraint(&self, name: &str) -> ConstraintStatus {
        self.inner.introspect_constraint(name).await
    }

    async fn insert_records(&self, records: &[Record]) -> Result<u64> {
        self.inner.insert_records(records).await
    }

    async fn apply_ddl(&self, sql: &str) -> Result<()> {
        self.inner.apply_ddl(sql).await
    }
}
