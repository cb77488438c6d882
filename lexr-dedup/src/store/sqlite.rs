//! SQLite-backed record store
//!
//! Every call is bounded by `timeout`. An elapsed timeout surfaces as
//! `Error::Timeout`, which the reconciler treats as a retryable per-batch
//! failure rather than a crash.

use super::{ConstraintStatus, RecordFilter, RecordStore};
use crate::model::Record;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use lexr_common::{Error, Result};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Snapshot query. No ORDER BY: row order is unspecified and all ordering
/// happens in memory after the fetch.
pub(crate) const FETCH_ALL_SQL: &str =
    "SELECT id, word, verse_id, position, svg, created_at FROM word_occurrences";

type RecordRow = (String, String, String, Option<i64>, Option<String>, String);

/// Record store over a `word_occurrences` table
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
    timeout: Duration,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "{} exceeded {} ms",
                operation,
                self.timeout.as_millis()
            ))),
        }
    }
}

fn parse_created_at(id: &str, raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    // SQLite CURRENT_TIMESTAMP format
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            Error::InvalidInput(format!("record {} has unparseable created_at '{}': {}", id, raw, e))
        })
}

fn row_to_record(row: RecordRow) -> Result<Record> {
    let (id, word, verse_id, position, svg, created_at) = row;
    let created_at = parse_created_at(&id, &created_at)?;
    Ok(Record {
        id,
        word,
        verse_id,
        position,
        svg,
        created_at,
    })
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn fetch_all(&self, filter: Option<&RecordFilter>) -> Result<Vec<Record>> {
        self.bounded("fetch_all", async {
            let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(FETCH_ALL_SQL);

            if let Some(filter) = filter.filter(|f| !f.is_empty()) {
                query.push(" WHERE 1 = 1");
                if let Some(verse_id) = &filter.verse_id {
                    query.push(" AND verse_id = ").push_bind(verse_id.clone());
                }
                if let Some(word) = &filter.word {
                    query.push(" AND word = ").push_bind(word.clone());
                }
            }

            let rows: Vec<RecordRow> = query.build_query_as().fetch_all(&self.pool).await?;
            debug!(rows = rows.len(), "Fetched word_occurrences snapshot");

            rows.into_iter().map(row_to_record).collect()
        })
        .await
    }

    async fn delete_by_ids(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        self.bounded("delete_by_ids", async {
            // One statement, so SQLite applies the batch all-or-nothing
            let mut query: QueryBuilder<Sqlite> =
                QueryBuilder::new("DELETE FROM word_occurrences WHERE id IN (");
            let mut separated = query.separated(", ");
            for id in ids {
                separated.push_bind(id.clone());
            }
            separated.push_unseparated(")");

            let result = query.build().execute(&self.pool).await?;
            Ok(result.rows_affected())
        })
        .await
    }

    async fn introspect_constraint(&self, name: &str) -> ConstraintStatus {
        let lookup = self.bounded("introspect_constraint", async {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?",
            )
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
            Ok(count)
        });

        match lookup.await {
            Ok(0) => ConstraintStatus::Absent,
            Ok(_) => ConstraintStatus::Present,
            Err(e) => {
                warn!(constraint = name, error = %e, "Constraint introspection unavailable");
                ConstraintStatus::Unknown
            }
        }
    }

    async fn insert_records(&self, records: &[Record]) -> Result<u64> {
        self.bounded("insert_records", async {
            let mut tx = self.pool.begin().await?;
            let mut inserted = 0;

            for record in records {
                let result = sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO word_occurrences (id, word, verse_id, position, svg, created_at)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&record.id)
                .bind(&record.word)
                .bind(&record.verse_id)
                .bind(record.position)
                .bind(&record.svg)
                .bind(record.created_at.to_rfc3339())
                .execute(&mut *tx)
                .await?;
                inserted += result.rows_affected();
            }

            tx.commit().await?;
            Ok(inserted)
        })
        .await
    }

    async fn apply_ddl(&self, sql: &str) -> Result<()> {
        self.bounded("apply_ddl", async {
            sqlx::raw_sql(sql).execute(&self.pool).await?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_store() -> SqliteRecordStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        lexr_common::db::create_schema(&pool).await.unwrap();
        SqliteRecordStore::new(pool, Duration::from_secs(5))
    }

    fn record(id: &str, word: &str, verse: &str) -> Record {
        Record::new(word, verse, Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap()).with_id(id)
    }

    #[test]
    fn test_fetch_query_has_no_ordering() {
        assert!(!FETCH_ALL_SQL.to_uppercase().contains("ORDER BY"));
    }

    #[test]
    fn test_parse_sqlite_current_timestamp() {
        let ts = parse_created_at("x", "2026-02-01 08:00:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap());
        assert!(parse_created_at("x", "yesterday").is_err());
    }

    #[tokio::test]
    async fn test_insert_fetch_delete() {
        let store = setup_store().await;
        let records = vec![
            record("a", "בראשית", "gen-1-1").with_position(1).with_svg("<svg viewBox='0 0 1 1'/>"),
            record("b", "בראשית", "gen-1-1"),
            record("c", "ברא", "gen-1-1"),
        ];
        assert_eq!(store.insert_records(&records).await.unwrap(), 3);

        let mut fetched = store.fetch_all(None).await.unwrap();
        fetched.sort_by(|x, y| x.id.cmp(&y.id));
        assert_eq!(fetched, records);

        let deleted = store
            .delete_by_ids(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.fetch_all(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_with_filter() {
        let store = setup_store().await;
        store
            .insert_records(&[
                record("a", "אור", "gen-1-3"),
                record("b", "אור", "gen-1-4"),
                record("c", "יהי", "gen-1-3"),
            ])
            .await
            .unwrap();

        let filter = RecordFilter {
            verse_id: Some("gen-1-3".to_string()),
            word: Some("אור".to_string()),
        };
        let found = store.fetch_all(Some(&filter)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "a");
    }

    #[tokio::test]
    async fn test_introspect_absent_then_present() {
        let store = setup_store().await;
        assert_eq!(
            store.introspect_constraint("word_occurrences_identity_key").await,
            ConstraintStatus::Absent
        );

        store
            .apply_ddl("CREATE UNIQUE INDEX word_occurrences_identity_key ON word_occurrences (word, verse_id)")
            .await
            .unwrap();
        assert_eq!(
            store.introspect_constraint("word_occurrences_identity_key").await,
            ConstraintStatus::Present
        );
    }

    #[tokio::test]
    async fn test_introspect_degrades_to_unknown_on_closed_pool() {
        let store = setup_store().await;
        store.pool().close().await;
        assert_eq!(
            store.introspect_constraint("anything").await,
            ConstraintStatus::Unknown
        );
    }

    #[tokio::test]
    async fn test_apply_ddl_surfaces_store_error() {
        let store = setup_store().await;
        store
            .insert_records(&[record("a", "אור", "gen-1-3"), record("b", "אור", "gen-1-3")])
            .await
            .unwrap();

        let err = store
            .apply_ddl("CREATE UNIQUE INDEX uq ON word_occurrences (word, verse_id)")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("UNIQUE constraint failed"));
    }

    #[tokio::test]
    async fn test_call_past_timeout_becomes_timeout_error() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        lexr_common::db::create_schema(&pool).await.unwrap();
        let store = SqliteRecordStore::new(pool, Duration::from_millis(50));

        // Hold the only connection so every store call waits on the pool
        let _held = store.pool().acquire().await.unwrap();

        let err = store.fetch_all(None).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)), "got: {:?}", err);
        assert!(err.is_retryable());

        let err = store.delete_by_ids(&["a".to_string()]).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert_eq!(store.introspect_constraint("uq").await, ConstraintStatus::Unknown);
    }
}
