//! Database initialization
//!
//! Opens (or creates) the SQLite database and makes sure the tables the
//! dataset tools rely on exist. Every statement is idempotent so tools can
//! call `init_database` on every start.
//!
//! The `word_occurrences` table intentionally carries no uniqueness
//! constraint on `(word, verse_id)`. That invariant is established by the
//! reconciliation engine and only enforced structurally after an operator
//! applies the generated constraint DDL.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Current schema version written to `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Name of the record table the engine operates on
pub const WORD_OCCURRENCES_TABLE: &str = "word_occurrences";

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL allows the monitor to read while a reconcile run deletes
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create every table used by the dataset tools (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_word_occurrences_table(pool).await?;
    Ok(())
}

/// Create schema_version table and record the current version
pub async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

/// Create word_occurrences table
///
/// `svg` holds the generated visual asset for the word, if any.
/// `created_at` is RFC 3339 text.
pub async fn create_word_occurrences_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS word_occurrences (
            id TEXT PRIMARY KEY,
            word TEXT NOT NULL,
            verse_id TEXT NOT NULL,
            position INTEGER,
            svg TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
