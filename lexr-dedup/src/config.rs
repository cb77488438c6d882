//! Configuration for lexr-dedup
//!
//! Loaded from `lexr-dedup.toml` (see [`lexr_common::config`] for the
//! lookup order); every field has a compiled default so an absent file is
//! a valid configuration. CLI flags override individual fields afterwards.
//!
//! ```toml
//! root_folder = "/srv/lexr"
//!
//! [logging]
//! level = "debug"
//!
//! [engine]
//! batch_size = 50
//! reconcile_policy = "position_then_recency"
//!
//! [engine.weights]
//! recency = 10
//! ```

use crate::model::KeyMode;
use crate::scoring::{PolicyKind, ScoringWeights};
use lexr_common::config::LoggingConfig;
use lexr_common::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Name used for the TOML file and the default config path
pub const TOOL_NAME: &str = "lexr-dedup";

/// SQLite caps bound parameters per statement; one delete batch is one statement
pub const MAX_BATCH_SIZE: usize = 500;

/// Top-level TOML file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub root_folder: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub engine: EngineConfig,
}

/// Engine settings passed into each component at construction
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ids per delete call (default 100)
    pub batch_size: usize,
    /// Pause between delete batches (default 100 ms)
    pub batch_delay_ms: u64,
    /// Bound on every store call (default 10 s)
    pub store_timeout_ms: u64,
    /// Extra attempts for a batch that failed transiently (default 2)
    pub max_batch_retries: u32,
    pub key_mode: KeyMode,
    /// Name of the unique index that enforces the identity key
    pub constraint_name: String,
    /// Defaults to `<root>/reconcile`
    pub artifacts_dir: Option<PathBuf>,
    /// Snapshots kept in history.json (default 100)
    pub history_retention: usize,
    /// Groups listed in an alert (default 10)
    pub alert_top_n: usize,
    /// Monitor watch cadence (default 1 h)
    pub watch_interval_secs: u64,
    /// Policy for the deleting path
    pub reconcile_policy: PolicyKind,
    /// Policy for report-only paths
    pub report_policy: PolicyKind,
    pub weights: ScoringWeights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            batch_delay_ms: 100,
            store_timeout_ms: 10_000,
            max_batch_retries: 2,
            key_mode: KeyMode::WordVerse,
            constraint_name: "word_occurrences_identity_key".to_string(),
            artifacts_dir: None,
            history_retention: 100,
            alert_top_n: 10,
            watch_interval_secs: 3600,
            reconcile_policy: PolicyKind::DELETING_DEFAULT,
            report_policy: PolicyKind::REPORT_DEFAULT,
            weights: ScoringWeights::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(Error::Config(format!(
                "batch_size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.batch_size
            )));
        }
        if self.history_retention == 0 {
            return Err(Error::Config("history_retention must be at least 1".to_string()));
        }
        if self.watch_interval_secs == 0 {
            return Err(Error::Config("watch_interval_secs must be at least 1".to_string()));
        }
        if self.store_timeout_ms == 0 {
            return Err(Error::Config("store_timeout_ms must be at least 1".to_string()));
        }
        let valid_name = !self.constraint_name.is_empty()
            && self
                .constraint_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_name {
            return Err(Error::Config(format!(
                "constraint_name '{}' must be a non-empty SQL identifier",
                self.constraint_name
            )));
        }
        Ok(())
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs)
    }
}
