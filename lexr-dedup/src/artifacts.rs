//! Persisted run artifacts
//!
//! Layout under the artifacts directory:
//! - `backup-<run>.json`: JSON array of ids slated for deletion
//! - `backup-<run>.records.json`: the full rows behind those ids (restore input)
//! - `<command>-<run>.log`: level-tagged run log
//! - `history.json`: monitor history
//! - `constraint-<run>.sql`, `indexes-<run>.sql`: DDL proposals
//!
//! `<run>` is a compact UTC stamp with milliseconds, so artifacts sort
//! chronologically. Backups are never overwritten.

use crate::error::{ReconcileError, ReconcileResult};
use crate::model::Record;
use crate::plan::ReconciliationPlan;
use chrono::{DateTime, Utc};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const HISTORY_FILE_NAME: &str = "history.json";

/// Directory holding every artifact
#[derive(Debug, Clone)]
pub struct ArtifactDir {
    root: PathBuf,
}

/// Paths of one run's backup pair
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BackupPaths {
    pub ids: PathBuf,
    pub records: PathBuf,
}

impl ArtifactDir {
    /// Open (creating if needed) an artifacts directory
    pub fn open(root: impl Into<PathBuf>) -> ReconcileResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| ReconcileError::artifact(&root, e))?;
        Ok(Self { root })
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    pub fn history_path(&self) -> PathBuf {
        self.path(HISTORY_FILE_NAME)
    }

    /// Write the id backup and the records backup for `plan`
    ///
    /// Called before any mutation, dry runs included. Fails if a backup for
    /// `run` already exists.
    pub fn write_backup(&self, run: &str, plan: &ReconciliationPlan) -> ReconcileResult<BackupPaths> {
        let paths = BackupPaths {
            ids: self.path(&format!("backup-{}.json", run)),
            records: self.path(&format!("backup-{}.records.json", run)),
        };

        write_json_new(&paths.ids, &plan.delete_ids())?;
        write_json_new(&paths.records, &plan.delete_records())?;

        info!(
            ids = %paths.ids.display(),
            count = plan.total_deletes(),
            "Backup written"
        );
        Ok(paths)
    }

    pub fn write_text(&self, file_name: &str, contents: &str) -> ReconcileResult<PathBuf> {
        let path = self.path(file_name);
        std::fs::write(&path, contents).map_err(|e| ReconcileError::artifact(&path, e))?;
        Ok(path)
    }
}

/// Read a `backup-<run>.records.json` file
pub fn read_records_backup(path: &Path) -> ReconcileResult<Vec<Record>> {
    let content = std::fs::read_to_string(path).map_err(|e| ReconcileError::artifact(path, e))?;
    serde_json::from_str(&content).map_err(|e| ReconcileError::artifact(path, e))
}

/// Write pretty JSON via a temp file and rename, so readers never see a torn file
pub fn write_json<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> ReconcileResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| ReconcileError::artifact(path, e))?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json).map_err(|e| ReconcileError::artifact(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| ReconcileError::artifact(path, e))?;
    Ok(())
}

/// Write pretty JSON to a file that must not exist yet
fn write_json_new<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> ReconcileResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| ReconcileError::artifact(path, e))?;
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| ReconcileError::artifact(path, e))?;
    file.write_all(json.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(|e| ReconcileError::artifact(path, e))
}

/// Run log line level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Success,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Success => "SUCCESS",
        };
        f.write_str(tag)
    }
}

/// Append-only, one-file-per-run text log
///
/// Every line is mirrored to `tracing`. A failed write to the file is
/// reported through `tracing` and never aborts the run.
pub struct RunLog {
    path: Option<PathBuf>,
    writer: Option<LineWriter<File>>,
}

impl RunLog {
    /// Create `<command>-<run>.log` in `dir`
    pub fn create(dir: &ArtifactDir, command: &str, run: &str) -> ReconcileResult<Self> {
        let path = dir.path(&format!("{}-{}.log", command, run));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ReconcileError::artifact(&path, e))?;
        Ok(Self {
            path: Some(path),
            writer: Some(LineWriter::new(file)),
        })
    }

    /// Log that only goes to `tracing`
    pub fn tracing_only() -> Self {
        Self {
            path: None,
            writer: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn info(&mut self, message: impl AsRef<str>) {
        self.write(LogLevel::Info, message.as_ref());
    }

    pub fn warn(&mut self, message: impl AsRef<str>) {
        self.write(LogLevel::Warn, message.as_ref());
    }

    pub fn error(&mut self, message: impl AsRef<str>) {
        self.write(LogLevel::Error, message.as_ref());
    }

    pub fn success(&mut self, message: impl AsRef<str>) {
        self.write(LogLevel::Success, message.as_ref());
    }

    fn write(&mut self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Info | LogLevel::Success => info!("{}", message),
            LogLevel::Warn => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }

        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writeln!(writer, "{}", format_line(Utc::now(), level, message)) {
                warn!(error = %e, "Run log write failed; further lines go to tracing only");
                self.writer = None;
            }
        }
    }
}

fn format_line(at: DateTime<Utc>, level: LogLevel, message: &str) -> String {
    format!("[{}] {} {}", at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true), level, message)
}
