//! Configuration loading and root folder resolution
//!
//! Resolution priority for every bootstrap value:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing TOML file is not an error: tools log a warning and start with
//! compiled defaults. A TOML file that exists but fails to parse is an error.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "LEXR_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "lexr.db";

/// Logging configuration shared by every lexr tool
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Default per-tool config file path: `<config dir>/lexr/<tool>.toml`
pub fn default_config_path(tool_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lexr").join(format!("{}.toml", tool_name)))
}

/// Load a TOML config file into `T`
///
/// `None` or a non-existent path yields `T::default()` with a warning.
pub fn load_toml<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        warn!("No config file location available, using compiled defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, using compiled defaults");
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let parsed = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!(path = %path.display(), "Loaded config file");
    Ok(parsed)
}

/// Root folder resolution following the priority order in the module docs
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>, toml_root: Option<PathBuf>) -> Self {
        Self { cli_arg, toml_root }
    }

    /// Resolve root folder; never fails, falls back to the compiled default
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            return path.clone();
        }

        default_root_folder()
    }
}

/// Creates the root folder layout on first use
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Create root folder if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    /// Path of the SQLite database inside the root folder
    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    // ~/.local/share/lexr, ~/Library/Application Support/lexr, %LOCALAPPDATA%\lexr
    dirs::data_local_dir()
        .map(|d| d.join("lexr"))
        .unwrap_or_else(|| PathBuf::from("./lexr_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct SampleConfig {
        batch_size: usize,
        logging: Option<String>,
    }

    #[test]
    fn test_load_toml_missing_file_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg: SampleConfig = load_toml(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(cfg, SampleConfig::default());
    }

    #[test]
    fn test_load_toml_parses_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool.toml");
        std::fs::write(&path, "batch_size = 25\n").unwrap();

        let cfg: SampleConfig = load_toml(Some(&path)).unwrap();
        assert_eq!(cfg.batch_size, 25);
        assert!(cfg.logging.is_none());
    }

    #[test]
    fn test_load_toml_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool.toml");
        std::fs::write(&path, "batch_size = = 25").unwrap();

        let result: Result<SampleConfig> = load_toml(Some(&path));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_initializer_database_path() {
        let init = RootFolderInitializer::new(PathBuf::from("/tmp/lexr-root"));
        assert_eq!(init.database_path(), PathBuf::from("/tmp/lexr-root/lexr.db"));
    }
}
