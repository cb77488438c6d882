//! TOML loading tests, including the warnings emitted while loading

use lexr_common::config::{load_toml, LoggingConfig};
use lexr_common::Error;
use serde::Deserialize;
use std::io::Write;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ToolConfig {
    logging: LoggingConfig,
    batch_size: Option<usize>,
}

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

#[test]
fn test_missing_file_warning_reaches_scoped_subscriber() {
    let temp = tempfile::tempdir().unwrap();
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let config: ToolConfig = tracing::subscriber::with_default(subscriber, || {
        load_toml(Some(temp.path().join("absent.toml").as_path()))
    })
    .unwrap();

    assert_eq!(config.logging.level, "info");
    assert!(captured.text().contains("Config file not found"), "got: {}", captured.text());
}

#[test]
fn test_file_values_override_defaults() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("tool.toml");
    std::fs::write(&path, "batch_size = 25\n\n[logging]\nlevel = \"debug\"\n").unwrap();

    let config: ToolConfig = load_toml(Some(path.as_path())).unwrap();
    assert_eq!(config.batch_size, Some(25));
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_malformed_file_is_config_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("tool.toml");
    std::fs::write(&path, "batch_size = [").unwrap();

    let err = load_toml::<ToolConfig>(Some(path.as_path())).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
