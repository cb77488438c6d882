//! Root folder resolution tests
//!
//! Tests that manipulate LEXR_ROOT_FOLDER are marked #[serial] so they do
//! not race each other on the process environment.

use lexr_common::config::{RootFolderInitializer, RootFolderResolver, ROOT_FOLDER_ENV};
use serial_test::serial;
use std::env;
use std::path::PathBuf;

#[test]
#[serial]
fn test_cli_argument_has_highest_priority() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/lexr-env");

    let resolver = RootFolderResolver::new(
        Some(PathBuf::from("/tmp/lexr-cli")),
        Some(PathBuf::from("/tmp/lexr-toml")),
    );
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/lexr-cli"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_env_var_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/lexr-env");

    let resolver = RootFolderResolver::new(None, Some(PathBuf::from("/tmp/lexr-toml")));
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/lexr-env"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_toml_used_without_cli_or_env() {
    env::remove_var(ROOT_FOLDER_ENV);

    let resolver = RootFolderResolver::new(None, Some(PathBuf::from("/tmp/lexr-toml")));
    assert_eq!(resolver.resolve(), PathBuf::from("/tmp/lexr-toml"));
}

#[test]
#[serial]
fn test_default_is_never_empty() {
    env::remove_var(ROOT_FOLDER_ENV);

    let resolver = RootFolderResolver::new(None, None);
    assert!(!resolver.resolve().as_os_str().is_empty());
}

#[test]
fn test_initializer_creates_missing_folder() {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().join("nested").join("lexr");

    let init = RootFolderInitializer::new(root.clone());
    init.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert_eq!(init.database_path(), root.join("lexr.db"));
}
