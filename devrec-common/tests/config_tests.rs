//! Tests for configuration loading and root folder resolution
//!
//! Tests that manipulate DEVREC_ROOT_FOLDER or DEVREC_CONFIG are marked with
//! #[serial] so they do not race on the process environment.

use devrec_common::config::{
    load_toml_or_default, resolve_config_path, LoggingConfig, RootFolderInitializer,
    RootFolderResolver, CONFIG_PATH_ENV, ROOT_FOLDER_ENV,
};
use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[derive(Debug, Default, Deserialize)]
struct BootstrapConfig {
    #[serde(default)]
    root_folder: Option<PathBuf>,
    #[serde(default)]
    logging: LoggingConfig,
}

#[test]
#[serial]
fn test_env_overrides_toml_root_folder() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/devrec-env-root");

    let resolver = RootFolderResolver::new("devrec");
    let root = resolver.resolve(None, Some(Path::new("/tmp/devrec-toml-root")));

    assert_eq!(root, PathBuf::from("/tmp/devrec-env-root"));
    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_toml_root_folder_used_without_env() {
    env::remove_var(ROOT_FOLDER_ENV);

    let resolver = RootFolderResolver::new("devrec");
    let root = resolver.resolve(None, Some(Path::new("/tmp/devrec-toml-root")));

    assert_eq!(root, PathBuf::from("/tmp/devrec-toml-root"));
}

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    env::remove_var(ROOT_FOLDER_ENV);

    let resolver = RootFolderResolver::new("devrec");
    let root = resolver.resolve(None, None);

    assert_eq!(root, resolver.default_root_folder());
    assert!(root.to_string_lossy().contains("devrec"));
}

#[test]
#[serial]
fn test_config_path_from_env() {
    env::set_var(CONFIG_PATH_ENV, "/tmp/devrec-from-env.toml");

    let path = resolve_config_path(None, "devrec.toml");
    assert_eq!(path, Some(PathBuf::from("/tmp/devrec-from-env.toml")));

    let cli = resolve_config_path(Some(Path::new("/tmp/cli.toml")), "devrec.toml");
    assert_eq!(cli, Some(PathBuf::from("/tmp/cli.toml")));

    env::remove_var(CONFIG_PATH_ENV);
}

#[test]
fn test_load_existing_toml() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("devrec.toml");
    std::fs::write(
        &path,
        "root_folder = \"/data/devrec\"\n\n[logging]\nlevel = \"debug\"\n",
    )
    .unwrap();

    let cfg: BootstrapConfig = load_toml_or_default(Some(&path)).unwrap();

    assert_eq!(cfg.root_folder, Some(PathBuf::from("/data/devrec")));
    assert_eq!(cfg.logging.level, "debug");
    assert!(cfg.logging.file.is_none());
}

#[test]
fn test_malformed_toml_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[logging\nlevel = ").unwrap();

    let result: devrec_common::Result<BootstrapConfig> = load_toml_or_default(Some(&path));
    assert!(matches!(result, Err(devrec_common::Error::Config(_))));
}

#[test]
fn test_initializer_creates_directory() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("nested").join("root");

    let init = RootFolderInitializer::new(root.clone());
    init.ensure_directory_exists().unwrap();

    assert!(root.is_dir());
    assert_eq!(init.database_path(), root.join("devrec.db"));
}
