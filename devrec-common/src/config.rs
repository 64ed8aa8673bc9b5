//! Bootstrap configuration loading and root folder resolution
//!
//! Configuration file resolution order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. `<user config dir>/devrec/<file name>`
//! 4. Compiled defaults (a missing file is not an error)
//!
//! Root folder resolution order:
//! 1. Command-line argument
//! 2. `DEVREC_ROOT_FOLDER` environment variable
//! 3. `root_folder` key of the loaded TOML
//! 4. OS-dependent data directory

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "DEVREC_ROOT_FOLDER";

/// Environment variable overriding the configuration file path
pub const CONFIG_PATH_ENV: &str = "DEVREC_CONFIG";

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP surface binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5780))
}

/// Locate the configuration file to load, if any
///
/// Returns `None` when neither the CLI nor the environment names a file and
/// no file exists in the user config directory.
pub fn resolve_config_path(cli_arg: Option<&Path>, file_name: &str) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("devrec").join(file_name))
        .filter(|p| p.exists())
}

/// Load a TOML configuration, falling back to defaults when the file is absent
///
/// An explicitly named file that exists but cannot be parsed is an error; a
/// missing file only logs a warning.
pub fn load_toml_or_default<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        info!("No configuration file found, using compiled defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(path = %path.display(), "Configuration file not found, using compiled defaults");
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!(path = %path.display(), "Loaded configuration file");
    Ok(config)
}

/// Resolves the root folder holding the database and durable logs
pub struct RootFolderResolver {
    app_name: String,
}

impl RootFolderResolver {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }

    /// Resolve following the documented priority order
    pub fn resolve(&self, cli_arg: Option<&Path>, toml_value: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_arg {
            return path.to_path_buf();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = toml_value {
            return path.to_path_buf();
        }

        self.default_root_folder()
    }

    /// OS-dependent default root folder
    pub fn default_root_folder(&self) -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join(&self.app_name))
            .unwrap_or_else(|| PathBuf::from(format!("./{}_data", self.app_name)))
    }
}

/// Creates the root folder and derives file locations inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create the root folder if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!(path = %self.root_folder.display(), "Created root folder");
        }
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Path of the SQLite database file
    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join("devrec.db")
    }

    /// Path of the durable parse error log
    pub fn parse_error_log_path(&self) -> PathBuf {
        self.root_folder.join("parse_errors.jsonl")
    }
}
