//! Host-supplied core configuration.
//!
//! # Responsibility
//! - Parse the JSON settings a host app passes at startup.
//! - Bring up logging and the shared store from those settings.
//!
//! # Invariants
//! - `db_path` is never empty.
//! - `log_dir`, when set, is absolute.

use crate::db::instance;
use crate::logging::{default_log_level, init_logging};
use crate::repo::todo_repo::{RepoError, SqliteTodoStore};
use log::info;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Startup settings for the to-do core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// SQLite database file.
    pub db_path: PathBuf,
    #[serde(default = "default_level_string")]
    pub log_level: String,
    /// File logging is skipped when absent.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    Invalid(String),
    Logging(String),
    Store(RepoError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
            Self::Logging(message) => write!(f, "logging setup failed: {message}"),
            Self::Store(err) => write!(f, "store setup failed: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Invalid(_) | Self::Logging(_) => None,
        }
    }
}

impl CoreConfig {
    /// Config with default logging and no log directory.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            log_level: default_level_string(),
            log_dir: None,
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("db_path cannot be empty".to_string()));
        }
        if let Some(log_dir) = &self.log_dir {
            if !log_dir.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "log_dir must be an absolute path, got `{}`",
                    log_dir.display()
                )));
            }
        }
        Ok(())
    }
}

/// Starts logging (when configured) and opens the shared store.
pub fn bootstrap(config: &CoreConfig) -> Result<Arc<SqliteTodoStore>, ConfigError> {
    config.validate()?;
    if let Some(log_dir) = &config.log_dir {
        init_logging(&config.log_level, log_dir).map_err(ConfigError::Logging)?;
    }
    let store = instance::init(&config.db_path).map_err(ConfigError::Store)?;
    info!("event=bootstrap module=config status=ok");
    Ok(store)
}

fn default_level_string() -> String {
    default_log_level().to_string()
}
