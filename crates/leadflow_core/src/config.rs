//! Process configuration.
//!
//! # Responsibility
//! - Hold the settings needed to wire the store, logging and broadcasts.
//! - Read overrides from `LEADFLOW_*` environment variables.
//!
//! # Invariants
//! - Unset variables keep their defaults; set-but-invalid values are errors.

use crate::logging::default_log_level;
use crate::model::lead::StagePolicy;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const ENV_DB_PATH: &str = "LEADFLOW_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "LEADFLOW_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "LEADFLOW_LOG_DIR";
pub const ENV_OBSERVER_BUFFER: &str = "LEADFLOW_OBSERVER_BUFFER";
pub const ENV_STAGE_POLICY: &str = "LEADFLOW_STAGE_POLICY";

const DEFAULT_DB_FILE_NAME: &str = "leadflow.sqlite3";
const DEFAULT_OBSERVER_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}=`{value}`: {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadflowConfig {
    pub db_path: PathBuf,
    pub log_level: String,
    /// File logging is skipped when unset.
    pub log_dir: Option<PathBuf>,
    /// Undelivered frames buffered per observer before it is disconnected.
    pub observer_buffer: usize,
    pub stage_policy: StagePolicy,
}

impl Default for LeadflowConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_FILE_NAME),
            log_level: default_log_level().to_string(),
            log_dir: None,
            observer_buffer: DEFAULT_OBSERVER_BUFFER,
            stage_policy: StagePolicy::default(),
        }
    }
}

impl LeadflowConfig {
    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads overrides through `lookup`, starting from defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(path) = read(ENV_DB_PATH) {
            config.db_path = PathBuf::from(path.trim());
        }
        if let Some(level) = read(ENV_LOG_LEVEL) {
            config.log_level = level.trim().to_string();
        }
        if let Some(dir) = read(ENV_LOG_DIR) {
            config.log_dir = Some(PathBuf::from(dir.trim()));
        }
        if let Some(buffer) = read(ENV_OBSERVER_BUFFER) {
            config.observer_buffer = match buffer.trim().parse::<usize>() {
                Ok(value) if value > 0 => value,
                Ok(_) => return Err(invalid(ENV_OBSERVER_BUFFER, &buffer, "must be >= 1")),
                Err(err) => return Err(invalid(ENV_OBSERVER_BUFFER, &buffer, &err.to_string())),
            };
        }
        if let Some(policy) = read(ENV_STAGE_POLICY) {
            config.stage_policy = policy
                .parse()
                .map_err(|reason: String| invalid(ENV_STAGE_POLICY, &policy, &reason))?;
        }

        Ok(config)
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
