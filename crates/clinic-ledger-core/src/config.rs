//! Ledger configuration.

use std::env;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{CorruptRowPolicy, DEFAULT_LEDGER_FILE};
use crate::models::{default_history_start, parse_timestamp};

pub const ENV_DATA_PATH: &str = "CLINIC_LEDGER_DATA";
pub const ENV_HISTORY_START: &str = "CLINIC_LEDGER_HISTORY_START";
pub const ENV_CORRUPT_ROWS: &str = "CLINIC_LEDGER_CORRUPT_ROWS";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid CLINIC_LEDGER_HISTORY_START value {0:?}, expected YYYY-MM-DD HH:MM:SS")]
    InvalidHistoryStart(String),

    #[error("Invalid CLINIC_LEDGER_CORRUPT_ROWS value {0:?}, expected \"skip\" or \"abort\"")]
    InvalidCorruptRowPolicy(String),
}

/// Where the ledger lives and how it is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Backing CSV file
    pub data_path: PathBuf,
    /// Start of the default search window
    pub history_start: NaiveDateTime,
    /// Handling of rows that fail to parse
    pub corrupt_rows: CorruptRowPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_LEDGER_FILE),
            history_start: default_history_start(),
            corrupt_rows: CorruptRowPolicy::default(),
        }
    }
}

impl LedgerConfig {
    /// Configuration for a ledger at `path`, other settings defaulted.
    pub fn at<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            data_path: path.into(),
            ..Self::default()
        }
    }

    /// Read overrides from the environment; unset variables keep defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_DATA_PATH).filter(|s| !s.trim().is_empty()) {
            config.data_path = PathBuf::from(path);
        }

        if let Some(raw) = lookup(ENV_HISTORY_START) {
            config.history_start =
                parse_timestamp(&raw).ok_or(ConfigError::InvalidHistoryStart(raw))?;
        }

        if let Some(raw) = lookup(ENV_CORRUPT_ROWS) {
            config.corrupt_rows = match raw.trim().to_ascii_lowercase().as_str() {
                "skip" => CorruptRowPolicy::Skip,
                "abort" => CorruptRowPolicy::Abort,
                _ => return Err(ConfigError::InvalidCorruptRowPolicy(raw)),
            };
        }

        Ok(config)
    }
}
