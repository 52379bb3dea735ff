//! Configuration loading and representation.
//!
//! Everything comes from environment variables so the same binary runs in a
//! terminal, a cron job or a container without a config file:
//!
//! | variable               | default      | meaning                                  |
//! |------------------------|--------------|------------------------------------------|
//! | `TALLY_DATA_PATH`      | `tally.json` | ledger document used by the file store   |
//! | `TALLY_LOG_FORMAT`     | `json`       | `json` or `pretty`                       |
//! | `TALLY_HISTORY_POLICY` | `reject`     | `reject` or `quarantine` at hydration    |
//! | `TALLY_SYNC_SOURCE`    | `local`      | source name stamped on published events  |

use std::path::PathBuf;

use thiserror::Error;

use tally_accounting::HistoryPolicy;
use tally_observability::LogFormat;

pub const DATA_PATH_VAR: &str = "TALLY_DATA_PATH";
pub const LOG_FORMAT_VAR: &str = "TALLY_LOG_FORMAT";
pub const HISTORY_POLICY_VAR: &str = "TALLY_HISTORY_POLICY";
pub const SYNC_SOURCE_VAR: &str = "TALLY_SYNC_SOURCE";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub data_path: PathBuf,
    pub log_format: LogFormat,
    pub history_policy: HistoryPolicy,
    /// Identifies this replica on the event bus; events carrying it are echoes.
    pub source: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("tally.json"),
            log_format: LogFormat::Json,
            history_policy: HistoryPolicy::Reject,
            source: "local".to_string(),
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset or blank keys keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(path) = get(DATA_PATH_VAR) {
            config.data_path = PathBuf::from(path);
        }
        if let Some(value) = get(LOG_FORMAT_VAR) {
            config.log_format = value.parse().map_err(|e| invalid(LOG_FORMAT_VAR, &value, e))?;
        }
        if let Some(value) = get(HISTORY_POLICY_VAR) {
            config.history_policy = value
                .parse()
                .map_err(|e| invalid(HISTORY_POLICY_VAR, &value, e))?;
        }
        if let Some(source) = get(SYNC_SOURCE_VAR) {
            config.source = source;
        }

        Ok(config)
    }
}

fn invalid(key: &'static str, value: &str, reason: impl core::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
