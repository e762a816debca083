//! Application configuration
//!
//! Read from a JSON file where every field has a default, then overridden
//! by environment variables.

use ica_lifecycle::BOGOTA_OFFSET_HOURS;
use ica_numbering::DEFAULT_DIGIT_WIDTH;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_DATABASE: &str = "ICA_DATABASE";
pub const ENV_UTC_OFFSET_HOURS: &str = "ICA_UTC_OFFSET_HOURS";
pub const ENV_SYSTEM_KEY: &str = "ICA_SYSTEM_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite database file
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Civil time offset from UTC, in hours
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,

    /// Width used by `counter set` when none is given
    #[serde(default = "default_digit_width")]
    pub default_digit_width: u32,

    /// Formula parameters per municipality (JSON); defaults apply when absent
    #[serde(default)]
    pub parameters_file: Option<PathBuf>,

    /// Hex seed of the system seal key. Only ever taken from the environment.
    #[serde(skip)]
    pub system_key: Option<String>,
}

fn default_database() -> PathBuf {
    PathBuf::from("ica.db")
}

fn default_utc_offset_hours() -> i32 {
    BOGOTA_OFFSET_HOURS
}

fn default_digit_width() -> u32 {
    DEFAULT_DIGIT_WIDTH
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            utc_offset_hours: default_utc_offset_hours(),
            default_digit_width: default_digit_width(),
            parameters_file: None,
            system_key: None,
        }
    }
}

impl AppConfig {
    /// Load config from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// File (when given) then process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply overrides from `lookup`, keyed by environment variable name
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(database) = lookup(ENV_DATABASE) {
            self.database = PathBuf::from(database);
        }
        if let Some(value) = lookup(ENV_UTC_OFFSET_HOURS) {
            self.utc_offset_hours = value
                .trim()
                .parse()
                .ok()
                .filter(|hours: &i32| (-23..=23).contains(hours))
                .ok_or(ConfigError::InvalidEnv {
                    name: ENV_UTC_OFFSET_HOURS,
                    value,
                })?;
        }
        if let Some(key) = lookup(ENV_SYSTEM_KEY) {
            self.system_key = Some(key);
        }
        Ok(())
    }
}
