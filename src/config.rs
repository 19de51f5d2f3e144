//! Run configuration
//!
//! JSON config file read once per worker before any session is opened.
//! Unlike a desktop app that can fall back to defaults, a worker with a
//! missing or malformed config file has nothing sensible to run against, so
//! loading fails hard with a configuration error.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::HarnessError;

/// Environment variable holding the grid account username.
pub const USERNAME_ENV: &str = "BROWSERSTACK_USERNAME";
/// Environment variable holding the grid account access key.
pub const ACCESS_KEY_ENV: &str = "BROWSERSTACK_ACCESS_KEY";

fn default_endpoint() -> String {
    "wss://cdp.browserstack.com/playwright".to_string()
}

fn default_entry_url() -> String {
    "https://www.linklogistics.com/".to_string()
}

fn default_open_timeout() -> u64 {
    45
}

fn default_report_dir() -> String {
    "Reports".to_string()
}

/// Harness run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    /// Grid connection endpoint the serialized capabilities are appended to.
    #[serde(default = "default_endpoint")]
    pub grid_endpoint: String,

    /// System-under-test entry point every fresh session navigates to.
    #[serde(default = "default_entry_url")]
    pub entry_url: String,

    /// Bound on each slow session-open step (connect, context, navigate).
    #[serde(default = "default_open_timeout")]
    pub open_timeout_secs: u64,

    /// Report area wiped and recreated at run start.
    #[serde(default = "default_report_dir")]
    pub report_dir: String,

    /// Grid account username; falls back to `BROWSERSTACK_USERNAME`.
    #[serde(default)]
    pub username: Option<String>,

    /// Grid account access key; falls back to `BROWSERSTACK_ACCESS_KEY`.
    #[serde(default)]
    pub access_key: Option<String>,
}

impl RunConfig {
    /// Load and validate the config file at `path`.
    ///
    /// The file must exist and parse to a non-null JSON object.
    pub fn load(path: &Path) -> Result<Self, HarnessError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::Configuration(format!(
                "config file {} not readable: {}",
                path.display(),
                e
            ))
        })?;

        let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            HarnessError::Configuration(format!("config file {} invalid: {}", path.display(), e))
        })?;

        if !value.is_object() {
            return Err(HarnessError::Configuration(format!(
                "config file {} must contain a JSON object",
                path.display()
            )));
        }

        let config: RunConfig = serde_json::from_value(value).map_err(|e| {
            HarnessError::Configuration(format!("config file {} invalid: {}", path.display(), e))
        })?;

        info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

/// Grid account credentials.
///
/// Never literal in code or in the catalog: sourced from the config file,
/// falling back to the process environment.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub access_key: String,
}

impl Credentials {
    /// Resolve credentials from the config, then the environment.
    ///
    /// Validation is intentionally done here, at startup, rather than on the
    /// first connection attempt: a run that is doomed by missing credentials
    /// should not open any sessions at all.
    pub fn resolve(config: &RunConfig) -> Result<Self, HarnessError> {
        let username = Self::value_or_env(config.username.as_deref(), USERNAME_ENV)?;
        let access_key = Self::value_or_env(config.access_key.as_deref(), ACCESS_KEY_ENV)?;
        Ok(Self {
            username,
            access_key,
        })
    }

    fn value_or_env(configured: Option<&str>, env_key: &str) -> Result<String, HarnessError> {
        if let Some(value) = configured {
            if !value.is_empty() {
                return Ok(value.to_string());
            }
        }

        match std::env::var(env_key) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Err(HarnessError::Configuration(format!(
                "{} not set in config or environment",
                env_key
            ))),
        }
    }
}
