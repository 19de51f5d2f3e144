//! Harness error types

use thiserror::Error;

/// Errors surfaced by the harness.
///
/// Teardown problems are deliberately absent: once a close has started, later
/// failures in the same teardown are logged as warnings and never propagated.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Whether this error is fatal to the whole run rather than one scenario.
    ///
    /// Configuration problems (bad config file, empty catalog) abort before
    /// any session is opened; connection and navigation failures are isolated
    /// to the scenario that hit them.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HarnessError::Configuration(_))
    }
}

impl From<HarnessError> for String {
    fn from(err: HarnessError) -> String {
        err.to_string()
    }
}
