//! Error types for the load driver.
//!
//! Only failures that prevent a run from starting (or its results from
//! being written) surface here. Per-request failures are data, not errors,
//! and end up in the outcome log.

use thiserror::Error;

/// Result type alias using DriverError.
pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Invalid scenario configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid threshold rule '{rule}': {message}")]
    InvalidThreshold { rule: String, message: String },

    #[error("Unknown scenario '{0}' (not a built-in name or an existing file)")]
    UnknownScenario(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse scenario YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl DriverError {
    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    pub(crate) fn invalid_threshold(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidThreshold {
            rule: rule.into(),
            message: message.into(),
        }
    }
}
