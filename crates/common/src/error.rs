//! Error types for sitecheck
//!
//! Everything a page itself can cause is turned into verdict data by the
//! engine. The variants here are configuration and contract violations,
//! plus the I/O and parse failures of loading that configuration.

use thiserror::Error;

/// Result type alias using sitecheck Error
pub type Result<T> = std::result::Result<T, Error>;

/// sitecheck error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unknown component kind: {0}")]
    UnknownComponent(String),

    #[error("Duplicate field '{field}' in {owner}")]
    DuplicateField { owner: String, field: String },

    #[error("Expectation for {component} references unknown field '{field}'")]
    UnknownField { component: String, field: String },

    #[error("Key rule for {component} references unknown field '{field}'")]
    UnknownKeyField { component: String, field: String },

    #[error("Expected child #{index} of {component} has no derivable matching key")]
    MissingChildKey { component: String, index: usize },

    #[error("Duplicate expected key '{key}' in {component}")]
    DuplicateExpectedKey { component: String, key: String },

    #[error("{component} declares child expectations but its descriptor has no repeat")]
    NoRepeat { component: String },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn invalid_pattern(pattern: &str, reason: impl ToString) -> Self {
        Error::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        }
    }
}
