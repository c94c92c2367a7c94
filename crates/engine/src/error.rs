//! Error types for DOM access and page loading

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomError {
    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Stale element handle: {0}")]
    StaleHandle(String),

    #[error("Action not supported: {0}")]
    Unsupported(String),

    #[error("Page load failed for {url}: {reason}")]
    Load { url: String, reason: String },

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type DomResult<T> = Result<T, DomError>;

impl DomError {
    /// A bad selector is a configuration defect; every other accessor
    /// failure is a page condition the caller recovers from.
    pub fn contract_violation(&self) -> Option<sitecheck_common::Error> {
        match self {
            DomError::InvalidSelector { selector, reason } => {
                Some(sitecheck_common::Error::InvalidSelector {
                    selector: selector.clone(),
                    reason: reason.clone(),
                })
            }
            _ => None,
        }
    }
}
