//! Error taxonomy for page sessions and extraction

use std::time::Duration;

/// Failures raised while loading a page through a [`crate::session::PageSession`]
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    #[error("Timed out after {0:?} loading {1}")]
    Timeout(Duration, String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("HTTP error {status}: {url}")]
    Http { status: u16, url: String },

    #[error("Session error: {0}")]
    Session(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl HarvestError {
    /// Whether retrying the same URL in the same unit can plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            HarvestError::Timeout(..) | HarvestError::Navigation { .. } | HarvestError::Session(_) => true,
            HarvestError::Http { status, .. } => *status >= 500 || *status == 429,
            HarvestError::Io(_) => true,
            HarvestError::Parse(_) => false,
        }
    }
}

impl From<reqwest::Error> for HarvestError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        if err.is_timeout() {
            HarvestError::Timeout(Duration::ZERO, url)
        } else if let Some(status) = err.status() {
            HarvestError::Http { status: status.as_u16(), url }
        } else if err.is_decode() || err.is_body() {
            HarvestError::Parse(err.to_string())
        } else {
            HarvestError::Navigation { url, reason: err.to_string() }
        }
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
