//! Error types for biogeo-enrich
//!
//! Two layers: `FetchError` classifies external-call failures so the retry
//! policy can tell transient from terminal, and `StageError` records a
//! terminal per-record failure without aborting the batch.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// External collaborator call errors
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level failure (DNS, connect, TLS)
    #[error("Network error: {0}")]
    Network(String),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,

    /// Collaborator signalled rate limiting (429, or 503 from throttling
    /// services)
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Collaborator returned an error status
    #[error("API error {0}: {1}")]
    Api(u16, String),

    /// Failed to parse collaborator response
    #[error("Parse error: {0}")]
    Parse(String),
}

impl FetchError {
    /// Whether the retry policy should attempt this call again.
    ///
    /// Timeouts, rate limiting, network faults, and 5xx responses are
    /// transient; other 4xx responses and parse failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout | FetchError::RateLimited => true,
            FetchError::Api(status, _) => *status >= 500,
            FetchError::Parse(_) => false,
        }
    }

    /// Classify a reqwest transport error.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

/// Terminal failure of one pipeline stage for one record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageError {
    /// Stage that failed (e.g. "osm_features", "timeout")
    pub stage: String,
    /// Human-readable reason
    pub reason: String,
}

impl StageError {
    pub fn new(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.stage, self.reason)
    }
}
