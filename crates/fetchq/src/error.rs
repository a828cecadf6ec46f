//! Error types for fetchq.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for fetchq operations.
pub type Result<T> = std::result::Result<T, FetchError>;

/// Errors produced while configuring the queue or running a fetch attempt.
///
/// Transport failures are stored as rendered messages so that one error value
/// can be published to every event subscriber and still be handed back to the
/// caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("invalid {option} option: {value}")]
    InvalidConfig { option: &'static str, value: String },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    #[error("failed to decode response body: {0}")]
    Decode(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The queue was dropped while the job was pending or about to retry,
    /// or the attempt panicked.
    #[error("job abandoned before it settled")]
    Abandoned,

    #[error("fetch queue used outside a Tokio runtime")]
    NoRuntime,
}

impl FetchError {
    /// Configuration errors are rejected up front and never reach the retry filter.
    pub fn is_config(&self) -> bool {
        matches!(self, FetchError::InvalidConfig { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self { FetchError::Decode(e.to_string()) }
}

impl From<crate::effects::scheduler::Abandoned> for FetchError {
    fn from(_: crate::effects::scheduler::Abandoned) -> Self { FetchError::Abandoned }
}

impl From<crate::effects::scheduler::NoRuntime> for FetchError {
    fn from(_: crate::effects::scheduler::NoRuntime) -> Self { FetchError::NoRuntime }
}
