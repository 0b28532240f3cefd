//! Error types
//!
//! Failures surfaced to callers of an intercepted handle. Handler faults
//! are never represented here: they are delivered through the emulated
//! `error`/`loadend` events instead.

/// XHR errors
#[derive(Debug, thiserror::Error)]
pub enum XhrError {
    /// The call is not allowed in the handle's current state, or the
    /// requested response representation does not match `responseType`.
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    #[error("Forbidden header: {0}")]
    ForbiddenHeader(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Network error: {0}")]
    Network(String),
}

/// Request body access errors
#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("Body has already been consumed")]
    AlreadyUsed,

    #[error("Body is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = XhrError> = std::result::Result<T, E>;
