//! Error types for Brigade API calls.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when calling the Brigade API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The stored resource changed underneath the write (HTTP 409)
    #[error("conflict: {reason}")]
    Conflict { reason: String },

    /// The addressed resource does not exist (HTTP 404)
    #[error("not found: {reason}")]
    NotFound { reason: String },

    /// The token was missing, invalid or lacked permission (HTTP 401/403)
    #[error("unauthorized: {status}")]
    Unauthorized { status: u16 },

    /// Any other non-success response
    #[error("Brigade API error: {status} - {message}")]
    Status { status: u16, message: String },

    /// The caller's deadline elapsed before the call completed
    #[error("request did not complete within {0:?}")]
    DeadlineExceeded(Duration),

    /// The client could not be constructed from its configuration
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl ApiError {
    /// Returns true for optimistic-concurrency conflicts.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
