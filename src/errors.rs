// src/errors.rs
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the CabiGo client.
///
/// Every remote call funnels into one of these variants so callers can tell
/// a benign "no such resource" apart from an expired session and from a real
/// failure. Polling loops never let these escape their own boundary; only
/// user-triggered actions surface them.
#[derive(Debug, Error)]
pub enum CabError {
    // Session / auth
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    // Resource lifecycle
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),

    // Transport
    #[error("request timed out")]
    NetworkTimeout,
    #[error("network connection error: {0}")]
    NetworkConnection(String),
    #[error("http client error: {0}")]
    HttpClient(String),

    // Server-side failures that are none of the above
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    // Serialization
    #[error("json parsing error: {0}")]
    JsonParsing(String),
    #[error("json serialization error: {0}")]
    JsonSerialization(String),

    // Caught before anything is sent to the server
    #[error("validation failed: {} error(s)", .0.len())]
    ValidationFailed(Vec<ValidationError>),

    // Local session storage
    #[error("session storage error: {0}")]
    SessionStorage(String),

    // Configuration
    #[error("configuration error: {0}")]
    Configuration(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

/// Convenience type alias for Results
pub type CabResult<T> = Result<T, CabError>;

impl CabError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        CabError::Unauthorized(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        CabError::NotFound(resource.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        CabError::Conflict(msg.into())
    }

    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        CabError::ValidationFailed(vec![ValidationError {
            field: field.into(),
            message: message.into(),
        }])
    }

    /// Transient failures are retryable by the next poll tick; everything
    /// else needs explicit handling.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CabError::NetworkTimeout | CabError::NetworkConnection(_) | CabError::HttpClient(_)
        )
    }
}

impl From<reqwest::Error> for CabError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CabError::NetworkTimeout
        } else if err.is_connect() {
            CabError::NetworkConnection(err.to_string())
        } else {
            CabError::HttpClient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CabError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() {
            CabError::JsonParsing(err.to_string())
        } else {
            CabError::JsonSerialization(err.to_string())
        }
    }
}
