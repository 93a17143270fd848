//! Error types for docgate.

use std::time::Duration;
use thiserror::Error;

use crate::api::{SerializationError, TransportError};

/// Main error type for docgate operations.
#[derive(Error, Debug)]
pub enum DocgateError {
    /// The wait for a submission slot was cancelled; no slot was consumed
    #[error("wait for a submission slot was cancelled")]
    RateLimitCancelled,

    /// No slot became free within the allowed wait; no slot was consumed
    #[error("no submission slot became available within {waited:?}")]
    RateLimitTimeout { waited: Duration },

    /// The request/response exchange did not complete
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The service answered with a non-success status
    #[error("request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// A payload could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// No usable bearer token could be obtained
    #[error("authentication failed{}: {body}", .status.map(|s| format!(" with status {}", s)).unwrap_or_default())]
    AuthenticationFailed { status: Option<u16>, body: String },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DocgateError {
    /// Returns `true` when the same call may succeed if tried again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimitTimeout { .. } | Self::Transport(_) => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Status code returned by the service, if the failure carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            Self::AuthenticationFailed { status, .. } => *status,
            _ => None,
        }
    }
}

/// Result type alias for docgate operations.
pub type Result<T> = std::result::Result<T, DocgateError>;
