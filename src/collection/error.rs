//! Error types for the storage collaborators.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while fetching raw results, statistics or entities.
#[derive(Debug, Error)]
pub enum CollectionError {
    /// The aggregation itself failed - may be retryable.
    #[error("{backend} query failed: {message}")]
    Query {
        backend: &'static str,
        message: String,
        retryable: bool,
    },

    /// Query timed out - retryable.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Filter tree could not be compiled into a match filter.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Fixture or backing file is malformed.
    #[error("malformed data: {0}")]
    Malformed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CollectionError {
    pub fn query(backend: &'static str, message: impl Into<String>, retryable: bool) -> Self {
        Self::Query {
            backend,
            message: message.into(),
            retryable,
        }
    }

    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Query { retryable, .. } => *retryable,
            Self::Timeout(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted | std::io::ErrorKind::TimedOut
            ),
            Self::InvalidFilter(_) | Self::Malformed(_) | Self::Json(_) => false,
        }
    }

    /// Get a short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Query { .. } => "query_error",
            Self::Timeout(_) => "timeout",
            Self::InvalidFilter(_) => "invalid_filter",
            Self::Malformed(_) => "malformed",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
        }
    }
}
