//! Top-level error for a compute request.

use thiserror::Error;

use crate::collection::CollectionError;
use crate::stages::PlanError;

#[derive(Debug, Error)]
pub enum ComputeError {
    /// The question cannot be computed as configured (e.g. no storage path
    /// for the requested sub-field).
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error("invalid stage plan: {0}")]
    Plan(#[from] PlanError),
}

impl ComputeError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Get a short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Collection(e) => e.code(),
            Self::Plan(_) => "plan_error",
        }
    }
}
