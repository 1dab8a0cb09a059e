//! # AppError
//!
//! Centralized error handling for the pothole engine.
//! Maps adapter failures and rule violations to actionable error types.

use thiserror::Error;

/// The primary error type for all engine operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., Pothole, Report, Image)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., description too short, out-of-bounds coordinates)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Caller is not allowed to perform the operation (banned, not the owner, not a moderator)
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// An external service the request depends on is unavailable (e.g., street snapping)
    #[error("downstream service unavailable: {0}")]
    Downstream(String),

    /// Blob store failure (upload or delete)
    #[error("storage failure: {0}")]
    Storage(String),

    /// Relational store failure; the in-flight transaction has been rolled back
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Internal invariant broken (e.g., a stored pothole with malformed coordinates)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound(entity.to_string(), id.to_string())
    }

    /// Wraps a repository error. Adapter errors arrive as `anyhow::Error`.
    pub fn persistence(err: anyhow::Error) -> Self {
        Self::Persistence(format!("{err:#}"))
    }

    pub fn storage(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }

    pub fn downstream(err: anyhow::Error) -> Self {
        Self::Downstream(format!("{err:#}"))
    }
}

/// A specialized Result type for engine logic.
pub type Result<T> = std::result::Result<T, AppError>;
