//! Common error types for the process score service

use thiserror::Error;

/// Common result type for score operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the Score Store, Adjustment Service,
/// Reconciliation Engine and Appeal Workflow
#[derive(Error, Debug)]
pub enum Error {
    /// Missing reason, empty content/response, malformed delta or weight
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced task, stage, member, score row or appeal is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation not allowed in the current state (e.g. resolving a closed appeal)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Caller is not allowed to perform the operation
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Caller identity could not be established
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for [`Error::Validation`]
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Shorthand for [`Error::NotFound`]
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Stable machine-readable code used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::InvalidState(_) => "INVALID_STATE",
            Error::Authorization(_) => "FORBIDDEN",
            Error::Unauthenticated(_) => "UNAUTHENTICATED",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
