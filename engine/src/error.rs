//! Error types for the Pulse engine.

use thiserror::Error;

/// All possible errors from the Pulse engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Gate errors
    #[error("missing credentials: game key and secret key must be non-blank")]
    MissingCredentials,

    #[error("already initialized")]
    AlreadyInitialized,

    // Validation errors
    #[error("invalid progression status: {0}")]
    InvalidStatus(i64),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid number for field '{field}': {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("invalid price: {0} micros")]
    InvalidPrice(i64),
}

impl Error {
    /// Whether this error is the idempotent "already initialized" no-op.
    pub fn is_already_initialized(&self) -> bool {
        matches!(self, Error::AlreadyInitialized)
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
