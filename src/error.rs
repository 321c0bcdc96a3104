//! Error types for Quarry.
//!
//! Defines the main error enum used throughout the crate.

use thiserror::Error;

use crate::service::ExecutionStatus;

/// Main error type for Quarry operations.
#[derive(Error, Debug)]
pub enum QuarryError {
    /// Request shape errors (missing sql, conflicting sql/execution id,
    /// bad placeholder count, etc.). Raised before any service call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors (missing output bucket, invalid config file, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transient service errors (network hiccups, throttling, service
    /// unavailable). Retried within the backoff budget.
    #[error("Transient service error: {0}")]
    Transient(String),

    /// Authorization failures. Surfaced immediately, never retried.
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// The execution reached a terminal FAILED/CANCELLED status upstream.
    #[error("Execution {execution_id} {status}: {reason}")]
    ExecutionFailed {
        execution_id: String,
        status: ExecutionStatus,
        reason: String,
    },

    /// The poll budget ran out while the execution stayed non-terminal.
    #[error("Execution {execution_id} still {last_status} after {attempts} poll attempts")]
    RetryExhausted {
        execution_id: String,
        attempts: u32,
        last_status: ExecutionStatus,
    },

    /// Output bytes did not match the declared column schema.
    #[error("Malformed row: {0}")]
    MalformedRow(String),

    /// Object storage errors (missing object, read failure, etc.)
    #[error("Storage error: {0}")]
    Storage(String),
}

impl QuarryError {
    /// Creates a validation error with the given message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a transient service error with the given message.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Creates an authorization error with the given message.
    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    /// Creates a malformed-row error with the given message.
    pub fn malformed_row(msg: impl Into<String>) -> Self {
        Self::MalformedRow(msg.into())
    }

    /// Creates a storage error with the given message.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Returns true if the operation that produced this error may be retried.
    ///
    /// Only transient service errors qualify; everything else is either a
    /// caller mistake or a terminal upstream outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Validation Error",
            Self::Config(_) => "Configuration Error",
            Self::Transient(_) => "Transient Service Error",
            Self::Authorization(_) => "Authorization Error",
            Self::ExecutionFailed { .. } => "Execution Failed",
            Self::RetryExhausted { .. } => "Retry Exhausted",
            Self::MalformedRow(_) => "Malformed Row",
            Self::Storage(_) => "Storage Error",
        }
    }
}

/// Result type alias using QuarryError.
pub type Result<T> = std::result::Result<T, QuarryError>;
