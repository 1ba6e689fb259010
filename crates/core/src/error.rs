//! Engine error model.

use thiserror::Error;

/// Result type used across the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine-level error.
///
/// Business-as-usual edge cases (no sales, no stock, full coverage) are never
/// reported through this type; they resolve to sentinel tiers and floor
/// policies instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Input data was malformed (negative demand, NaN quantities, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Configuration failed validation at load time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A distribution request cannot be satisfied as stated.
    #[error("infeasible distribution: {0}")]
    Infeasible(String),

    /// An identifier was invalid (e.g. blank code, parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflicting operation is in flight (e.g. a scan already running).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The operation was cancelled by the caller.
    #[error("cancelled")]
    Cancelled,

    /// A collaborator (demand aggregator, storage) failed.
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn infeasible(msg: impl Into<String>) -> Self {
        Self::Infeasible(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}
