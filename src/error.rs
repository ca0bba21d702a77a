//! Error handling for reparrayd.
//!
//! Core container failures arrive as [`ArrayError`] and are wrapped here with
//! the daemon-level failures around them. Every error carries a static code
//! for metric labels.

use reparray_core::ArrayError;
use thiserror::Error;

// ============================================================================
// Host Errors (array operations)
// ============================================================================

/// Errors returned by [`ArrayHost`](crate::state::ArrayHost) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error(transparent)]
    Array(#[from] ArrayError),

    #[error("object count must be at least 1")]
    ZeroCount,

    #[error("array '{0}' has been deleted")]
    Deleted(String),
}

impl HostError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Array(e) => e.error_code(),
            Self::ZeroCount => "zero_count",
            Self::Deleted(_) => "array_deleted",
        }
    }
}

/// Result type for host operations.
pub type HostResult<T> = Result<T, HostError>;

// ============================================================================
// Registry Errors (named array management)
// ============================================================================

/// Errors returned by [`ArrayRegistry`](crate::state::ArrayRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("array name is empty")]
    EmptyName,

    #[error("array already exists: {0}")]
    AlreadyExists(String),

    #[error("no such array: {0}")]
    NoSuchArray(String),
}

impl RegistryError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyName => "empty_name",
            Self::AlreadyExists(_) => "already_exists",
            Self::NoSuchArray(_) => "no_such_array",
        }
    }
}
