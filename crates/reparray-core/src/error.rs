//! Error kinds reported by the indexed array and its collaborators.
//!
//! Nothing here is fatal: every failure is local to the operation that
//! produced it and leaves the container unchanged.

use thiserror::Error;

/// Errors returned by [`IndexedArray`](crate::IndexedArray) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArrayError {
    /// Rejected before any mutation (empty payload, nil GUID, empty identifier, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("guid already present: {0}")]
    DuplicateGuid(String),

    #[error("identifier already present: {0}")]
    DuplicateIdentifier(String),

    /// Key absent from the respective index.
    #[error("not found: {0}")]
    NotFound(String),

    /// An index points outside the backing sequence, or disagrees with it.
    #[error("index inconsistency for {key}: position {position}, length {len}")]
    IndexInconsistency {
        key: String,
        position: usize,
        len: usize,
    },

    /// The payload decoder could not reconstruct the payload.
    #[error("payload could not be decoded: {0}")]
    Deserialization(String),

    #[error("backing sequence could not grow")]
    CapacityExhausted,
}

impl ArrayError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::DuplicateGuid(_) => "duplicate_guid",
            Self::DuplicateIdentifier(_) => "duplicate_identifier",
            Self::NotFound(_) => "not_found",
            Self::IndexInconsistency { .. } => "index_inconsistency",
            Self::Deserialization(_) => "deserialization_failure",
            Self::CapacityExhausted => "capacity_exhausted",
        }
    }

    /// Whether this is a plain miss rather than a defect.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Errors produced while decoding a payload back into its domain value.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is empty")]
    Empty,

    #[error("no decoder registered for type '{0}'")]
    UnknownType(String),

    #[error("json payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("msgpack payload: {0}")]
    MsgPack(#[from] rmp_serde::decode::Error),

    #[error("payload is not an object")]
    NotAnObject,
}

/// Errors produced while encoding a domain value into a payload.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("json payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("msgpack payload: {0}")]
    MsgPack(#[from] rmp_serde::encode::Error),
}

impl From<DecodeError> for ArrayError {
    fn from(err: DecodeError) -> Self {
        Self::Deserialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_distinct_for_miss_and_inconsistency() {
        let miss = ArrayError::NotFound("x".into());
        let stale = ArrayError::IndexInconsistency {
            key: "x".into(),
            position: 4,
            len: 2,
        };
        assert_ne!(miss.error_code(), stale.error_code());
        assert!(miss.is_not_found());
        assert!(!stale.is_not_found());
    }

    #[test]
    fn decode_error_maps_to_deserialization() {
        let err: ArrayError = DecodeError::UnknownType("Weapon".into()).into();
        assert_eq!(err.error_code(), "deserialization_failure");
        assert!(err.to_string().contains("Weapon"));
    }
}
