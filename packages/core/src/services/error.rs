//! Service Layer Error Types
//!
//! `BlockServiceError` is what block operations return to their callers.
//! `OperationFailure` is the queue's view of the same errors: every failure of a
//! replayed operation is classified as permanent or transient before the queue
//! decides whether to retry it.

use crate::db::{PositionError, StoreError};
use std::fmt;
use thiserror::Error;

/// Message fragments of backend errors that will never succeed on retry
const PERMANENT_SIGNATURES: [&str; 5] = [
    "permission-denied",
    "not-found",
    "invalid-argument",
    "unauthenticated",
    "failed-precondition",
];

/// Block operation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlockServiceError {
    /// Target block, page or named neighbor does not exist
    #[error("Block not found: {id}")]
    NotFound { id: String },

    /// Position keys could not be generated for the requested slot
    #[error("Position error: {0}")]
    InvalidRange(#[from] PositionError),

    /// Backing store unreachable or refusing access
    #[error("Store unavailable: {0}")]
    StoreUnavailable(StoreError),

    /// Any other backing store failure
    #[error("Store operation failed: {0}")]
    Store(StoreError),

    /// Version conflict (optimistic concurrency control)
    #[error("Version conflict for block {id}: expected version {expected}, found {actual}")]
    VersionConflict {
        id: String,
        expected: i64,
        actual: i64,
    },

    /// Request or stored document is malformed
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl BlockServiceError {
    /// Create a not found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a version conflict error
    pub fn version_conflict(id: impl Into<String>, expected: i64, actual: i64) -> Self {
        Self::VersionConflict {
            id: id.into(),
            expected,
            actual,
        }
    }

    /// Create an invalid payload error
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }
}

impl From<StoreError> for BlockServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id, .. } => Self::NotFound { id },
            StoreError::Serialization(msg) | StoreError::InvalidArgument(msg) => {
                Self::InvalidPayload(msg)
            }
            err if err.is_unavailable() => Self::StoreUnavailable(err),
            err => Self::Store(err),
        }
    }
}

/// Classified failure of a replayed queue operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationFailure {
    /// Will never succeed; record it and move on
    Permanent { reason: String },

    /// May succeed later; stop draining and retry on the next trigger
    Transient { reason: String },
}

impl OperationFailure {
    pub fn is_permanent(&self) -> bool {
        matches!(self, OperationFailure::Permanent { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            OperationFailure::Permanent { reason } | OperationFailure::Transient { reason } => {
                reason
            }
        }
    }
}

impl fmt::Display for OperationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationFailure::Permanent { reason } => write!(f, "permanent failure: {}", reason),
            OperationFailure::Transient { reason } => write!(f, "transient failure: {}", reason),
        }
    }
}

/// Decide whether a failed operation is worth retrying
///
/// Typed variants decide first. Unclassified backend errors fall back to
/// matching known non-retryable signatures in their message; anything else is
/// assumed to be a temporary condition.
pub fn classify(error: &BlockServiceError) -> OperationFailure {
    let reason = error.to_string();
    let permanent = match error {
        BlockServiceError::NotFound { .. }
        | BlockServiceError::InvalidRange(_)
        | BlockServiceError::InvalidPayload(_) => true,
        BlockServiceError::StoreUnavailable(StoreError::PermissionDenied(_)) => true,
        BlockServiceError::StoreUnavailable(_) => false,
        // a stale expected version stays stale on replay
        BlockServiceError::VersionConflict { .. } => true,
        BlockServiceError::Store(store_error) => match store_error {
            StoreError::NotFound { .. }
            | StoreError::PermissionDenied(_)
            | StoreError::InvalidArgument(_)
            | StoreError::Serialization(_) => true,
            StoreError::Unavailable(_) | StoreError::Timeout(_) => false,
            StoreError::Backend(message) => has_permanent_signature(message),
        },
    };

    if permanent {
        OperationFailure::Permanent { reason }
    } else {
        OperationFailure::Transient { reason }
    }
}

fn has_permanent_signature(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    PERMANENT_SIGNATURES
        .iter()
        .any(|signature| message.contains(signature))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_conversion() {
        let err: BlockServiceError = StoreError::not_found("blocks", "b-1").into();
        assert_eq!(err, BlockServiceError::not_found("b-1"));

        let err: BlockServiceError = StoreError::unavailable("offline").into();
        assert!(matches!(err, BlockServiceError::StoreUnavailable(_)));

        let err: BlockServiceError = StoreError::Backend("boom".to_string()).into();
        assert!(matches!(err, BlockServiceError::Store(_)));
    }

    #[test]
    fn test_classify_typed_variants() {
        assert!(classify(&BlockServiceError::not_found("b-1")).is_permanent());
        assert!(classify(&BlockServiceError::invalid_payload("bad")).is_permanent());
        assert!(classify(&BlockServiceError::version_conflict("b-1", 1, 2)).is_permanent());
        assert!(
            classify(&StoreError::PermissionDenied("rules".to_string()).into()).is_permanent()
        );
        assert!(!classify(&StoreError::unavailable("offline").into()).is_permanent());
        assert!(!classify(&StoreError::Timeout("10s".to_string()).into()).is_permanent());
    }

    #[test]
    fn test_classify_backend_signatures() {
        let denied = BlockServiceError::Store(StoreError::Backend(
            "Missing or insufficient permissions (permission-denied)".to_string(),
        ));
        assert!(classify(&denied).is_permanent());

        let precondition = BlockServiceError::Store(StoreError::Backend(
            "FAILED-PRECONDITION: index missing".to_string(),
        ));
        assert!(classify(&precondition).is_permanent());

        let reset = BlockServiceError::Store(StoreError::Backend("connection reset".to_string()));
        let failure = classify(&reset);
        assert!(!failure.is_permanent());
        assert!(failure.reason().contains("connection reset"));
    }
}
