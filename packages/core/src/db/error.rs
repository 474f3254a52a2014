//! Storage Error Types
//!
//! `StoreError` covers the remote document store, `CacheError` the durable
//! local store behind the Local Cache.

use thiserror::Error;

/// Backing document store errors
///
/// Backends map their native failures onto these variants. Anything they
/// cannot classify goes into `Backend` with the original message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Document does not exist
    #[error("Document '{id}' not found in '{collection}'")]
    NotFound { collection: String, id: String },

    /// Caller is not allowed to perform the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Payload rejected by the store (schema violation, bad field)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Store unreachable or temporarily refusing requests
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Request did not complete in time
    #[error("Store request timed out: {0}")]
    Timeout(String),

    /// Document could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Unclassified backend failure
    #[error("Store error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Store could not be reached or refused access outright
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable(_) | StoreError::Timeout(_) | StoreError::PermissionDenied(_)
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Local durable storage errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Durable storage cannot be opened or written (quota, sandbox, I/O)
    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Stored record could not be encoded or decoded
    #[error("Cache serialization error: {0}")]
    Serialization(String),

    /// Record to update does not exist
    #[error("Cache record not found: {0}")]
    NotFound(String),
}

impl CacheError {
    pub fn storage_unavailable(msg: impl Into<String>) -> Self {
        Self::StorageUnavailable(msg.into())
    }

    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, CacheError::StorageUnavailable(_))
    }
}

impl From<libsql::Error> for CacheError {
    fn from(err: libsql::Error) -> Self {
        CacheError::StorageUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::not_found("blocks", "b-1");
        assert_eq!(err.to_string(), "Document 'b-1' not found in 'blocks'");

        let err = CacheError::storage_unavailable("quota exceeded");
        assert_eq!(err.to_string(), "Local storage unavailable: quota exceeded");
    }

    #[test]
    fn test_unavailable_classification() {
        assert!(StoreError::unavailable("offline").is_unavailable());
        assert!(StoreError::Timeout("10s".to_string()).is_unavailable());
        assert!(!StoreError::InvalidArgument("bad".to_string()).is_unavailable());
    }

    #[test]
    fn test_cache_error_from_serde_json() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json")
            .expect_err("Should fail to parse");
        let err: CacheError = json_error.into();
        assert!(matches!(err, CacheError::Serialization(_)));
        assert!(!err.is_storage_unavailable());
    }
}
