//! Storage error types shared across all store implementations.

use std::fmt;

/// Errors that can occur when interacting with a storage backend.
///
/// This enum covers failures from any backend (in-memory, file, SQL).
/// Input-validation errors (bad parameters, malformed IDs) should be
/// handled at the call site before reaching the storage layer.
#[derive(Debug)]
pub enum StorageError {
    /// The requested key does not exist. Updates require the key to be
    /// present.
    NotFound(String),

    /// The key already exists. Creation requires the key to be absent.
    AlreadyExists(String),

    /// Encoding or decoding a stored value failed (e.g. serde).
    Serialization(String),

    /// The backend is unreachable or the connection was lost.
    ConnectionFailed(String),

    /// An unclassified backend error. Inspect the inner error for details.
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(key) => write!(f, "key {key:?} does not exist"),
            Self::AlreadyExists(key) => write!(f, "key {key:?} already exists"),
            Self::Serialization(detail) => write!(f, "serialization error: {detail}"),
            Self::ConnectionFailed(reason) => write!(f, "connection failed: {reason}"),
            Self::Internal(e) => write!(f, "internal storage error: {e}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Internal(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}
