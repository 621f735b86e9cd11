//! Error types for the object store

use thiserror::Error;
use warden_types::{Kind, ObjectKey};

/// Object store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object does not exist
    #[error("Not found: {kind} {key}")]
    NotFound { kind: Kind, key: ObjectKey },

    /// Create of an object that already exists
    #[error("Already exists: {kind} {key}")]
    AlreadyExists { kind: Kind, key: ObjectKey },

    /// Write carried a stale resource version
    #[error("Conflict: {kind} {key} was modified concurrently")]
    Conflict { kind: Kind, key: ObjectKey },

    /// Object could not be converted to or from its stored form
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend failure (transient)
    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
