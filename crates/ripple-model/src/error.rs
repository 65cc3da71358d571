//! Error types for observable records.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A validator's description of why a candidate state was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// The offending attribute, if the failure is about a single one.
    pub key: Option<String>,
    /// Human-readable explanation.
    pub message: String,
}

impl ValidationError {
    /// Create a failure that concerns the record as a whole.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            key: None,
            message: message.into(),
        }
    }

    /// Create a failure about one attribute.
    pub fn for_key(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}: {}", key, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Errors reported by a sync backend.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No backend is configured for the record's kind.
    #[error("No sync backend configured")]
    Unavailable,

    /// The backend has no record with this id.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// The request cannot be served for this record.
    #[error("Invalid sync request: {0}")]
    InvalidRequest(String),

    /// Backend-specific failure.
    #[error("Sync failed: {0}")]
    Backend(String),
}

/// Errors produced by record operations.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The validator rejected the candidate attributes. Nothing was applied.
    #[error("Validation failed: {0}")]
    Invalid(#[from] ValidationError),

    /// Persistence through the sync backend failed.
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// The operation needs a record the backend knows about.
    #[error("Record {0} has not been persisted")]
    NotPersisted(String),
}

impl ModelError {
    /// The validation failure, if this is one.
    pub fn validation_error(&self) -> Option<&ValidationError> {
        match self {
            ModelError::Invalid(error) => Some(error),
            _ => None,
        }
    }
}

/// Result type alias for record operations.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Result type alias for sync backends.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
