//! Error Types
//!
//! Errors raised by entity and schema stores.

use serde::Serialize;
use thiserror::Error;

use crate::kind::AnyTypeKind;

/// Error raised by the store seams.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreError {
    /// Requested entity was not found.
    #[error("{kind} not found: {key}")]
    NotFound { kind: AnyTypeKind, key: String },

    /// A unique constraint would be violated.
    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: AnyTypeKind, name: String },

    /// Input validation failure.
    #[error("Validation error on field '{field}': {message}")]
    ValidationError { field: String, message: String },

    /// Backend failure.
    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl CoreError {
    pub fn not_found(kind: AnyTypeKind, key: impl ToString) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

/// Result type for store operations.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
