//! Input validation errors shared by the pipeline crates.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Rejected input: a malformed identifier, scope key or calendar setting.
///
/// Store and transport failures have their own error types
/// (`SequenceStoreError`, `ExportError::Store`, `JobStoreError`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
