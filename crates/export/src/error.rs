//! Export pipeline errors.

use thiserror::Error;

use super::submitter::SubmitError;

/// Export failure surfaced to the HTTP boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExportError {
    /// Caller supplied an invalid filter, date range or page size.
    #[error("{0}")]
    Params(String),

    /// The filter matched no rows; user-facing, not a system failure.
    #[error("nothing to export")]
    EmptyRange,

    /// The request deadline elapsed during resolution.
    #[error("export request timed out during {0}")]
    Timeout(&'static str),

    /// The record store failed while resolving the range or reading a page.
    #[error("record store error in {operation}: {message}")]
    Store {
        operation: &'static str,
        message: String,
    },

    /// The job subsystem rejected the batch.
    #[error("failed to submit data export: {0}")]
    Submission(#[source] SubmitError),
}

impl ExportError {
    pub fn params(msg: impl Into<String>) -> Self {
        Self::Params(msg.into())
    }

    pub fn store(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Store {
            operation,
            message: message.into(),
        }
    }
}

impl From<SubmitError> for ExportError {
    fn from(err: SubmitError) -> Self {
        Self::Submission(err)
    }
}
