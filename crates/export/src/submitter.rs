//! Hand-off to the job subsystem.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use tablepos_core::{JobId, RequestContext};

use super::job::ExportJobDescriptor;

/// Rejection from the job subsystem.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("job batch rejected: {0}")]
    Rejected(String),
    #[error("job queue unavailable: {0}")]
    Unavailable(String),
}

/// Accepts export jobs and runs them outside the request.
///
/// A batch is all-or-nothing: on error no job of the batch may run. Returned ids
/// are opaque to this pipeline.
#[async_trait]
pub trait ExportSubmitter: Send + Sync {
    async fn submit(
        &self,
        ctx: &RequestContext,
        jobs: Vec<ExportJobDescriptor>,
    ) -> Result<Vec<JobId>, SubmitError>;
}

#[async_trait]
impl<S> ExportSubmitter for Arc<S>
where
    S: ExportSubmitter + ?Sized,
{
    async fn submit(
        &self,
        ctx: &RequestContext,
        jobs: Vec<ExportJobDescriptor>,
    ) -> Result<Vec<JobId>, SubmitError> {
        (**self).submit(ctx, jobs).await
    }
}
