//! `ExportSubmitter` backed by the job queue.

use async_trait::async_trait;
use tracing::{debug, instrument};

use tablepos_core::{JobId, RequestContext};
use tablepos_export::{ExportJobDescriptor, ExportSubmitter, SubmitError};

use super::store::{JobStore, JobStoreError};
use super::types::{Job, RetryPolicy};

/// Turns export descriptors into tenant-scoped `DataExport` jobs.
///
/// The whole batch goes through one `enqueue_batch`, so a rejected batch leaves
/// no job behind.
#[derive(Debug, Clone)]
pub struct JobQueueSubmitter<S> {
    store: S,
    retry_policy: RetryPolicy,
}

impl<S: JobStore> JobQueueSubmitter<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

fn map_store_error(err: JobStoreError) -> SubmitError {
    match err {
        JobStoreError::Storage(msg) => SubmitError::Unavailable(msg),
        other => SubmitError::Rejected(other.to_string()),
    }
}

#[async_trait]
impl<S: JobStore> ExportSubmitter for JobQueueSubmitter<S> {
    #[instrument(
        skip(self, ctx, jobs),
        fields(tenant_id = %ctx.tenant_id(), jobs = jobs.len()),
        err
    )]
    async fn submit(
        &self,
        ctx: &RequestContext,
        jobs: Vec<ExportJobDescriptor>,
    ) -> Result<Vec<JobId>, SubmitError> {
        if jobs.is_empty() {
            return Err(SubmitError::Rejected("empty export batch".to_string()));
        }

        let batch = jobs
            .iter()
            .map(|d| {
                Job::data_export(ctx.tenant_id(), d)
                    .map(|job| job.with_retry_policy(self.retry_policy.clone()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SubmitError::Rejected(format!("unencodable export descriptor: {}", e)))?;

        let ids = self.store.enqueue_batch(batch).map_err(map_store_error)?;
        debug!(count = ids.len(), "export jobs enqueued");
        Ok(ids)
    }
}
