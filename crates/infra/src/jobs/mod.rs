//! Background job queue for export pages.
//!
//! ## Design
//!
//! - Jobs are tenant-scoped and typed (`JobKind::DataExport`)
//! - A submitted export batch is enqueued all-or-nothing
//! - Retry policy with backoff, dead-letter queue after the last attempt
//!
//! ## Components
//!
//! - `Job`: job envelope with payload and metadata
//! - `JobStore`: persistence for jobs (in-memory here)
//! - `JobQueueSubmitter`: the `ExportSubmitter` the export endpoint uses
//! - `ExportJobRunner`: claims export jobs, reads the page, calls a `PageRenderer`

pub mod runner;
pub mod store;
pub mod submitter;
pub mod types;

pub use runner::{
    ExportJobRunner, PageRenderer, RenderError, RunOutcome, RunnerConfig, RunnerHandle,
    RunnerStats, TracingPageRenderer,
};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use submitter::JobQueueSubmitter;
pub use types::{BackoffStrategy, DeadLetterEntry, Job, JobKind, JobStatus, RetryPolicy};
