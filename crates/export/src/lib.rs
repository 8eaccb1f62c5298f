//! Range-snapshot export pipeline.
//!
//! ## Flow
//!
//! 1. `RangeResolver` captures `{min_id, max_id, count}` for a filter in one read
//! 2. `PageChunker` splits the bounded filter into 1-indexed pages
//! 3. `ExportJobBuilder` turns pages into descriptors sharing one file name
//! 4. `ExportSubmitter` takes the batch and returns immediately
//!
//! `ExportService` drives the four steps for an export endpoint. Rows inserted
//! after step 1 get ids above `max_id` and never leak into the pages.

pub mod chunker;
pub mod error;
pub mod filter;
pub mod job;
pub mod memory;
pub mod service;
pub mod source;
pub mod submitter;

pub use chunker::{PageChunker, total_pages};
pub use error::ExportError;
pub use filter::{ExportFilter, ExportPageParams, ExportRange, ExportType, IdBound, Pager};
pub use job::{ExportBatch, ExportFileName, ExportJobBuilder, ExportJobDescriptor, Requester};
pub use memory::{InMemoryRecordTable, RecordRow};
pub use service::{ExportReceipt, ExportService};
pub use source::{PageSource, RangeResolver};
pub use submitter::{ExportSubmitter, SubmitError};
