//! `tablepos-core`: shared building blocks for the sequence and export pipeline.
//!
//! This crate contains **pure** primitives (identifiers, errors, request context,
//! clocks). Storage and transport concerns live in `tablepos-infra`.

pub mod clock;
pub mod context;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{DeadlineExceeded, RequestContext, within_deadline};
pub use error::{DomainError, DomainResult};
pub use id::{JobId, StoreId, TenantId, UserId};
