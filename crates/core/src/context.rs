//! Per-request context carried through the pipeline.
//!
//! Tenant/store/user resolution happens at the HTTP edge; everything below it
//! only reads the resolved identities and the request deadline.

use std::future::Future;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::id::{StoreId, TenantId, UserId};

/// Resolved request identity plus an optional deadline.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RequestContext {
    tenant_id: TenantId,
    store_id: StoreId,
    user_id: UserId,
    deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(tenant_id: TenantId, store_id: StoreId, user_id: UserId) -> Self {
        Self {
            tenant_id,
            store_id,
            user_id,
            deadline: None,
        }
    }

    /// Attach an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Attach a deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline (`None` when the request is unbounded).
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.remaining(), Some(left) if left.is_zero())
    }
}

/// The request deadline elapsed before the operation completed.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("deadline exceeded")]
pub struct DeadlineExceeded;

/// Run `fut` bounded by the context deadline.
///
/// An already-expired deadline fails without polling `fut`, so a fast store can
/// never hand back a value after the caller gave up.
pub async fn within_deadline<F, T>(ctx: &RequestContext, fut: F) -> Result<T, DeadlineExceeded>
where
    F: Future<Output = T>,
{
    match ctx.remaining() {
        None => Ok(fut.await),
        Some(left) if left.is_zero() => Err(DeadlineExceeded),
        Some(left) => tokio::time::timeout(left, fut)
            .await
            .map_err(|_| DeadlineExceeded),
    }
}
