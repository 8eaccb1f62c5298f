//! Record-store seams: range snapshots and page reads.

use std::sync::Arc;

use async_trait::async_trait;

use tablepos_core::RequestContext;

use super::error::ExportError;
use super::filter::{ExportFilter, ExportPageParams, ExportRange};

/// Captures the id interval and cardinality of a filter's rows.
///
/// `count`, `min_id` and `max_id` must come from one consistent read; three
/// separate queries could each observe a different set of concurrent inserts.
#[async_trait]
pub trait RangeResolver: Send + Sync {
    async fn resolve(
        &self,
        ctx: &RequestContext,
        filter: &ExportFilter,
    ) -> Result<ExportRange, ExportError>;
}

/// Reads the ids of one page: bounded filter, ordered by id ascending,
/// `OFFSET (page-1)*size LIMIT size`.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(
        &self,
        ctx: &RequestContext,
        page: &ExportPageParams,
    ) -> Result<Vec<i64>, ExportError>;
}

#[async_trait]
impl<R> RangeResolver for Arc<R>
where
    R: RangeResolver + ?Sized,
{
    async fn resolve(
        &self,
        ctx: &RequestContext,
        filter: &ExportFilter,
    ) -> Result<ExportRange, ExportError> {
        (**self).resolve(ctx, filter).await
    }
}

#[async_trait]
impl<P> PageSource for Arc<P>
where
    P: PageSource + ?Sized,
{
    async fn fetch_page(
        &self,
        ctx: &RequestContext,
        page: &ExportPageParams,
    ) -> Result<Vec<i64>, ExportError> {
        (**self).fetch_page(ctx, page).await
    }
}
