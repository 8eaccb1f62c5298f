//! Postgres-backed range resolution and page reads over the report tables.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{Span, instrument};

use tablepos_core::{RequestContext, within_deadline};
use tablepos_export::{
    ExportError, ExportFilter, ExportPageParams, ExportRange, PageSource, RangeResolver,
};

use super::describe;

/// Reads the append-only report tables named by `ExportType::table()`.
///
/// Every table is expected to carry `id BIGSERIAL`, `store_id UUID`,
/// `business_date DATE`, `stall_id BIGINT NULL` and `status TEXT`.
#[derive(Debug, Clone)]
pub struct PostgresRecordStore {
    pool: Arc<PgPool>,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

/// Append the filter's WHERE clause, including the snapshot bound if set.
fn push_conditions(qb: &mut QueryBuilder<'_, Postgres>, filter: &ExportFilter) {
    qb.push(" WHERE store_id = ");
    qb.push_bind(*filter.store_id.as_uuid());
    qb.push(" AND business_date BETWEEN ");
    qb.push_bind(filter.start_date);
    qb.push(" AND ");
    qb.push_bind(filter.end_date);

    if let Some(stall_id) = filter.stall_id {
        qb.push(" AND stall_id = ");
        qb.push_bind(stall_id);
    }
    if let Some(status) = &filter.status {
        qb.push(" AND status = ");
        qb.push_bind(status.clone());
    }
    if let Some(bound) = filter.id_bound {
        qb.push(" AND id BETWEEN ");
        qb.push_bind(bound.min_id);
        qb.push(" AND ");
        qb.push_bind(bound.max_id);
    }
}

fn range_query(filter: &ExportFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT COUNT(*) AS row_count, MIN(id) AS min_id, MAX(id) AS max_id FROM {}",
        filter.export_type.table()
    ));
    push_conditions(&mut qb, filter);
    qb
}

fn page_query(
    page: &ExportPageParams,
) -> Result<QueryBuilder<'static, Postgres>, ExportError> {
    let limit = i64::try_from(page.pager.limit())
        .map_err(|_| ExportError::params("page size out of range"))?;
    let offset = i64::try_from(page.pager.offset())
        .map_err(|_| ExportError::params("page offset out of range"))?;

    let mut qb = QueryBuilder::new(format!("SELECT id FROM {}", page.filter.export_type.table()));
    push_conditions(&mut qb, &page.filter);
    qb.push(" ORDER BY id ASC LIMIT ");
    qb.push_bind(limit);
    qb.push(" OFFSET ");
    qb.push_bind(offset);
    Ok(qb)
}

#[async_trait]
impl RangeResolver for PostgresRecordStore {
    /// `COUNT`, `MIN` and `MAX` come from one statement, hence one snapshot.
    #[instrument(
        skip(self, ctx, filter),
        fields(
            store_id = %filter.store_id,
            export_type = %filter.export_type,
            row_count = tracing::field::Empty
        ),
        err
    )]
    async fn resolve(
        &self,
        ctx: &RequestContext,
        filter: &ExportFilter,
    ) -> Result<ExportRange, ExportError> {
        let mut qb = range_query(filter);
        let row = within_deadline(ctx, qb.build().fetch_one(&*self.pool))
            .await
            .map_err(|_| ExportError::Timeout("resolve_range"))?
            .map_err(|e| ExportError::store("resolve_range", describe("resolve_range", &e)))?;

        let count: i64 = row
            .try_get("row_count")
            .map_err(|e| ExportError::store("resolve_range", format!("failed to read row_count: {}", e)))?;
        let min_id: Option<i64> = row
            .try_get("min_id")
            .map_err(|e| ExportError::store("resolve_range", format!("failed to read min_id: {}", e)))?;
        let max_id: Option<i64> = row
            .try_get("max_id")
            .map_err(|e| ExportError::store("resolve_range", format!("failed to read max_id: {}", e)))?;

        Span::current().record("row_count", count);
        let count = u64::try_from(count)
            .map_err(|_| ExportError::store("resolve_range", format!("negative count {count}")))?;
        ExportRange::from_aggregate(count, min_id, max_id)
    }
}

#[async_trait]
impl PageSource for PostgresRecordStore {
    #[instrument(
        skip(self, ctx, page),
        fields(export_type = %page.filter.export_type, page = page.pager.page),
        err
    )]
    async fn fetch_page(
        &self,
        ctx: &RequestContext,
        page: &ExportPageParams,
    ) -> Result<Vec<i64>, ExportError> {
        if page.filter.id_bound.is_none() {
            return Err(ExportError::params("page filter carries no snapshot bound"));
        }

        let mut qb = page_query(page)?;
        let rows = within_deadline(ctx, qb.build().fetch_all(&*self.pool))
            .await
            .map_err(|_| ExportError::Timeout("fetch_page"))?
            .map_err(|e| ExportError::store("fetch_page", describe("fetch_page", &e)))?;

        rows.iter()
            .map(|row| {
                row.try_get::<i64, _>("id")
                    .map_err(|e| ExportError::store("fetch_page", format!("failed to read id: {}", e)))
            })
            .collect()
    }
}
