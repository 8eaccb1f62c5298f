//! In-memory append-only record tables for tests/dev.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use tablepos_core::{RequestContext, StoreId, within_deadline};

use super::error::ExportError;
use super::filter::{ExportFilter, ExportPageParams, ExportRange, ExportType};
use super::source::{PageSource, RangeResolver};

/// The columns an export filter can select on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRow {
    pub id: i64,
    pub store_id: StoreId,
    pub business_date: NaiveDate,
    pub stall_id: Option<i64>,
    pub status: String,
}

/// One append-only table per export type, ids strictly increasing.
///
/// Resolution and page reads each hold the read lock for their whole scan, so
/// every call observes one consistent table state.
#[derive(Debug, Default)]
pub struct InMemoryRecordTable {
    tables: RwLock<HashMap<ExportType, BTreeMap<i64, RecordRow>>>,
}

impl InMemoryRecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row with an explicit id; ids must keep increasing.
    pub fn insert(&self, export_type: ExportType, row: RecordRow) -> Result<i64, ExportError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| ExportError::store("insert", "lock poisoned"))?;
        let table = tables.entry(export_type).or_default();

        if let Some((&last, _)) = table.last_key_value() {
            if row.id <= last {
                return Err(ExportError::store(
                    "insert",
                    format!("id {} is not above current max {last}", row.id),
                ));
            }
        }

        let id = row.id;
        table.insert(id, row);
        Ok(id)
    }

    /// Insert a row with the next id (like a `BIGSERIAL` default).
    pub fn append(
        &self,
        export_type: ExportType,
        store_id: StoreId,
        business_date: NaiveDate,
        stall_id: Option<i64>,
        status: impl Into<String>,
    ) -> Result<i64, ExportError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| ExportError::store("append", "lock poisoned"))?;
        let table = tables.entry(export_type).or_default();

        let id = table.last_key_value().map(|(&k, _)| k + 1).unwrap_or(1);
        table.insert(
            id,
            RecordRow {
                id,
                store_id,
                business_date,
                stall_id,
                status: status.into(),
            },
        );
        Ok(id)
    }

    pub fn len(&self, export_type: ExportType) -> usize {
        self.tables
            .read()
            .map(|t| t.get(&export_type).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }
}

fn admits(filter: &ExportFilter, row: &RecordRow) -> bool {
    row.store_id == filter.store_id
        && filter.start_date <= row.business_date
        && row.business_date <= filter.end_date
        && filter.stall_id.map_or(true, |s| row.stall_id == Some(s))
        && filter.status.as_deref().map_or(true, |s| row.status == s)
        && filter.id_bound.map_or(true, |b| b.contains(row.id))
}

impl InMemoryRecordTable {
    fn scan_range(&self, filter: &ExportFilter) -> Result<ExportRange, ExportError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| ExportError::store("resolve_range", "lock poisoned"))?;
        let Some(table) = tables.get(&filter.export_type) else {
            return Ok(ExportRange::empty());
        };

        let mut count = 0u64;
        let mut min_id = None;
        let mut max_id = None;
        for row in table.values().filter(|r| admits(filter, r)) {
            count += 1;
            min_id.get_or_insert(row.id);
            max_id = Some(row.id);
        }

        ExportRange::from_aggregate(count, min_id, max_id)
    }

    fn scan_page(&self, page: &ExportPageParams) -> Result<Vec<i64>, ExportError> {
        if page.filter.id_bound.is_none() {
            return Err(ExportError::params("page filter carries no snapshot bound"));
        }

        let tables = self
            .tables
            .read()
            .map_err(|_| ExportError::store("fetch_page", "lock poisoned"))?;
        let Some(table) = tables.get(&page.filter.export_type) else {
            return Ok(vec![]);
        };

        let offset = usize::try_from(page.pager.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.pager.limit()).unwrap_or(usize::MAX);
        Ok(table
            .values()
            .filter(|r| admits(&page.filter, r))
            .skip(offset)
            .take(limit)
            .map(|r| r.id)
            .collect())
    }
}

#[async_trait]
impl RangeResolver for InMemoryRecordTable {
    async fn resolve(
        &self,
        ctx: &RequestContext,
        filter: &ExportFilter,
    ) -> Result<ExportRange, ExportError> {
        within_deadline(ctx, async { self.scan_range(filter) })
            .await
            .map_err(|_| ExportError::Timeout("resolve_range"))?
    }
}

#[async_trait]
impl PageSource for InMemoryRecordTable {
    async fn fetch_page(
        &self,
        ctx: &RequestContext,
        page: &ExportPageParams,
    ) -> Result<Vec<i64>, ExportError> {
        within_deadline(ctx, async { self.scan_page(page) })
            .await
            .map_err(|_| ExportError::Timeout("fetch_page"))?
    }
}
