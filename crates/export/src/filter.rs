//! Filter, range and pager value objects.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use tablepos_core::StoreId;

use super::error::ExportError;

/// Longest date span a single export may cover (inclusive days).
pub const MAX_EXPORT_SPAN_DAYS: i64 = 366;

/// Report datasets that can be exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportType {
    ReconciliationList,
    ReconciliationDetail,
    PointSettlementList,
    PointSettlementDetail,
}

impl ExportType {
    pub const ALL: [ExportType; 4] = [
        ExportType::ReconciliationList,
        ExportType::ReconciliationDetail,
        ExportType::PointSettlementList,
        ExportType::PointSettlementDetail,
    ];

    /// Stable identifier used in URLs and job payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            ExportType::ReconciliationList => "reconciliation_list",
            ExportType::ReconciliationDetail => "reconciliation_detail",
            ExportType::PointSettlementList => "point_settlement_list",
            ExportType::PointSettlementDetail => "point_settlement_detail",
        }
    }

    /// Append-only source table (ids are `BIGSERIAL`).
    pub fn table(self) -> &'static str {
        match self {
            ExportType::ReconciliationList => "reconciliation_records",
            ExportType::ReconciliationDetail => "reconciliation_record_details",
            ExportType::PointSettlementList => "point_settlement_records",
            ExportType::PointSettlementDetail => "point_settlement_record_details",
        }
    }

    /// Human label that ends the export file name.
    pub fn label(self) -> &'static str {
        match self {
            ExportType::ReconciliationList => "reconciliation-records",
            ExportType::ReconciliationDetail => "reconciliation-details",
            ExportType::PointSettlementList => "point-settlement-records",
            ExportType::PointSettlementDetail => "point-settlement-details",
        }
    }
}

impl core::fmt::Display for ExportType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ExportType {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExportType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ExportError::params(format!("unknown export type: {s}")))
    }
}

/// Closed id interval `[min_id, max_id]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdBound {
    pub min_id: i64,
    pub max_id: i64,
}

impl IdBound {
    pub fn contains(&self, id: i64) -> bool {
        self.min_id <= id && id <= self.max_id
    }
}

/// Row selection for one export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFilter {
    pub export_type: ExportType,
    pub store_id: StoreId,
    /// Inclusive business-date range.
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stall_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Snapshot bound; `None` until the range has been resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_bound: Option<IdBound>,
}

impl ExportFilter {
    pub fn new(
        export_type: ExportType,
        store_id: StoreId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            export_type,
            store_id,
            start_date,
            end_date,
            stall_id: None,
            status: None,
            id_bound: None,
        }
    }

    pub fn with_stall(mut self, stall_id: i64) -> Self {
        self.stall_id = Some(stall_id);
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Reject filters the record store should never see.
    pub fn validate(&self) -> Result<(), ExportError> {
        if self.start_date > self.end_date {
            return Err(ExportError::params(format!(
                "start date {} is after end date {}",
                self.start_date, self.end_date
            )));
        }

        let span = (self.end_date - self.start_date).num_days() + 1;
        if span > MAX_EXPORT_SPAN_DAYS {
            return Err(ExportError::params(format!(
                "date range spans {span} days, at most {MAX_EXPORT_SPAN_DAYS} allowed"
            )));
        }

        if matches!(&self.status, Some(s) if s.trim().is_empty()) {
            return Err(ExportError::params("status must not be blank"));
        }

        if let Some(bound) = self.id_bound {
            if bound.min_id > bound.max_id {
                return Err(ExportError::params("id bound is inverted"));
            }
        }

        Ok(())
    }

    /// Same filter, narrowed to the snapshot's id interval.
    pub fn bounded(&self, range: &ExportRange) -> Self {
        Self {
            id_bound: range.bound(),
            ..self.clone()
        }
    }
}

/// Snapshot of the rows matching a filter at resolution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRange {
    pub min_id: i64,
    pub max_id: i64,
    pub count: u64,
}

impl ExportRange {
    pub fn empty() -> Self {
        Self {
            min_id: 0,
            max_id: 0,
            count: 0,
        }
    }

    /// Assemble a range from one aggregate row (`COUNT`, `MIN`, `MAX`).
    pub fn from_aggregate(
        count: u64,
        min_id: Option<i64>,
        max_id: Option<i64>,
    ) -> Result<Self, ExportError> {
        if count == 0 {
            return Ok(Self::empty());
        }
        match (min_id, max_id) {
            (Some(min_id), Some(max_id)) if min_id <= max_id => Ok(Self {
                min_id,
                max_id,
                count,
            }),
            _ => Err(ExportError::store(
                "resolve_range",
                format!("inconsistent snapshot: count={count} min={min_id:?} max={max_id:?}"),
            )),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn bound(&self) -> Option<IdBound> {
        (!self.is_empty()).then_some(IdBound {
            min_id: self.min_id,
            max_id: self.max_id,
        })
    }
}

/// 1-indexed page of a bounded filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pager {
    pub page: u64,
    pub size: u64,
}

impl Pager {
    /// Rows to skip when reading this page ordered by id ascending.
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.size)
    }

    pub fn limit(&self) -> u64 {
        self.size
    }
}

/// Everything a renderer needs to read one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportPageParams {
    pub filter: ExportFilter,
    pub pager: Pager,
}
