//! Export job descriptors and file naming.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use tablepos_core::{Clock, StoreId, UserId};

use super::error::ExportError;
use super::filter::{ExportFilter, ExportPageParams, ExportType};

/// Who asked for the export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub store_id: StoreId,
    pub created_by: UserId,
}

/// File name shared by every page of one export.
///
/// Rendered as `{start:%Y-%m-%d}-{end:%Y-%m-%d}_{unix_seconds}_{label}.xlsx`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFileName {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub unix_seconds: i64,
    pub label: String,
}

impl ExportFileName {
    pub fn for_filter(filter: &ExportFilter, unix_seconds: i64) -> Self {
        Self {
            start_date: filter.start_date,
            end_date: filter.end_date,
            unix_seconds,
            label: filter.export_type.label().to_string(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl core::fmt::Display for ExportFileName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}-{}_{}_{}.xlsx",
            self.start_date.format("%Y-%m-%d"),
            self.end_date.format("%Y-%m-%d"),
            self.unix_seconds,
            self.label
        )
    }
}

/// One page of work handed to the job subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportJobDescriptor {
    pub requester_store_id: StoreId,
    pub export_type: ExportType,
    pub page_params: ExportPageParams,
    pub file_name: String,
    pub created_by: UserId,
}

/// Descriptors of one logical export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportBatch {
    pub file_name: String,
    pub descriptors: Vec<ExportJobDescriptor>,
}

/// Assembles per-page descriptors.
#[derive(Debug, Clone)]
pub struct ExportJobBuilder<C> {
    clock: C,
}

impl<C: Clock> ExportJobBuilder<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    /// Name the export from the filter's date range and the current time.
    pub fn file_name(&self, filter: &ExportFilter) -> ExportFileName {
        ExportFileName::for_filter(filter, self.clock.now().timestamp())
    }

    pub fn build(
        &self,
        pages: Vec<ExportPageParams>,
        export_type: ExportType,
        requester: Requester,
    ) -> Result<ExportBatch, ExportError> {
        let first = pages
            .first()
            .ok_or_else(|| ExportError::params("export has no pages"))?;
        let file_name = self.file_name(&first.filter).with_label(export_type.label());
        self.build_named(pages, export_type, requester, &file_name)
    }

    /// Like `build`, with a caller-chosen name.
    pub fn build_named(
        &self,
        pages: Vec<ExportPageParams>,
        export_type: ExportType,
        requester: Requester,
        file_name: &ExportFileName,
    ) -> Result<ExportBatch, ExportError> {
        if pages.is_empty() {
            return Err(ExportError::params("export has no pages"));
        }
        if let Some(p) = pages.iter().find(|p| p.filter.export_type != export_type) {
            return Err(ExportError::params(format!(
                "page {} targets {} but the export is {}",
                p.pager.page, p.filter.export_type, export_type
            )));
        }

        let file_name = file_name.to_string();
        let descriptors = pages
            .into_iter()
            .map(|page_params| ExportJobDescriptor {
                requester_store_id: requester.store_id,
                export_type,
                page_params,
                file_name: file_name.clone(),
                created_by: requester.created_by,
            })
            .collect();

        Ok(ExportBatch {
            file_name,
            descriptors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tablepos_core::ManualClock;

    use crate::chunker::PageChunker;
    use crate::filter::ExportRange;

    fn filter() -> ExportFilter {
        ExportFilter::new(
            ExportType::ReconciliationDetail,
            StoreId::new(),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 21).unwrap(),
        )
    }

    fn builder() -> ExportJobBuilder<ManualClock> {
        // 2024-05-21T08:00:00Z
        ExportJobBuilder::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 21, 8, 0, 0).unwrap(),
        ))
    }

    fn requester() -> Requester {
        Requester {
            store_id: StoreId::new(),
            created_by: UserId::new(),
        }
    }

    #[test]
    fn file_name_format_is_exact() {
        let name = ExportFileName {
            start_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 5, 21).unwrap(),
            unix_seconds: 1_716_278_400,
            label: "reconciliation-records".to_string(),
        };
        assert_eq!(
            name.to_string(),
            "2024-05-01-2024-05-21_1716278400_reconciliation-records.xlsx"
        );
    }

    #[test]
    fn all_pages_share_one_file_name() {
        let range = ExportRange {
            min_id: 1,
            max_id: 250,
            count: 250,
        };
        let pages = PageChunker::new(100).unwrap().pages(&filter(), &range).unwrap();
        let requester = requester();

        let batch = builder()
            .build(pages, ExportType::ReconciliationDetail, requester)
            .unwrap();

        assert_eq!(
            batch.file_name,
            "2024-05-01-2024-05-21_1716278400_reconciliation-details.xlsx"
        );
        assert_eq!(batch.descriptors.len(), 3);
        for (i, d) in batch.descriptors.iter().enumerate() {
            assert_eq!(d.file_name, batch.file_name);
            assert_eq!(d.page_params.pager.page, i as u64 + 1);
            assert_eq!(d.requester_store_id, requester.store_id);
            assert_eq!(d.created_by, requester.created_by);
        }
    }

    #[test]
    fn empty_page_list_is_a_params_error() {
        let err = builder()
            .build(vec![], ExportType::ReconciliationList, requester())
            .unwrap_err();
        assert!(matches!(err, ExportError::Params(_)));
    }

    #[test]
    fn mismatched_export_type_is_rejected() {
        let range = ExportRange {
            min_id: 1,
            max_id: 1,
            count: 1,
        };
        let pages = PageChunker::new(100).unwrap().pages(&filter(), &range).unwrap();
        let err = builder()
            .build(pages, ExportType::PointSettlementList, requester())
            .unwrap_err();
        assert!(matches!(err, ExportError::Params(_)));
    }
}
