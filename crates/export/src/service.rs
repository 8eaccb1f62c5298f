//! Export endpoint orchestration.

use serde::Serialize;
use tracing::{info, instrument, warn};

use tablepos_core::{Clock, JobId, RequestContext, within_deadline};

use super::chunker::PageChunker;
use super::error::ExportError;
use super::filter::{ExportFilter, ExportRange};
use super::job::{ExportJobBuilder, Requester};
use super::source::RangeResolver;
use super::submitter::ExportSubmitter;

/// What the endpoint reports back once the batch is queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportReceipt {
    pub file_name: String,
    pub range: ExportRange,
    pub total_pages: u64,
    pub job_ids: Vec<JobId>,
}

/// Snapshot → partition → describe → submit.
#[derive(Debug, Clone)]
pub struct ExportService<R, S, C> {
    resolver: R,
    submitter: S,
    chunker: PageChunker,
    builder: ExportJobBuilder<C>,
}

impl<R, S, C> ExportService<R, S, C>
where
    R: RangeResolver,
    S: ExportSubmitter,
    C: Clock,
{
    pub fn new(resolver: R, submitter: S, chunker: PageChunker, clock: C) -> Self {
        Self {
            resolver,
            submitter,
            chunker,
            builder: ExportJobBuilder::new(clock),
        }
    }

    /// Capture the snapshot for `filter`, bounded by the request deadline.
    pub async fn resolve(
        &self,
        ctx: &RequestContext,
        filter: &ExportFilter,
    ) -> Result<ExportRange, ExportError> {
        filter.validate()?;
        within_deadline(ctx, self.resolver.resolve(ctx, filter))
            .await
            .map_err(|_| ExportError::Timeout("resolve_range"))?
    }

    /// Queue a ranged export and return without waiting for any page.
    #[instrument(
        skip(self, ctx, filter),
        fields(
            store_id = %ctx.store_id(),
            export_type = %filter.export_type
        ),
        err
    )]
    pub async fn export(
        &self,
        ctx: &RequestContext,
        filter: ExportFilter,
    ) -> Result<ExportReceipt, ExportError> {
        if filter.store_id != ctx.store_id() {
            return Err(ExportError::params(
                "filter store does not match the requesting store",
            ));
        }

        let range = self.resolve(ctx, &filter).await?;
        if range.is_empty() {
            info!("export filter matched no rows");
            return Err(ExportError::EmptyRange);
        }

        let pages = self.chunker.pages(&filter, &range)?;
        let total_pages = pages.len() as u64;
        let requester = Requester {
            store_id: ctx.store_id(),
            created_by: ctx.user_id(),
        };
        let batch = self.builder.build(pages, filter.export_type, requester)?;

        let job_ids = self
            .submitter
            .submit(ctx, batch.descriptors)
            .await
            .map_err(|e| {
                warn!(error = %e, file_name = %batch.file_name, "export submission rejected");
                ExportError::Submission(e)
            })?;

        info!(
            file_name = %batch.file_name,
            min_id = range.min_id,
            max_id = range.max_id,
            count = range.count,
            total_pages,
            "export queued"
        );

        Ok(ExportReceipt {
            file_name: batch.file_name,
            range,
            total_pages,
            job_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone, Utc};
    use tablepos_core::{ManualClock, StoreId, TenantId, UserId};

    use crate::filter::ExportType;
    use crate::job::ExportJobDescriptor;
    use crate::memory::{InMemoryRecordTable, RecordRow};
    use crate::source::PageSource;
    use crate::submitter::SubmitError;

    /// Submitter that records every batch it accepts.
    #[derive(Default)]
    struct RecordingSubmitter {
        batches: Mutex<Vec<Vec<ExportJobDescriptor>>>,
        reject: bool,
    }

    impl RecordingSubmitter {
        fn rejecting() -> Self {
            Self {
                reject: true,
                ..Default::default()
            }
        }

        fn batches(&self) -> Vec<Vec<ExportJobDescriptor>> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExportSubmitter for RecordingSubmitter {
        async fn submit(
            &self,
            _ctx: &RequestContext,
            jobs: Vec<ExportJobDescriptor>,
        ) -> Result<Vec<JobId>, SubmitError> {
            if self.reject {
                return Err(SubmitError::Rejected("queue full".to_string()));
            }
            let ids = jobs.iter().map(|_| JobId::new()).collect();
            self.batches.lock().unwrap().push(jobs);
            Ok(ids)
        }
    }

    struct SlowResolver;

    #[async_trait]
    impl RangeResolver for SlowResolver {
        async fn resolve(
            &self,
            _ctx: &RequestContext,
            _filter: &ExportFilter,
        ) -> Result<ExportRange, ExportError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ExportRange::empty())
        }
    }

    const T: ExportType = ExportType::ReconciliationList;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 21, 8, 0, 0).unwrap())
    }

    fn ctx(store: StoreId) -> RequestContext {
        RequestContext::new(TenantId::new(), store, UserId::new())
    }

    /// 1,050 matching rows with ids 10..=1200; 141 ids in between belong to
    /// another store.
    fn seeded_table(store: StoreId) -> (Arc<InMemoryRecordTable>, BTreeSet<i64>) {
        let table = Arc::new(InMemoryRecordTable::new());
        let other = StoreId::new();
        let mut expected = BTreeSet::new();
        let mut foreign = 0;

        for id in 10..=1200i64 {
            let matching = !((id - 10) % 8 == 7 && foreign < 141);
            if !matching {
                foreign += 1;
            }
            let row = RecordRow {
                id,
                store_id: if matching { store } else { other },
                business_date: day(1 + (id % 20) as u32),
                stall_id: None,
                status: "settled".to_string(),
            };
            table.insert(T, row).unwrap();
            if matching {
                expected.insert(id);
            }
        }
        assert_eq!(expected.len(), 1050);
        (table, expected)
    }

    async fn read_all_pages(
        source: &impl PageSource,
        ctx: &RequestContext,
        descriptors: &[ExportJobDescriptor],
    ) -> Vec<i64> {
        let mut ids = Vec::new();
        for d in descriptors {
            ids.extend(source.fetch_page(ctx, &d.page_params).await.unwrap());
        }
        ids
    }

    #[tokio::test]
    async fn end_to_end_export_covers_every_row_once() {
        let store = StoreId::new();
        let (table, expected) = seeded_table(store);
        let submitter = Arc::new(RecordingSubmitter::default());
        let service = ExportService::new(
            table.clone(),
            submitter.clone(),
            PageChunker::new(500).unwrap(),
            clock(),
        );
        let ctx = ctx(store);

        let receipt = service
            .export(&ctx, ExportFilter::new(T, store, day(1), day(31)))
            .await
            .unwrap();

        assert_eq!(
            receipt.range,
            ExportRange {
                min_id: *expected.first().unwrap(),
                max_id: *expected.last().unwrap(),
                count: 1050
            }
        );
        assert_eq!(receipt.range.min_id, 10);
        assert_eq!(receipt.total_pages, 3);
        assert_eq!(receipt.job_ids.len(), 3);

        let batches = submitter.batches();
        assert_eq!(batches.len(), 1);
        let descriptors = &batches[0];
        assert!(descriptors.iter().all(|d| d.file_name == receipt.file_name));

        let ids = read_all_pages(table.as_ref(), &ctx, descriptors).await;
        assert_eq!(ids.len(), 1050);
        let unique: BTreeSet<i64> = ids.into_iter().collect();
        assert_eq!(unique, expected);
    }

    #[tokio::test]
    async fn rows_inserted_after_the_snapshot_are_excluded() {
        let store = StoreId::new();
        let (table, expected) = seeded_table(store);
        let submitter = Arc::new(RecordingSubmitter::default());
        let service = ExportService::new(
            table.clone(),
            submitter.clone(),
            PageChunker::new(400).unwrap(),
            clock(),
        );
        let ctx = ctx(store);

        service
            .export(&ctx, ExportFilter::new(T, store, day(1), day(31)))
            .await
            .unwrap();

        // Writes keep landing on the table before any page is read.
        for _ in 0..300 {
            table.append(T, store, day(5), None, "settled").unwrap();
        }

        let batches = submitter.batches();
        let ids = read_all_pages(table.as_ref(), &ctx, &batches[0]).await;
        let unique: BTreeSet<i64> = ids.iter().copied().collect();
        assert_eq!(ids.len(), unique.len());
        assert_eq!(unique, expected);
    }

    #[tokio::test]
    async fn empty_filter_never_reaches_the_submitter() {
        let store = StoreId::new();
        let submitter = Arc::new(RecordingSubmitter::default());
        let service = ExportService::new(
            Arc::new(InMemoryRecordTable::new()),
            submitter.clone(),
            PageChunker::new(100).unwrap(),
            clock(),
        );

        let err = service
            .export(&ctx(store), ExportFilter::new(T, store, day(1), day(2)))
            .await
            .unwrap_err();

        assert_eq!(err, ExportError::EmptyRange);
        assert_eq!(err.to_string(), "nothing to export");
        assert!(submitter.batches().is_empty());
    }

    #[tokio::test]
    async fn invalid_dates_are_params_errors() {
        let store = StoreId::new();
        let service = ExportService::new(
            Arc::new(InMemoryRecordTable::new()),
            Arc::new(RecordingSubmitter::default()),
            PageChunker::new(100).unwrap(),
            clock(),
        );

        let err = service
            .export(&ctx(store), ExportFilter::new(T, store, day(9), day(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Params(_)));
    }

    #[tokio::test]
    async fn foreign_store_filter_is_rejected() {
        let store = StoreId::new();
        let (table, _) = seeded_table(store);
        let service = ExportService::new(
            table,
            Arc::new(RecordingSubmitter::default()),
            PageChunker::new(100).unwrap(),
            clock(),
        );

        let err = service
            .export(&ctx(StoreId::new()), ExportFilter::new(T, store, day(1), day(31)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Params(_)));
    }

    #[tokio::test]
    async fn submission_failure_is_wrapped() {
        let store = StoreId::new();
        let (table, _) = seeded_table(store);
        let service = ExportService::new(
            table,
            Arc::new(RecordingSubmitter::rejecting()),
            PageChunker::new(500).unwrap(),
            clock(),
        );

        let err = service
            .export(&ctx(store), ExportFilter::new(T, store, day(1), day(31)))
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::Submission(SubmitError::Rejected(_))));
        assert_eq!(
            err.to_string(),
            "failed to submit data export: job batch rejected: queue full"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_resolution_times_out() {
        let store = StoreId::new();
        let submitter = Arc::new(RecordingSubmitter::default());
        let service = ExportService::new(
            SlowResolver,
            submitter.clone(),
            PageChunker::new(100).unwrap(),
            clock(),
        );
        let ctx = ctx(store).with_timeout(Duration::from_millis(250));

        let err = service
            .export(&ctx, ExportFilter::new(T, store, day(1), day(2)))
            .await
            .unwrap_err();

        assert_eq!(err, ExportError::Timeout("resolve_range"));
        assert!(submitter.batches().is_empty());
    }
}
