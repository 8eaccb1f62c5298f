//! Background runner for export jobs.

use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use tablepos_core::{JobId, RequestContext, TenantId};
use tablepos_export::{ExportJobDescriptor, PageSource};

use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobStatus};

/// Renderer failure; the job is retried per its policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("page render failed: {0}")]
pub struct RenderError(pub String);

/// Consumes one page of an export.
///
/// The file format is the renderer's business; it receives the descriptor and
/// the ids of the page in ascending order.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, job: &ExportJobDescriptor, ids: &[i64]) -> Result<(), RenderError>;
}

#[async_trait]
impl<R> PageRenderer for Arc<R>
where
    R: PageRenderer + ?Sized,
{
    async fn render(&self, job: &ExportJobDescriptor, ids: &[i64]) -> Result<(), RenderError> {
        (**self).render(job, ids).await
    }
}

/// Renderer that only reports each page it is handed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPageRenderer;

#[async_trait]
impl PageRenderer for TracingPageRenderer {
    async fn render(&self, job: &ExportJobDescriptor, ids: &[i64]) -> Result<(), RenderError> {
        info!(
            file_name = %job.file_name,
            page = job.page_params.pager.page,
            rows = ids.len(),
            "export page ready"
        );
        Ok(())
    }
}

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// How often to poll when the queue is empty
    pub poll_interval: Duration,
    /// Deadline for reading one page
    pub page_timeout: Duration,
    pub name: String,
    pub tenant_id: Option<TenantId>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            page_timeout: Duration::from_secs(30),
            name: "export-runner".to_string(),
            tenant_id: None,
        }
    }
}

/// What happened to one claimed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RunnerStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_dead_lettered: u64,
    pub uptime_secs: u64,
}

impl RunnerStats {
    fn record(&mut self, status: &JobStatus) {
        self.jobs_processed += 1;
        match status {
            JobStatus::Completed => self.jobs_succeeded += 1,
            JobStatus::DeadLettered { .. } => {
                self.jobs_failed += 1;
                self.jobs_dead_lettered += 1;
            }
            _ => self.jobs_failed += 1,
        }
    }
}

/// Handle to a spawned runner.
#[derive(Debug)]
pub struct RunnerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<RunnerStats>>,
}

impl RunnerHandle {
    /// Request graceful shutdown and wait for the runner thread.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> RunnerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Claims `DataExport` jobs, reads their page and hands it to the renderer.
#[derive(Debug, Clone)]
pub struct ExportJobRunner<S, P, R> {
    store: S,
    source: P,
    renderer: R,
    page_timeout: Duration,
}

impl<S, P, R> ExportJobRunner<S, P, R>
where
    S: JobStore + 'static,
    P: PageSource + 'static,
    R: PageRenderer + 'static,
{
    pub fn new(store: S, source: P, renderer: R) -> Self {
        Self {
            store,
            source,
            renderer,
            page_timeout: RunnerConfig::default().page_timeout,
        }
    }

    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    /// Claim and run one job. `Ok(None)` when nothing is ready.
    pub async fn run_next(
        &self,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<RunOutcome>, JobStoreError> {
        let Some(mut job) = self.store.claim_next(tenant_id)? else {
            return Ok(None);
        };
        debug!(job_id = %job.id, kind = job.kind.type_name(), attempt = job.attempt, "claimed job");

        let descriptor = match job.export_descriptor() {
            Ok(d) => d,
            Err(e) => {
                // Retrying cannot fix a payload that does not decode.
                let reason = format!("undecodable export payload: {}", e);
                warn!(job_id = %job.id, error = %reason, "job dead-lettered");
                let job_id = job.id;
                let attempts = job.attempt;
                self.store.dead_letter(job, reason.clone())?;
                return Ok(Some(RunOutcome {
                    job_id,
                    status: JobStatus::DeadLettered {
                        error: reason,
                        attempts,
                    },
                }));
            }
        };

        let started = Utc::now();
        match self.render(&job, &descriptor).await {
            Ok(rows) => {
                job.mark_completed(started);
                self.store.update(&job)?;
                debug!(job_id = %job.id, rows, "job completed");
            }
            Err(error) => {
                job.mark_failed(error.clone(), started);
                self.store.update(&job)?;
                if matches!(job.status, JobStatus::DeadLettered { .. }) {
                    warn!(job_id = %job.id, error = %error, "job dead-lettered");
                    self.store.dead_letter(job.clone(), error)?;
                } else {
                    debug!(job_id = %job.id, error = %error, status = ?job.status, "job failed");
                }
            }
        }

        Ok(Some(RunOutcome {
            job_id: job.id,
            status: job.status,
        }))
    }

    async fn render(&self, job: &Job, descriptor: &ExportJobDescriptor) -> Result<usize, String> {
        let ctx = RequestContext::new(
            job.tenant_id,
            descriptor.requester_store_id,
            descriptor.created_by,
        )
        .with_timeout(self.page_timeout);

        let ids = self
            .source
            .fetch_page(&ctx, &descriptor.page_params)
            .await
            .map_err(|e| e.to_string())?;
        self.renderer
            .render(descriptor, &ids)
            .await
            .map_err(|e| e.to_string())?;
        Ok(ids.len())
    }

    /// Run on a dedicated thread, driving async work through `handle`.
    pub fn spawn(self, config: RunnerConfig, handle: Handle) -> std::io::Result<RunnerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(RunnerStats::default()));
        let stats_clone = stats.clone();
        let runner = self.with_page_timeout(config.page_timeout);

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || runner_loop(runner, config, handle, shutdown_rx, stats_clone))?;

        Ok(RunnerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

fn runner_loop<S, P, R>(
    runner: ExportJobRunner<S, P, R>,
    config: RunnerConfig,
    handle: Handle,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<RunnerStats>>,
) where
    S: JobStore + 'static,
    P: PageSource + 'static,
    R: PageRenderer + 'static,
{
    info!(runner = %config.name, "export runner started");
    let start_time = Instant::now();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        let outcome = handle.block_on(runner.run_next(config.tenant_id));
        if let Ok(mut s) = stats.lock() {
            s.uptime_secs = start_time.elapsed().as_secs();
            if let Ok(Some(o)) = &outcome {
                s.record(&o.status);
            }
        }

        match outcome {
            Ok(Some(_)) => {}
            Ok(None) => thread::sleep(config.poll_interval),
            Err(e) => {
                error!(runner = %config.name, error = %e, "failed to run export job");
                thread::sleep(config.poll_interval);
            }
        }
    }

    info!(runner = %config.name, "export runner stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::{NaiveDate, TimeZone};
    use tablepos_core::{ManualClock, StoreId, UserId};
    use tablepos_export::{
        ExportFilter, ExportService, ExportType, InMemoryRecordTable, PageChunker,
    };

    use crate::jobs::{InMemoryJobStore, JobQueueSubmitter, RetryPolicy};

    /// Collects every page it renders.
    #[derive(Default)]
    struct CollectingRenderer {
        pages: Mutex<Vec<(u64, Vec<i64>)>>,
    }

    #[async_trait]
    impl PageRenderer for CollectingRenderer {
        async fn render(&self, job: &ExportJobDescriptor, ids: &[i64]) -> Result<(), RenderError> {
            self.pages
                .lock()
                .unwrap()
                .push((job.page_params.pager.page, ids.to_vec()));
            Ok(())
        }
    }

    /// Fails the first `failures` calls.
    struct FlakyRenderer {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl PageRenderer for FlakyRenderer {
        async fn render(&self, _job: &ExportJobDescriptor, _ids: &[i64]) -> Result<(), RenderError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(RenderError("disk full".to_string()));
            }
            Ok(())
        }
    }

    const T: ExportType = ExportType::ReconciliationList;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    /// Seed 230 rows, queue an export with page size 100, return the context.
    async fn queue_export(
        table: &Arc<InMemoryRecordTable>,
        store: &Arc<InMemoryJobStore>,
        policy: RetryPolicy,
    ) -> RequestContext {
        let ctx = RequestContext::new(TenantId::new(), StoreId::new(), UserId::new());
        for i in 0..230 {
            table
                .append(T, ctx.store_id(), day(1 + i % 28), None, "settled")
                .unwrap();
        }

        let service = ExportService::new(
            table.clone(),
            JobQueueSubmitter::new(store.clone()).with_retry_policy(policy),
            PageChunker::new(100).unwrap(),
            ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 21, 8, 0, 0).unwrap()),
        );
        let receipt = service
            .export(&ctx, ExportFilter::new(T, ctx.store_id(), day(1), day(31)))
            .await
            .unwrap();
        assert_eq!(receipt.total_pages, 3);
        ctx
    }

    #[tokio::test]
    async fn runner_renders_every_page_once() {
        let table = Arc::new(InMemoryRecordTable::new());
        let store = InMemoryJobStore::arc();
        let ctx = queue_export(&table, &store, RetryPolicy::default()).await;

        // Late rows must not show up in any page.
        for _ in 0..50 {
            table.append(T, ctx.store_id(), day(2), None, "settled").unwrap();
        }

        let renderer = Arc::new(CollectingRenderer::default());
        let runner = ExportJobRunner::new(store.clone(), table.clone(), renderer.clone());
        while let Some(outcome) = runner.run_next(Some(ctx.tenant_id())).await.unwrap() {
            assert_eq!(outcome.status, JobStatus::Completed);
        }

        let pages = renderer.pages.lock().unwrap().clone();
        assert_eq!(pages.len(), 3);
        let ids: Vec<i64> = pages.iter().flat_map(|(_, ids)| ids.clone()).collect();
        let unique: BTreeSet<i64> = ids.iter().copied().collect();
        assert_eq!(ids.len(), 230);
        assert_eq!(unique, (1..=230).collect());
        assert_eq!(store.stats(ctx.tenant_id()).unwrap().completed, 3);
    }

    #[tokio::test]
    async fn failing_renderer_retries_then_dead_letters() {
        let table = Arc::new(InMemoryRecordTable::new());
        let store = InMemoryJobStore::arc();
        let ctx = queue_export(&table, &store, RetryPolicy::fixed(2, Duration::ZERO)).await;

        let renderer = FlakyRenderer {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        };
        let runner = ExportJobRunner::new(store.clone(), table.clone(), renderer);

        let mut dead = 0;
        while let Some(outcome) = runner.run_next(Some(ctx.tenant_id())).await.unwrap() {
            if matches!(outcome.status, JobStatus::DeadLettered { .. }) {
                dead += 1;
            }
        }

        assert_eq!(dead, 3);
        assert_eq!(store.list_dead_letters(ctx.tenant_id(), 10).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn undecodable_payload_is_dead_lettered() {
        let store = InMemoryJobStore::arc();
        let tenant = TenantId::new();
        store
            .enqueue(Job::new(
                tenant,
                crate::jobs::JobKind::data_export(T),
                serde_json::json!({"page": "nope"}),
            ))
            .unwrap();

        let runner = ExportJobRunner::new(
            store.clone(),
            Arc::new(InMemoryRecordTable::new()),
            TracingPageRenderer,
        );
        let outcome = runner.run_next(Some(tenant)).await.unwrap().unwrap();

        assert!(matches!(outcome.status, JobStatus::DeadLettered { attempts: 1, .. }));
        assert_eq!(store.list_dead_letters(tenant, 10).unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn spawned_runner_drains_the_queue() {
        let table = Arc::new(InMemoryRecordTable::new());
        let store = InMemoryJobStore::arc();
        let ctx = queue_export(&table, &store, RetryPolicy::fixed(3, Duration::ZERO)).await;

        let renderer = Arc::new(FlakyRenderer {
            failures: 1,
            calls: AtomicU32::new(0),
        });
        let handle = ExportJobRunner::new(store.clone(), table.clone(), renderer)
            .spawn(
                RunnerConfig {
                    poll_interval: Duration::from_millis(5),
                    tenant_id: Some(ctx.tenant_id()),
                    ..Default::default()
                },
                Handle::current(),
            )
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.stats().jobs_succeeded < 3 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let stats = handle.stats();
        tokio::task::spawn_blocking(move || handle.shutdown())
            .await
            .unwrap();

        assert_eq!(stats.jobs_succeeded, 3);
        assert_eq!(stats.jobs_failed, 1);
        assert_eq!(store.stats(ctx.tenant_id()).unwrap().completed, 3);
    }
}
