//! Service wiring: sequence store, record store, job queue.
//!
//! `DATABASE_URL` selects Postgres for the counters and the export tables; without
//! it every store is in-memory (dev and tests).

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tracing::info;

use tablepos_core::{DomainError, SystemClock};
use tablepos_export::{
    ExportError, ExportService, ExportSubmitter, InMemoryRecordTable, PageChunker, PageSource,
    RangeResolver,
};
use tablepos_infra::PipelineConfig;
use tablepos_infra::jobs::{
    ExportJobRunner, InMemoryJobStore, JobQueueSubmitter, JobStore, RunnerConfig, RunnerHandle,
    TracingPageRenderer,
};
use tablepos_infra::postgres::{PostgresRecordStore, PostgresSequenceStore, ensure_schema};
use tablepos_sequence::{
    BusinessCalendar, CodeMinter, CodeWidths, InMemorySequenceStore, RolloverCalendar,
    SequenceStore,
};

use super::directory::EntityDirectory;

pub type AppExportService =
    ExportService<Arc<dyn RangeResolver>, Arc<dyn ExportSubmitter>, SystemClock>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid calendar settings: {0}")]
    Calendar(#[from] DomainError),
    #[error("invalid export settings: {0}")]
    Export(#[from] ExportError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub struct AppServices {
    minter: CodeMinter,
    exports: AppExportService,
    pages: Arc<dyn PageSource>,
    jobs: Arc<dyn JobStore>,
    directory: EntityDirectory,
    records: Option<Arc<InMemoryRecordTable>>,
    request_timeout: Duration,
}

impl AppServices {
    /// All stores in process memory.
    pub fn in_memory(config: &PipelineConfig) -> Result<Self, ServiceError> {
        let records = Arc::new(InMemoryRecordTable::new());
        let mut services = Self::assemble(
            config,
            InMemorySequenceStore::arc(),
            records.clone(),
            records.clone(),
        )?;
        services.records = Some(records);
        Ok(services)
    }

    /// Counters and export tables in Postgres; the job queue stays in memory.
    pub async fn postgres(config: &PipelineConfig, database_url: &str) -> Result<Self, ServiceError> {
        let pool = sqlx::PgPool::connect(database_url).await?;
        ensure_schema(&pool).await?;

        let record_store = Arc::new(PostgresRecordStore::new(pool.clone()));
        Self::assemble(
            config,
            Arc::new(PostgresSequenceStore::new(pool)),
            record_store.clone(),
            record_store,
        )
    }

    fn assemble(
        config: &PipelineConfig,
        sequences: Arc<dyn SequenceStore>,
        resolver: Arc<dyn RangeResolver>,
        pages: Arc<dyn PageSource>,
    ) -> Result<Self, ServiceError> {
        let calendar: Arc<dyn BusinessCalendar> = Arc::new(RolloverCalendar::new(
            SystemClock,
            config.utc_offset_minutes,
            config.rollover_hour,
        )?);
        let minter = CodeMinter::new(sequences, calendar).with_widths(CodeWidths {
            incr: config.sequence_width,
            daily: config.daily_sequence_width,
        });

        let jobs: Arc<dyn JobStore> =
            Arc::new(InMemoryJobStore::new().with_retention(config.job_retention));
        let submitter: Arc<dyn ExportSubmitter> = Arc::new(JobQueueSubmitter::new(jobs.clone()));
        let chunker = PageChunker::new(config.export_page_size)?;

        Ok(Self {
            minter,
            exports: ExportService::new(resolver, submitter, chunker, SystemClock),
            pages,
            jobs,
            directory: EntityDirectory::new(),
            records: None,
            request_timeout: config.request_timeout,
        })
    }

    pub fn minter(&self) -> &CodeMinter {
        &self.minter
    }

    pub fn exports(&self) -> &AppExportService {
        &self.exports
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    pub fn directory(&self) -> &EntityDirectory {
        &self.directory
    }

    /// The in-memory record table, when the export tables are not in Postgres.
    pub fn records(&self) -> Option<&Arc<InMemoryRecordTable>> {
        self.records.as_ref()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Start a background runner that renders queued export pages.
    pub fn spawn_export_runner(
        &self,
        config: RunnerConfig,
        handle: Handle,
    ) -> std::io::Result<RunnerHandle> {
        ExportJobRunner::new(self.jobs.clone(), self.pages.clone(), TracingPageRenderer)
            .spawn(config, handle)
    }
}

pub async fn build_services(config: &PipelineConfig) -> Result<AppServices, ServiceError> {
    match config.database_url.as_deref() {
        Some(url) => {
            let services = AppServices::postgres(config, url).await?;
            info!("wired postgres sequence and record stores");
            Ok(services)
        }
        None => {
            let services = AppServices::in_memory(config)?;
            info!("DATABASE_URL not set; using in-memory stores");
            Ok(services)
        }
    }
}
