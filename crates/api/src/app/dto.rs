use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tablepos_core::JobId;
use tablepos_export::{ExportRange, ExportReceipt};
use tablepos_infra::jobs::{DeadLetterEntry, Job, JobStatus};
use tablepos_sequence::BusinessCode;

use super::directory::BackOfficeEntity;

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub stall_id: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExportAcceptedResponse {
    pub file_name: String,
    pub range: ExportRange,
    pub total_pages: u64,
    pub job_ids: Vec<JobId>,
}

impl From<ExportReceipt> for ExportAcceptedResponse {
    fn from(receipt: ExportReceipt) -> Self {
        Self {
            file_name: receipt.file_name,
            range: receipt.range,
            total_pages: receipt.total_pages,
            job_ids: receipt.job_ids,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExportJobResponse {
    pub job_id: JobId,
    pub kind: &'static str,
    pub status: JobStatus,
    pub attempt: u32,
    pub page: Option<u64>,
    pub file_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for ExportJobResponse {
    fn from(job: Job) -> Self {
        let descriptor = job.export_descriptor().ok();
        Self {
            job_id: job.id,
            kind: job.kind.type_name(),
            page: descriptor.as_ref().map(|d| d.page_params.pager.page),
            file_name: descriptor.map(|d| d.file_name),
            status: job.status,
            attempt: job.attempt,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// A page the runner gave up on.
#[derive(Debug, Serialize)]
pub struct DeadLetterResponse {
    pub job_id: JobId,
    pub reason: String,
    pub attempts: u32,
    pub page: Option<u64>,
    pub file_name: Option<String>,
    pub dead_lettered_at: DateTime<Utc>,
}

impl From<DeadLetterEntry> for DeadLetterResponse {
    fn from(entry: DeadLetterEntry) -> Self {
        let descriptor = entry.job.export_descriptor().ok();
        Self {
            job_id: entry.job.id,
            reason: entry.reason,
            attempts: entry.job.attempt,
            page: descriptor.as_ref().map(|d| d.page_params.pager.page),
            file_name: descriptor.map(|d| d.file_name),
            dead_lettered_at: entry.dead_lettered_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateEntityRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct EntityResponse {
    pub id: Uuid,
    pub kind: BusinessCode,
    pub code: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<BackOfficeEntity> for EntityResponse {
    fn from(entity: BackOfficeEntity) -> Self {
        Self {
            id: entity.id,
            kind: entity.kind,
            code: entity.code,
            name: entity.name,
            created_at: entity.created_at,
        }
    }
}
