//! Queue envelope for export pages: kind, status, retry policy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tablepos_core::{JobId, TenantId};
use tablepos_export::{ExportJobDescriptor, ExportType};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Render one page of a ranged export.
    DataExport { export_type: ExportType },
}

impl JobKind {
    pub fn data_export(export_type: ExportType) -> Self {
        Self::DataExport { export_type }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            JobKind::DataExport { .. } => "data_export",
        }
    }
}

/// Lifecycle of a queued page: `Pending -> Running -> Completed`, with
/// `Failed` looping back to `Running` until the policy gives up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    /// Waiting for its backoff to elapse.
    Failed { error: String, attempt: u32 },
    DeadLettered { error: String, attempts: u32 },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::DeadLettered { .. })
    }

    /// Whether a runner may claim a job in this state.
    pub fn is_claimable(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    /// `base_delay * 2^(attempt-1)`, capped at `max_delay`.
    #[default]
    Exponential,
}

/// How often a page render is retried, and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts before the job is dead-lettered.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    /// Wait after failed attempt number `attempt` (1-indexed); zero before the first.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let Some(exponent) = attempt.checked_sub(1) else {
            return Duration::ZERO;
        };
        match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(exponent))
                .min(self.max_delay),
        }
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// One queued export page, scoped to the tenant that requested it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub tenant_id: TenantId,
    pub kind: JobKind,
    /// Serialized `ExportJobDescriptor`.
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub retry_policy: RetryPolicy,
    /// Attempts started so far.
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Not claimable before this instant.
    pub scheduled_at: Option<DateTime<Utc>>,
    pub history: Vec<JobAttemptRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl JobAttemptRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

impl Job {
    pub fn new(tenant_id: TenantId, kind: JobKind, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            tenant_id,
            kind,
            payload,
            status: JobStatus::Pending,
            retry_policy: RetryPolicy::default(),
            attempt: 0,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            history: Vec::new(),
        }
    }

    /// Wrap one export page descriptor.
    pub fn data_export(
        tenant_id: TenantId,
        descriptor: &ExportJobDescriptor,
    ) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_value(descriptor)?;
        Ok(Self::new(
            tenant_id,
            JobKind::data_export(descriptor.export_type),
            payload,
        ))
    }

    pub fn export_descriptor(&self) -> Result<ExportJobDescriptor, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.scheduled_at.is_none_or(|at| at <= Utc::now())
    }

    pub fn mark_running(&mut self) {
        self.attempt += 1;
        self.status = JobStatus::Running;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self, started_at: DateTime<Utc>) {
        self.finish_attempt(started_at, None);
        self.status = JobStatus::Completed;
        self.scheduled_at = None;
    }

    /// Record a failure; schedules a retry or dead-letters per the policy.
    pub fn mark_failed(&mut self, error: String, started_at: DateTime<Utc>) {
        let now = self.finish_attempt(started_at, Some(error.clone()));

        self.status = if self.retry_policy.should_retry(self.attempt) {
            let delay = self.retry_policy.delay_for_attempt(self.attempt);
            self.scheduled_at = Some(now + chrono::Duration::from_std(delay).unwrap_or_default());
            JobStatus::Failed {
                error,
                attempt: self.attempt,
            }
        } else {
            JobStatus::DeadLettered {
                error,
                attempts: self.attempt,
            }
        };
    }

    fn finish_attempt(&mut self, started_at: DateTime<Utc>, error: Option<String>) -> DateTime<Utc> {
        let now = Utc::now();
        self.history.push(JobAttemptRecord {
            attempt: self.attempt,
            started_at,
            finished_at: now,
            error,
        });
        self.updated_at = now;
        now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job: Job,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}

impl DeadLetterEntry {
    pub fn new(job: Job, reason: String) -> Self {
        Self {
            job,
            dead_lettered_at: Utc::now(),
            reason,
        }
    }
}
