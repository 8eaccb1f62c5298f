//! Tenant-scoped job queue storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;

use tablepos_core::{JobId, TenantId};

use super::types::{DeadLetterEntry, Job, JobStatus};

/// Queue of export page jobs.
///
/// Reads and retries are tenant-scoped; only `claim_next(None)` crosses tenants,
/// for a shared runner.
pub trait JobStore: Send + Sync {
    /// Enqueue a single job (a batch of one).
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut ids = self.enqueue_batch(vec![job])?;
        ids.pop()
            .ok_or_else(|| JobStoreError::Storage("empty enqueue result".to_string()))
    }

    /// Enqueue every job or none of them.
    ///
    /// Ids are returned in input order.
    fn enqueue_batch(&self, jobs: Vec<Job>) -> Result<Vec<JobId>, JobStoreError>;

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Claim the oldest ready job, marking it running.
    fn claim_next(&self, tenant_id: Option<TenantId>) -> Result<Option<Job>, JobStoreError>;

    /// Move a job to the dead-letter queue.
    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError>;

    fn list_dead_letters(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, JobStoreError>;

    /// Move a dead-lettered job back to pending.
    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError>;

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("tenant isolation violation")]
    TenantIsolation,
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("queue is full: {pending} pending, capacity {capacity}")]
    Full { pending: usize, capacity: usize },
    #[error("storage error: {0}")]
    Storage(String),
}

/// Per-tenant counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

/// Process-local queue; jobs are lost on restart.
///
/// Completed jobs stay readable until they are older than the retention
/// window, then are dropped on the next enqueue. Without a retention they
/// are kept for the life of the process. Dead letters are never pruned.
#[derive(Debug)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    dead_letters: RwLock<HashMap<JobId, DeadLetterEntry>>,
    capacity: Option<usize>,
    retention: Option<Duration>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            dead_letters: RwLock::new(HashMap::new()),
            capacity: None,
            retention: None,
        }
    }

    /// Reject batches that would push unfinished jobs above `capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    /// Drop completed jobs last updated more than `retention` ago.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Remove completed jobs older than the retention window.
    ///
    /// Returns how many were dropped.
    pub fn prune_completed(&self) -> Result<usize, JobStoreError> {
        let Some(retention) = self.retention else {
            return Ok(0);
        };
        Ok(prune(&mut *self.jobs_mut()?, retention))
    }

    fn jobs(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs.read().map_err(|_| poisoned())
    }

    fn jobs_mut(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs.write().map_err(|_| poisoned())
    }

    fn dead_letters_mut(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<JobId, DeadLetterEntry>>, JobStoreError> {
        self.dead_letters.write().map_err(|_| poisoned())
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> JobStoreError {
    JobStoreError::Storage("job store lock poisoned".to_string())
}

fn prune(jobs: &mut HashMap<JobId, Job>, retention: Duration) -> usize {
    let Ok(age) = chrono::Duration::from_std(retention) else {
        return 0;
    };
    let cutoff = Utc::now() - age;
    let before = jobs.len();
    jobs.retain(|_, j| !(matches!(j.status, JobStatus::Completed) && j.updated_at <= cutoff));
    before - jobs.len()
}

impl JobStore for InMemoryJobStore {
    fn enqueue_batch(&self, jobs: Vec<Job>) -> Result<Vec<JobId>, JobStoreError> {
        let mut stored = self.jobs_mut()?;
        if let Some(retention) = self.retention {
            prune(&mut stored, retention);
        }

        // Validate the whole batch before inserting anything.
        let mut seen = std::collections::HashSet::with_capacity(jobs.len());
        for job in &jobs {
            if stored.contains_key(&job.id) || !seen.insert(job.id) {
                return Err(JobStoreError::AlreadyExists(job.id));
            }
        }
        if let Some(capacity) = self.capacity {
            let pending = stored.values().filter(|j| !j.status.is_terminal()).count();
            if pending + jobs.len() > capacity {
                return Err(JobStoreError::Full { pending, capacity });
            }
        }

        Ok(jobs
            .into_iter()
            .map(|job| {
                let id = job.id;
                stored.insert(id, job);
                id
            })
            .collect())
    }

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        match self.jobs()?.get(&job_id) {
            Some(job) if job.tenant_id == tenant_id => Ok(Some(job.clone())),
            Some(_) => Err(JobStoreError::TenantIsolation),
            None => Ok(None),
        }
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs_mut()?;
        if !jobs.contains_key(&job.id) {
            return Err(JobStoreError::NotFound(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn claim_next(&self, tenant_id: Option<TenantId>) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.jobs_mut()?;

        // Oldest first, so pages of one export run in page order.
        let next = jobs
            .values()
            .filter(|j| {
                j.status.is_claimable()
                    && j.is_ready()
                    && tenant_id.is_none_or(|t| j.tenant_id == t)
            })
            .min_by_key(|j| (j.created_at, j.id))
            .map(|j| j.id);

        Ok(next.and_then(|id| {
            jobs.get_mut(&id).map(|job| {
                job.mark_running();
                job.clone()
            })
        }))
    }

    fn dead_letter(&self, mut job: Job, reason: String) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs_mut()?;
        let mut dls = self.dead_letters_mut()?;

        job.status = JobStatus::DeadLettered {
            error: reason.clone(),
            attempts: job.attempt,
        };
        job.updated_at = Utc::now();

        jobs.remove(&job.id);
        dls.insert(job.id, DeadLetterEntry::new(job, reason));
        Ok(())
    }

    fn list_dead_letters(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        let dls = self.dead_letters.read().map_err(|_| poisoned())?;
        let mut result: Vec<_> = dls
            .values()
            .filter(|e| e.job.tenant_id == tenant_id)
            .cloned()
            .collect();

        result.sort_by_key(|e| e.dead_lettered_at);
        result.truncate(limit);
        Ok(result)
    }

    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs_mut()?;
        let mut dls = self.dead_letters_mut()?;

        let entry = dls.remove(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        if entry.job.tenant_id != tenant_id {
            dls.insert(job_id, entry);
            return Err(JobStoreError::TenantIsolation);
        }

        let mut job = entry.job;
        job.status = JobStatus::Pending;
        job.attempt = 0;
        job.scheduled_at = None;
        job.updated_at = Utc::now();
        job.history.clear();

        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        let jobs = self.jobs()?;
        let dls = self.dead_letters.read().map_err(|_| poisoned())?;

        let mut stats = JobStats::default();
        for job in jobs.values().filter(|j| j.tenant_id == tenant_id) {
            match &job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
                JobStatus::DeadLettered { .. } => stats.dead_lettered += 1,
            }
        }
        stats.dead_lettered += dls.values().filter(|e| e.job.tenant_id == tenant_id).count();

        Ok(stats)
    }
}

impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    fn enqueue_batch(&self, jobs: Vec<Job>) -> Result<Vec<JobId>, JobStoreError> {
        (**self).enqueue_batch(jobs)
    }

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(tenant_id, job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn claim_next(&self, tenant_id: Option<TenantId>) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next(tenant_id)
    }

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        (**self).dead_letter(job, reason)
    }

    fn list_dead_letters(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        (**self).list_dead_letters(tenant_id, limit)
    }

    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError> {
        (**self).retry_dead_letter(tenant_id, job_id)
    }

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        (**self).stats(tenant_id)
    }
}
