use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use uuid::Uuid;

use crate::jobs::error_codes::JobError;
use crate::jobs::model::{Job, JobStatus, JobUpdate, StatusCounts};

/// In-memory store of job records, shared by handle.
///
/// Every mutation happens inside one write-lock section, so a record is never
/// observed half-updated. Nothing survives the process.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, Job>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> Job {
        let job = Job::new();
        self.write().insert(job.id, job.clone());
        tracing::debug!(job_id = %job.id, "job created");
        job
    }

    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.read().get(&id).cloned()
    }

    /// Mark a pending job as handed to the scheduler. A job can be claimed once.
    pub(crate) fn claim(&self, id: Uuid) -> Result<(), JobError> {
        let mut jobs = self.write();
        let job = jobs.get_mut(&id).ok_or(JobError::UnknownJob(id))?;
        if job.submitted || job.status != JobStatus::Pending {
            return Err(JobError::AlreadySubmitted {
                id,
                status: job.status,
            });
        }
        job.submitted = true;
        Ok(())
    }

    /// Apply a status transition plus optional fields.
    ///
    /// `started_at` is stamped on entering `processing`, `completed_at` on entering a
    /// terminal state; neither is overwritten once set.
    pub fn update(&self, id: Uuid, status: JobStatus, update: JobUpdate) -> Result<Job, JobError> {
        let mut jobs = self.write();
        let job = jobs.get_mut(&id).ok_or(JobError::UnknownJob(id))?;

        if !job.status.can_transition_to(status) {
            return Err(JobError::InvalidTransition {
                id,
                from: job.status,
                to: status,
            });
        }

        let now = Utc::now();
        job.status = status;
        if status == JobStatus::Processing && job.started_at.is_none() {
            job.started_at = Some(now);
        }
        if status.is_terminal() && job.completed_at.is_none() {
            job.completed_at = Some(now);
        }

        // error only on failed jobs, result only on completed ones
        match status {
            JobStatus::Failed => job.error = update.error.or(job.error.take()),
            JobStatus::Completed => job.result = update.result.or(job.result.take()),
            _ => {}
        }

        Ok(job.clone())
    }

    pub fn list(&self) -> Vec<Job> {
        self.read().values().cloned().collect()
    }

    pub fn delete(&self, id: Uuid) -> Option<Job> {
        self.write().remove(&id)
    }

    /// Remove every job matching `pred` in one pass. Returns how many went.
    pub(crate) fn delete_where(&self, mut pred: impl FnMut(&Job) -> bool) -> usize {
        let mut jobs = self.write();
        let before = jobs.len();
        jobs.retain(|_, job| !pred(job));
        before - jobs.len()
    }

    pub fn counts(&self) -> StatusCounts {
        let jobs = self.read();
        let mut counts = StatusCounts::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, Job>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}
