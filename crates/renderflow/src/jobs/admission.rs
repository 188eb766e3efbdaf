//  Admission is the doorman in front of the scheduler: it decides whether a request may
//  become a job at all, before anything is created.
//
//  Concurrency says how many renders run at once. Queue depth says how many may be
//  outstanding (running or waiting). Once the outstanding count reaches the depth we say
//  "come back later" instead of growing the wait queue forever.

use std::future::Future;

use serde::Serialize;

use crate::jobs::error_codes::JobError;
use crate::jobs::model::Job;
use crate::jobs::scheduler::{Reservation, Scheduler};

#[derive(Clone, Debug)]
pub struct AdmissionConfig {
    pub max_queue_depth: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self { max_queue_depth: 10 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapacityInfo {
    pub running: usize,
    pub queued: usize,
    pub max_concurrency: usize,
    pub max_queue_depth: usize,
    pub is_full: bool,
}

#[derive(Clone)]
pub struct AdmissionController {
    scheduler: Scheduler,
    cfg: AdmissionConfig,
}

impl AdmissionController {
    pub fn new(scheduler: Scheduler, mut cfg: AdmissionConfig) -> Self {
        cfg.max_queue_depth = cfg.max_queue_depth.max(1);
        Self { scheduler, cfg }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn max_queue_depth(&self) -> usize {
        self.cfg.max_queue_depth
    }

    /// True while running + queued is strictly below the configured queue depth.
    pub fn can_accept(&self) -> bool {
        self.scheduler.load().outstanding() < self.cfg.max_queue_depth
    }

    pub fn capacity(&self) -> CapacityInfo {
        let load = self.scheduler.load();
        CapacityInfo {
            running: load.running,
            queued: load.queued,
            max_concurrency: self.scheduler.config().max_concurrency,
            max_queue_depth: self.cfg.max_queue_depth,
            is_full: load.outstanding() >= self.cfg.max_queue_depth,
        }
    }

    /// Check capacity, reserve a place and only then create the job.
    ///
    /// On rejection nothing is created and nothing is reserved.
    pub fn admit(&self) -> Result<Admission, JobError> {
        let reservation = match self.scheduler.try_reserve(self.cfg.max_queue_depth) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "render admission rejected");
                return Err(e);
            }
        };
        let job = self.scheduler.registry().create();
        tracing::info!(job_id = %job.id, "render admitted");

        Ok(Admission {
            job,
            scheduler: self.scheduler.clone(),
            reservation: Some(reservation),
        })
    }
}

/// An accepted job holding its place in the scheduler until submitted.
///
/// Dropping it without calling [`Admission::submit`] gives the place back and removes
/// the job record, so an abandoned request leaves no state behind.
pub struct Admission {
    job: Job,
    scheduler: Scheduler,
    reservation: Option<Reservation>,
}

impl Admission {
    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn submit<F, Fut, T>(
        mut self,
        task: F,
    ) -> impl Future<Output = Result<T, JobError>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: ToString + Send + 'static,
    {
        let reservation = self.reservation.take();
        self.scheduler.submit_reserved(self.job.id, reservation, task)
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        if self.reservation.take().is_some() {
            self.scheduler.registry().delete(self.job.id);
            tracing::debug!(job_id = %self.job.id, "unsubmitted admission released");
        }
    }
}
