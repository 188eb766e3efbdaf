//! Bounded-concurrency render scheduler.
//!
//! Slots are semaphore permits. Everything that cannot get one waits in a FIFO, and
//! jobs are started strictly from the front of that queue while the queue lock is held:
//! the job is marked `processing`, its future is built and its deadline armed in
//! submission order, so a later submission can never start before an earlier one.
//!
//! Known limitation: when the timeout wins, the slot is released and the job is failed,
//! but the underlying work is only detached, not cancelled. An external renderer may
//! keep running in the background until it finishes on its own.

use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinError;
use tokio::time::{timeout_at, Instant};
use uuid::Uuid;

use crate::jobs::error_codes::JobError;
use crate::jobs::model::{JobStatus, JobUpdate};
use crate::jobs::registry::JobRegistry;

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub max_concurrency: usize,
    pub render_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 2,
            render_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Running and waiting work at one instant. Admission reservations count as queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerLoad {
    pub running: usize,
    pub queued: usize,
}

impl SchedulerLoad {
    pub fn outstanding(&self) -> usize {
        self.running + self.queued
    }
}

/// Starts one queued job. Runs with the queue lock held.
type Launch = Box<dyn FnOnce(&Scheduler, OwnedSemaphorePermit) + Send>;

struct Queued {
    job_id: Uuid,
    launch: Launch,
}

#[derive(Default)]
struct SchedulerState {
    waiting: VecDeque<Queued>,
    reserved: usize,
}

struct Inner {
    cfg: SchedulerConfig,
    registry: JobRegistry,
    slots: Arc<Semaphore>,
    state: Mutex<SchedulerState>,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(registry: JobRegistry, mut cfg: SchedulerConfig) -> Self {
        cfg.max_concurrency = cfg.max_concurrency.max(1);
        Self {
            inner: Arc::new(Inner {
                slots: Arc::new(Semaphore::new(cfg.max_concurrency)),
                cfg,
                registry,
                state: Mutex::new(SchedulerState::default()),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.cfg
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.inner.registry
    }

    pub fn load(&self) -> SchedulerLoad {
        let state = self.state();
        SchedulerLoad {
            running: self.running(),
            queued: state.waiting.len() + state.reserved,
        }
    }

    /// Run `task` for `job_id` under the concurrency limit and render timeout.
    ///
    /// The job is claimed and queued when this is called, not when the returned future
    /// is first polled. A job that is not `pending`, or was submitted before, fails fast
    /// without taking a slot. The work executes on its own tokio task, so dropping the
    /// returned future does not stop it or leak its slot. Must be called from within a
    /// tokio runtime.
    ///
    /// `task` itself is called while the queue lock is held; it must only build the
    /// future and not call back into the scheduler.
    pub fn submit<F, Fut, T>(
        &self,
        job_id: Uuid,
        task: F,
    ) -> impl Future<Output = Result<T, JobError>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: ToString + Send + 'static,
    {
        self.dispatch(job_id, None, task)
    }

    pub(crate) fn submit_reserved<F, Fut, T>(
        &self,
        job_id: Uuid,
        reservation: Option<Reservation>,
        task: F,
    ) -> impl Future<Output = Result<T, JobError>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: ToString + Send + 'static,
    {
        self.dispatch(job_id, reservation, task)
    }

    /// Take one admission slot if fewer than `max_outstanding` units are running,
    /// queued or already reserved. Check and reservation happen under one lock.
    pub(crate) fn try_reserve(&self, max_outstanding: usize) -> Result<Reservation, JobError> {
        let mut state = self.state();
        let outstanding = self.running() + state.waiting.len() + state.reserved;
        if outstanding >= max_outstanding {
            return Err(JobError::AdmissionRejected {
                outstanding,
                max_queue_depth: max_outstanding,
            });
        }
        state.reserved += 1;
        Ok(Reservation {
            scheduler: self.clone(),
            armed: true,
        })
    }

    fn dispatch<F, Fut, T>(
        &self,
        job_id: Uuid,
        reservation: Option<Reservation>,
        task: F,
    ) -> impl Future<Output = Result<T, JobError>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: ToString + Send + 'static,
    {
        let (done, outcome) = oneshot::channel();

        match self.inner.registry.claim(job_id) {
            Ok(()) => {
                let launch: Launch =
                    Box::new(move |scheduler: &Scheduler, permit: OwnedSemaphorePermit| {
                        scheduler.launch(job_id, permit, task, done)
                    });
                self.enqueue(job_id, reservation, launch);
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "render submit refused");
                let _ = done.send(Err(e));
            }
        }

        async move {
            outcome.await.unwrap_or_else(|_| {
                Err(JobError::TaskFailure(
                    "scheduler dropped a queued render".to_string(),
                ))
            })
        }
    }

    /// Join the back of the queue, then start whatever the free slots allow.
    fn enqueue(&self, job_id: Uuid, reservation: Option<Reservation>, launch: Launch) {
        let reserved = reservation.map(Reservation::disarm).is_some();

        let mut state = self.state();
        if reserved {
            state.reserved = state.reserved.saturating_sub(1);
        }
        state.waiting.push_back(Queued { job_id, launch });
        self.start_ready(&mut state);

        if state.waiting.back().is_some_and(|q| q.job_id == job_id) {
            tracing::debug!(
                job_id = %job_id,
                queued = state.waiting.len(),
                "render queued"
            );
        }
    }

    /// Pop and start queued jobs, oldest first, while permits are free.
    fn start_ready(&self, state: &mut SchedulerState) {
        while !state.waiting.is_empty() {
            let Ok(permit) = self.inner.slots.clone().try_acquire_owned() else {
                break;
            };
            if let Some(next) = state.waiting.pop_front() {
                (next.launch)(self, permit);
            }
        }
    }

    /// Mark the job processing, build its future and spawn it against the deadline.
    fn launch<F, Fut, T>(
        &self,
        job_id: Uuid,
        permit: OwnedSemaphorePermit,
        task: F,
        done: oneshot::Sender<Result<T, JobError>>,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: ToString + Send + 'static,
    {
        self.write(job_id, JobStatus::Processing, JobUpdate::default());
        tracing::info!(job_id = %job_id, "render started");

        let limit = self.inner.cfg.render_timeout;
        let deadline = Instant::now() + limit;
        let work = match panic::catch_unwind(AssertUnwindSafe(task)) {
            Ok(fut) => Ok(tokio::spawn(fut)),
            Err(payload) => Err(JobError::TaskFailure(format!(
                "render task panicked: {}",
                panic_message(payload)
            ))),
        };

        let scheduler = self.clone();
        tokio::spawn(async move {
            // the slot is only armed once this task runs; an unpolled task just drops its permit
            let slot = Slot {
                permit: Some(permit),
                scheduler: scheduler.clone(),
            };

            let outcome = match work {
                Err(e) => Err(e),
                Ok(handle) => match timeout_at(deadline, handle).await {
                    Ok(Ok(Ok(value))) => Ok(value),
                    Ok(Ok(Err(e))) => Err(JobError::TaskFailure(format!("{e:#}"))),
                    Ok(Err(e)) => Err(JobError::TaskFailure(join_error_message(e))),
                    Err(_) => {
                        tracing::warn!(
                            job_id = %job_id,
                            timeout_ms = limit.as_millis() as u64,
                            "render timed out, underlying work left running detached"
                        );
                        Err(JobError::TaskTimeout { timeout: limit })
                    }
                },
            };

            scheduler.record(job_id, &outcome);
            drop(slot);
            let _ = done.send(outcome);
        });
    }

    fn record<T: ToString>(&self, job_id: Uuid, outcome: &Result<T, JobError>) {
        match outcome {
            Ok(value) => {
                self.write(
                    job_id,
                    JobStatus::Completed,
                    JobUpdate::completed(value.to_string()),
                );
                tracing::info!(job_id = %job_id, "render completed");
            }
            Err(e) => {
                self.write(
                    job_id,
                    JobStatus::Failed,
                    JobUpdate::failed(e.kind(), e.to_string()),
                );
                tracing::error!(job_id = %job_id, kind = e.kind().as_str(), error = %e, "render failed");
            }
        }
    }

    fn write(&self, job_id: Uuid, status: JobStatus, update: JobUpdate) {
        if let Err(e) = self.inner.registry.update(job_id, status, update) {
            tracing::warn!(job_id = %job_id, status = %status, error = %e, "job status write rejected");
        }
    }

    fn running(&self) -> usize {
        self.inner
            .cfg
            .max_concurrency
            .saturating_sub(self.inner.slots.available_permits())
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A held permit. Dropping it frees the slot and starts the next queued job.
struct Slot {
    permit: Option<OwnedSemaphorePermit>,
    scheduler: Scheduler,
}

impl Drop for Slot {
    fn drop(&mut self) {
        drop(self.permit.take());
        let mut state = self.scheduler.state();
        self.scheduler.start_ready(&mut state);
    }
}

/// One admitted-but-not-yet-submitted unit of work. Dropping it gives the slot back.
pub(crate) struct Reservation {
    scheduler: Scheduler,
    armed: bool,
}

impl Reservation {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.scheduler.state();
            state.reserved = state.reserved.saturating_sub(1);
        }
    }
}

fn join_error_message(e: JoinError) -> String {
    if e.is_panic() {
        format!("render task panicked: {}", panic_message(e.into_panic()))
    } else {
        format!("render task aborted: {e}")
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
