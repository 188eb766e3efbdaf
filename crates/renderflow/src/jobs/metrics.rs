use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::jobs::admission::{AdmissionController, CapacityInfo};
use crate::jobs::scheduler::Scheduler;

/// Job counts by status plus the scheduler wait queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub queued: usize,
}

impl QueueStats {
    pub fn collect(scheduler: &Scheduler) -> Self {
        let counts = scheduler.registry().counts();
        Self {
            pending: counts.pending,
            processing: counts.processing,
            completed: counts.completed,
            failed: counts.failed,
            queued: scheduler.load().queued,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueueStatus {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub stats: QueueStats,
    pub capacity: CapacityInfo,
    pub render_timeout_ms: u64,
}

impl QueueStatus {
    pub fn collect(scheduler: &Scheduler, admission: &AdmissionController) -> Self {
        Self {
            at: Utc::now(),
            stats: QueueStats::collect(scheduler),
            capacity: admission.capacity(),
            render_timeout_ms: duration_ms(scheduler.config().render_timeout),
        }
    }

    /// Minimal Prometheus text format.
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        out.push_str("# HELP renderflow_jobs Jobs currently held in the registry by status\n");
        out.push_str("# TYPE renderflow_jobs gauge\n");
        for (status, n) in [
            ("pending", self.stats.pending),
            ("processing", self.stats.processing),
            ("completed", self.stats.completed),
            ("failed", self.stats.failed),
        ] {
            out.push_str(&format!("renderflow_jobs{{status=\"{status}\"}} {n}\n"));
        }

        for (name, help, value) in [
            ("renderflow_running_renders", "Renders holding a scheduler slot", self.capacity.running as u64),
            ("renderflow_queued_renders", "Renders waiting for a slot", self.capacity.queued as u64),
            ("renderflow_max_concurrency", "Configured concurrent render limit", self.capacity.max_concurrency as u64),
            ("renderflow_max_queue_depth", "Configured outstanding render limit", self.capacity.max_queue_depth as u64),
            ("renderflow_render_timeout_ms", "Configured per-render timeout", self.render_timeout_ms),
        ] {
            out.push_str(&format!("# HELP {name} {help}\n# TYPE {name} gauge\n{name} {value}\n"));
        }
        out
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
