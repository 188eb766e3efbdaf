use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::jobs::registry::JobRegistry;

#[derive(Clone, Debug)]
pub struct ReclaimerConfig {
    pub retention: Duration,
    pub interval: Duration,
}

impl Default for ReclaimerConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(60 * 60),
            interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Evicts finished jobs once they are older than the retention window.
///
/// `pending` and `processing` jobs are never touched, however old.
#[derive(Clone)]
pub struct Reclaimer {
    registry: JobRegistry,
    cfg: ReclaimerConfig,
}

impl Reclaimer {
    pub fn new(registry: JobRegistry, cfg: ReclaimerConfig) -> Self {
        Self { registry, cfg }
    }

    pub fn config(&self) -> &ReclaimerConfig {
        &self.cfg
    }

    /// Returns number of jobs removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// Sweep as if the clock read `now`. Idempotent for a fixed `now`.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = cutoff_before(now, self.cfg.retention);
        self.sweep_older_than(cutoff)
    }

    /// Remove terminal jobs whose `completed_at` is strictly before `cutoff`.
    pub fn sweep_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        self.registry.delete_where(|job| {
            job.status.is_terminal() && job.completed_at.is_some_and(|at| at < cutoff)
        })
    }

    /// Sweep immediately, then every `interval`, until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.cfg.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let removed = self.sweep();
                    if removed > 0 {
                        tracing::info!(removed, remaining = self.registry.len(), "reclaimed finished jobs");
                    }
                }
            }
        }
    }
}

/// Convenience: "now - retention", saturating on absurd windows.
pub fn cutoff_before(now: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(retention)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
