//! Recurring pass scheduling with single-flight semantics per job kind.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sweeparr_cleaner::PassSummary;
use sweeparr_events::JobKind;
use tokio::sync::watch;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Per-job-kind single-flight guard.
///
/// A trigger that arrives while a run of the same kind is still executing
/// is skipped, not queued; triggers for different kinds run concurrently.
#[derive(Clone)]
pub struct JobGuard {
    slots: Arc<HashMap<JobKind, Arc<Mutex<()>>>>,
}

impl JobGuard {
    #[must_use]
    pub fn new() -> Self {
        let slots = [JobKind::QueueCleaner, JobKind::DownloadCleaner]
            .into_iter()
            .map(|kind| (kind, Arc::new(Mutex::new(()))))
            .collect();
        Self {
            slots: Arc::new(slots),
        }
    }

    /// Attempt to claim the slot for `kind`; `None` means a run is in flight.
    #[must_use]
    pub fn try_acquire(&self, kind: JobKind) -> Option<OwnedMutexGuard<()>> {
        self.slots
            .get(&kind)
            .and_then(|slot| Arc::clone(slot).try_lock_owned().ok())
    }
}

impl Default for JobGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a recurring job loop for one pass kind.
///
/// Ticks that elapse while a pass is running are skipped
/// ([`MissedTickBehavior::Skip`]), and the guard protects against external
/// triggers racing the loop. The loop exits when `shutdown` flips to true;
/// pass errors are logged, never fatal to the loop — the durable state is
/// retried on the next tick.
pub fn spawn_recurring<F, Fut>(
    kind: JobKind,
    every: Duration,
    guard: JobGuard,
    mut shutdown: watch::Receiver<bool>,
    job: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<PassSummary>> + Send,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(kind = kind.as_str(), "scheduler loop stopping");
                        break;
                    }
                    continue;
                }
            }

            let Some(_slot) = guard.try_acquire(kind) else {
                info!(kind = kind.as_str(), "previous run still in flight; trigger skipped");
                continue;
            };
            match job().await {
                Ok(summary) => info!(
                    kind = kind.as_str(),
                    items = summary.items_processed,
                    removals = summary.removals,
                    "scheduled pass finished"
                ),
                Err(error) => warn!(
                    kind = kind.as_str(),
                    error = %error,
                    "scheduled pass failed; will retry on the next trigger"
                ),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn guard_is_single_flight_per_kind() {
        let guard = JobGuard::new();
        let held = guard.try_acquire(JobKind::QueueCleaner).expect("first claim");
        assert!(
            guard.try_acquire(JobKind::QueueCleaner).is_none(),
            "same kind is busy"
        );
        assert!(
            guard.try_acquire(JobKind::DownloadCleaner).is_some(),
            "kinds are independent"
        );
        drop(held);
        assert!(guard.try_acquire(JobKind::QueueCleaner).is_some());
    }

    #[tokio::test]
    async fn recurring_loop_runs_until_shutdown() {
        let (tx, rx) = watch::channel(false);
        let counter = Arc::new(AtomicU32::new(0));
        let observed = Arc::clone(&counter);

        let handle = spawn_recurring(
            JobKind::QueueCleaner,
            Duration::from_millis(10),
            JobGuard::new(),
            rx,
            move || {
                let counter = Arc::clone(&observed);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(PassSummary::default())
                }
            },
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).expect("shutdown signal");
        handle.await.expect("loop exits cleanly");

        assert!(counter.load(Ordering::SeqCst) >= 2, "loop fired repeatedly");
    }

    #[tokio::test]
    async fn busy_slot_skips_the_trigger() {
        let guard = JobGuard::new();
        let (tx, rx) = watch::channel(false);
        let counter = Arc::new(AtomicU32::new(0));
        let observed = Arc::clone(&counter);

        // An external holder keeps the slot busy for the whole test window.
        let held = guard.try_acquire(JobKind::QueueCleaner).expect("claim");
        let handle = spawn_recurring(
            JobKind::QueueCleaner,
            Duration::from_millis(10),
            guard.clone(),
            rx,
            move || {
                let counter = Arc::clone(&observed);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(PassSummary::default())
                }
            },
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0, "every trigger skipped");
        drop(held);
        tokio::time::sleep(Duration::from_millis(40)).await;
        tx.send(true).expect("shutdown signal");
        handle.await.expect("loop exits cleanly");
        assert!(counter.load(Ordering::SeqCst) >= 1, "runs resume once free");
    }

    #[tokio::test]
    async fn failing_jobs_do_not_kill_the_loop() {
        let (tx, rx) = watch::channel(false);
        let counter = Arc::new(AtomicU32::new(0));
        let observed = Arc::clone(&counter);

        let handle = spawn_recurring(
            JobKind::DownloadCleaner,
            Duration::from_millis(10),
            JobGuard::new(),
            rx,
            move || {
                let counter = Arc::clone(&observed);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    anyhow::bail!("store unavailable")
                }
            },
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        tx.send(true).expect("shutdown signal");
        handle.await.expect("loop survives failures");
        assert!(counter.load(Ordering::SeqCst) >= 2);
    }
}
