//! Shared plumbing for pass orchestration.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sweeparr_core::AdapterError;
use uuid::Uuid;

/// Cooperative cancellation flag checked between item iterations.
///
/// Cancellation never interrupts an in-flight mutation; once a removal has
/// started for one item it runs to completion.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the current pass.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Result of one scheduled pass.
#[derive(Debug, Clone, Default)]
pub struct PassSummary {
    /// Job run the pass executed under.
    pub run_id: Uuid,
    /// Queue records / torrents inspected.
    pub items_processed: u64,
    /// External removals issued (or logged, in dry-run mode).
    pub removals: u64,
    /// Instances whose adapter failed and were skipped.
    pub instances_failed: u64,
}

impl PassSummary {
    pub(crate) fn absorb(&mut self, other: &Self) {
        self.items_processed += other.items_processed;
        self.removals += other.removals;
        self.instances_failed += other.instances_failed;
    }
}

/// Whether an event warrants delivery through the notification collaborator
/// in addition to the in-process bus.
pub(crate) const fn should_notify(event: &sweeparr_events::Event) -> bool {
    use sweeparr_events::Event;
    matches!(
        event,
        Event::QueueRecordRemoved { .. }
            | Event::DownloadCleaned { .. }
            | Event::TorrentRecategorized { .. }
            | Event::InstanceFailed { .. }
            | Event::JobRunFailed { .. }
    )
}

/// Run an adapter call under the pass timeout, mapping elapsed timers into
/// [`AdapterError::Timeout`] so instance-level handling can classify them.
pub(crate) async fn with_timeout<T, F>(
    timeout: Duration,
    instance: &str,
    operation: &'static str,
    call: F,
) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(AdapterError::Timeout {
            instance: instance.to_string(),
            operation,
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_round_trips() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        let observer = flag.clone();
        flag.cancel();
        assert!(observer.is_cancelled());
    }

    #[tokio::test]
    async fn timeout_maps_to_adapter_error() {
        let result: anyhow::Result<()> = with_timeout(
            Duration::from_millis(5),
            "qbit-main",
            "list_torrents",
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;

        let error = result.expect_err("must time out");
        let adapter = error.downcast_ref::<AdapterError>().expect("adapter error");
        assert!(matches!(adapter, AdapterError::Timeout { .. }));
    }

    #[tokio::test]
    async fn fast_calls_pass_through() {
        let result = with_timeout(Duration::from_secs(1), "qbit-main", "get_files", async {
            Ok(42_u32)
        })
        .await
        .expect("fast call");
        assert_eq!(result, 42);
    }
}
