//! Collaborator traits implemented by backend adapters and the data layer.

use std::path::Path;

use crate::model::{
    FileEntry, JobRun, JobStatus, Notice, QueuePage, StrikeOutcome, StrikeRequest, Torrent,
};
use anyhow::bail;
use async_trait::async_trait;
use sweeparr_events::{JobKind, StrikeKind};
use uuid::Uuid;

/// Download-client adapter: one implementation per torrent-client backend.
///
/// Implementations translate the canonical calls into their backend's native
/// protocol; the engine never sees anything below this seam.
#[async_trait]
pub trait DownloadClient: Send + Sync {
    /// Instance identity used in logs and events.
    fn name(&self) -> &str;

    /// Snapshot the client's torrents, optionally restricted to `hashes`.
    async fn list_torrents(&self, hashes: Option<&[String]>) -> anyhow::Result<Vec<Torrent>>;

    /// Fetch the file listing for one torrent.
    async fn get_files(&self, hash: &str) -> anyhow::Result<Vec<FileEntry>>;

    /// Mark a file as skipped (or wanted again) at the client.
    ///
    /// Must be idempotent: re-skipping an already-skipped file is a no-op.
    async fn set_file_skip(&self, hash: &str, file_index: u32, skip: bool) -> anyhow::Result<()>;

    /// Delete a torrent, optionally including its on-disk payload.
    async fn delete_torrent(&self, hash: &str, delete_files: bool) -> anyhow::Result<()>;

    /// Move a torrent into a different category.
    async fn change_category(&self, hash: &str, category: &str) -> anyhow::Result<()> {
        let _ = (hash, category);
        bail!("category changes not supported by this client");
    }
}

/// Arr-manager adapter: one implementation per media-automation backend.
#[async_trait]
pub trait ArrManager: Send + Sync {
    /// Instance identity used in logs and events.
    fn name(&self) -> &str;

    /// Fetch one page of the download queue.
    async fn queue_page(&self, page: u32, page_size: u32) -> anyhow::Result<QueuePage>;

    /// Remove a queue record, optionally instructing the arr manager to also
    /// delete the download from its client.
    async fn remove_from_queue(&self, record_id: i64, remove_from_client: bool)
    -> anyhow::Result<()>;

    /// Trigger a replacement search for the given media items.
    async fn trigger_search(&self, item_ids: &[i64]) -> anyhow::Result<()> {
        let _ = item_ids;
        bail!("replacement searches not supported by this manager");
    }
}

/// Durable store for download items and their strikes.
///
/// The strike tracker is the only writer; reporting surfaces read. All
/// mutations for one hash are serialised by the implementation so concurrent
/// evaluations cannot observe a stale count (see `record_strike`).
#[async_trait]
pub trait StrikeStore: Send + Sync {
    /// Record a violation and report whether the item is now condemned.
    ///
    /// At most one strike is recorded per (item, kind, job run); the count
    /// check and the insert happen atomically relative to concurrent strikes
    /// on the same item.
    async fn record_strike(&self, request: StrikeRequest) -> anyhow::Result<StrikeOutcome>;

    /// Delete the live strikes of `kind` for `hash`, returning the number
    /// removed. Used when qualifying progress resets the accumulation.
    async fn reset_strikes(&self, hash: &str, kind: StrikeKind) -> anyhow::Result<u64>;

    /// Live strike count for the (hash, kind) pair.
    async fn live_strike_count(&self, hash: &str, kind: StrikeKind) -> anyhow::Result<u32>;

    /// Downloaded-byte counter stored with the most recent strike of `kind`.
    async fn last_downloaded_bytes(
        &self,
        hash: &str,
        kind: StrikeKind,
    ) -> anyhow::Result<Option<i64>>;

    /// Flag the item as removed after the removal action completed, clearing
    /// its live strikes.
    async fn mark_removed(&self, hash: &str) -> anyhow::Result<()>;

    /// Delete download items that no longer own any strikes; returns the
    /// number of items removed.
    async fn delete_orphaned_items(&self) -> anyhow::Result<u64>;

    /// Maintenance entry point: delete every strike and orphaned item.
    async fn purge_all(&self) -> anyhow::Result<u64>;
}

/// Durable store for job runs.
#[async_trait]
pub trait JobRunStore: Send + Sync {
    /// Create a run row for a starting pass.
    async fn begin_run(&self, kind: JobKind) -> anyhow::Result<JobRun>;

    /// Mark a run finished with its terminal status.
    async fn finish_run(&self, run_id: Uuid, status: JobStatus) -> anyhow::Result<()>;
}

/// Fire-and-forget notification collaborator.
///
/// Failures must never fail a cleaning pass; callers log and continue.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one notice.
    async fn publish(&self, notice: Notice) -> anyhow::Result<()>;
}

/// Filesystem collaborator answering whether a payload still has a
/// hard-linked copy elsewhere on disk.
#[async_trait]
pub trait HardlinkInspector: Send + Sync {
    /// `true` if any regular file under `path` has more than one link.
    async fn has_hardlinks(&self, path: &Path) -> anyhow::Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Protocol;

    struct StubClient;

    #[async_trait]
    impl DownloadClient for StubClient {
        fn name(&self) -> &str {
            "stub"
        }

        async fn list_torrents(&self, _hashes: Option<&[String]>) -> anyhow::Result<Vec<Torrent>> {
            Ok(Vec::new())
        }

        async fn get_files(&self, _hash: &str) -> anyhow::Result<Vec<FileEntry>> {
            Ok(Vec::new())
        }

        async fn set_file_skip(
            &self,
            _hash: &str,
            _file_index: u32,
            _skip: bool,
        ) -> anyhow::Result<()> {
            Ok(())
        }

        async fn delete_torrent(&self, _hash: &str, _delete_files: bool) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct StubManager;

    #[async_trait]
    impl ArrManager for StubManager {
        fn name(&self) -> &str {
            "stub"
        }

        async fn queue_page(&self, _page: u32, _page_size: u32) -> anyhow::Result<QueuePage> {
            Ok(QueuePage {
                records: vec![crate::model::QueueRecord {
                    id: 1,
                    item_id: 10,
                    download_id: "ab".repeat(20),
                    title: "release".into(),
                    status: "downloading".into(),
                    protocol: Protocol::Torrent,
                }],
                total: 1,
            })
        }

        async fn remove_from_queue(
            &self,
            _record_id: i64,
            _remove_from_client: bool,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn default_methods_report_lack_of_support() {
        let client = StubClient;
        assert!(client.change_category("ab", "tv").await.is_err());

        let manager = StubManager;
        assert!(manager.trigger_search(&[1]).await.is_err());
        let page = manager.queue_page(0, 50).await.expect("queue page");
        assert_eq!(page.total, 1);
    }
}
