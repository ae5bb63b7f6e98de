//! In-memory fake collaborators for engine and app tests.
//!
//! The fakes mirror the contracts in `sweeparr-core` closely enough for
//! scenario tests: the strike store honours per-run idempotence and the
//! count+threshold atomicity, the adapters record every mutation they are
//! asked to perform.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::bail;
use async_trait::async_trait;
use chrono::Utc;
use sweeparr_core::{
    ArrManager, DownloadClient, FileEntry, JobRun, JobStatus, JobRunStore, Notice, Notifier,
    QueuePage, QueueRecord, StrikeKind, StrikeOutcome, StrikeRequest, StrikeStore, Torrent,
    normalize_hash,
};
use sweeparr_events::JobKind;
use uuid::Uuid;

#[derive(Default)]
struct ItemState {
    title: String,
    marked_for_removal: bool,
    removed: bool,
    returning: bool,
    strikes: Vec<StrikeRow>,
}

struct StrikeRow {
    job_run_id: Uuid,
    kind: StrikeKind,
    downloaded_bytes: Option<i64>,
}

/// In-memory [`StrikeStore`] with the same observable semantics as the
/// Postgres implementation.
#[derive(Default)]
pub struct MemoryStrikeStore {
    items: Mutex<HashMap<String, ItemState>>,
}

impl MemoryStrikeStore {
    /// Whether the item behind `hash` is flagged as re-added after removal.
    ///
    /// # Panics
    ///
    /// Panics if the store mutex has been poisoned.
    #[must_use]
    pub fn is_returning(&self, hash: &str) -> bool {
        self.items
            .lock()
            .expect("store mutex poisoned")
            .get(&normalize_hash(hash))
            .is_some_and(|item| item.returning)
    }

    /// Number of download items currently held.
    ///
    /// # Panics
    ///
    /// Panics if the store mutex has been poisoned.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.lock().expect("store mutex poisoned").len()
    }
}

#[async_trait]
impl StrikeStore for MemoryStrikeStore {
    async fn record_strike(&self, request: StrikeRequest) -> anyhow::Result<StrikeOutcome> {
        let mut items = self.items.lock().expect("store mutex poisoned");
        let item = items.entry(normalize_hash(&request.hash)).or_default();
        if item.title.is_empty() {
            item.title = request.title.clone();
        }
        if item.removed {
            item.removed = false;
            item.marked_for_removal = false;
            item.returning = true;
        }

        let already = item
            .strikes
            .iter()
            .any(|row| row.job_run_id == request.job_run_id && row.kind == request.kind);
        if !already {
            item.strikes.push(StrikeRow {
                job_run_id: request.job_run_id,
                kind: request.kind,
                downloaded_bytes: request.downloaded_bytes,
            });
        }

        let live_count = u32::try_from(
            item.strikes.iter().filter(|row| row.kind == request.kind).count(),
        )
        .unwrap_or(u32::MAX);
        let condemned = live_count >= request.max_strikes;
        if condemned {
            item.marked_for_removal = true;
        }

        Ok(StrikeOutcome {
            recorded: !already,
            live_count,
            condemned,
        })
    }

    async fn reset_strikes(&self, hash: &str, kind: StrikeKind) -> anyhow::Result<u64> {
        let mut items = self.items.lock().expect("store mutex poisoned");
        let Some(item) = items.get_mut(&normalize_hash(hash)) else {
            return Ok(0);
        };
        let before = item.strikes.len();
        item.strikes.retain(|row| row.kind != kind);
        Ok((before - item.strikes.len()) as u64)
    }

    async fn live_strike_count(&self, hash: &str, kind: StrikeKind) -> anyhow::Result<u32> {
        let items = self.items.lock().expect("store mutex poisoned");
        Ok(items
            .get(&normalize_hash(hash))
            .map(|item| item.strikes.iter().filter(|row| row.kind == kind).count())
            .map(|count| u32::try_from(count).unwrap_or(u32::MAX))
            .unwrap_or(0))
    }

    async fn last_downloaded_bytes(
        &self,
        hash: &str,
        kind: StrikeKind,
    ) -> anyhow::Result<Option<i64>> {
        let items = self.items.lock().expect("store mutex poisoned");
        Ok(items.get(&normalize_hash(hash)).and_then(|item| {
            item.strikes
                .iter()
                .filter(|row| row.kind == kind)
                .last()
                .and_then(|row| row.downloaded_bytes)
        }))
    }

    async fn mark_removed(&self, hash: &str) -> anyhow::Result<()> {
        let mut items = self.items.lock().expect("store mutex poisoned");
        if let Some(item) = items.get_mut(&normalize_hash(hash)) {
            item.marked_for_removal = true;
            item.removed = true;
            item.strikes.clear();
        }
        Ok(())
    }

    async fn delete_orphaned_items(&self) -> anyhow::Result<u64> {
        let mut items = self.items.lock().expect("store mutex poisoned");
        let before = items.len();
        items.retain(|_, item| !item.strikes.is_empty());
        Ok((before - items.len()) as u64)
    }

    async fn purge_all(&self) -> anyhow::Result<u64> {
        let mut items = self.items.lock().expect("store mutex poisoned");
        let strikes: usize = items.values().map(|item| item.strikes.len()).sum();
        items.clear();
        Ok(strikes as u64)
    }
}

/// In-memory [`JobRunStore`] recording every run transition.
#[derive(Default)]
pub struct MemoryJobRunStore {
    runs: Mutex<Vec<JobRun>>,
}

impl MemoryJobRunStore {
    /// Snapshot of the recorded runs.
    ///
    /// # Panics
    ///
    /// Panics if the store mutex has been poisoned.
    #[must_use]
    pub fn runs(&self) -> Vec<JobRun> {
        self.runs.lock().expect("run mutex poisoned").clone()
    }
}

#[async_trait]
impl JobRunStore for MemoryJobRunStore {
    async fn begin_run(&self, kind: JobKind) -> anyhow::Result<JobRun> {
        let run = JobRun {
            id: Uuid::now_v7(),
            kind,
            started_at: Utc::now(),
            completed_at: None,
            status: None,
        };
        self.runs.lock().expect("run mutex poisoned").push(run.clone());
        Ok(run)
    }

    async fn finish_run(&self, run_id: Uuid, status: JobStatus) -> anyhow::Result<()> {
        let mut runs = self.runs.lock().expect("run mutex poisoned");
        if let Some(run) = runs.iter_mut().find(|run| run.id == run_id) {
            run.completed_at = Some(Utc::now());
            run.status = Some(status);
        }
        Ok(())
    }
}

/// Notifier fake that records delivered notices.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    /// Make every subsequent publish fail, for resilience tests.
    pub fn fail_deliveries(&self) {
        self.fail.store(true, Ordering::Relaxed);
    }

    /// Snapshot of the delivered notices.
    ///
    /// # Panics
    ///
    /// Panics if the notifier mutex has been poisoned.
    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().expect("notifier mutex poisoned").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, notice: Notice) -> anyhow::Result<()> {
        if self.fail.load(Ordering::Relaxed) {
            bail!("notification transport unavailable");
        }
        self.notices.lock().expect("notifier mutex poisoned").push(notice);
        Ok(())
    }
}

/// Download-client fake backed by a mutable torrent list.
pub struct FakeDownloadClient {
    name: String,
    torrents: Mutex<Vec<Torrent>>,
    files: Mutex<HashMap<String, Vec<FileEntry>>>,
    deleted: Mutex<Vec<(String, bool)>>,
    skipped: Mutex<Vec<(String, u32)>>,
    recategorized: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl FakeDownloadClient {
    #[must_use]
    pub fn new(name: &str, torrents: Vec<Torrent>) -> Self {
        Self {
            name: name.to_string(),
            torrents: Mutex::new(torrents),
            files: Mutex::new(HashMap::new()),
            deleted: Mutex::new(Vec::new()),
            skipped: Mutex::new(Vec::new()),
            recategorized: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    /// Attach a file listing for `hash`.
    ///
    /// # Panics
    ///
    /// Panics if the client mutex has been poisoned.
    pub fn with_files(self, hash: &str, files: Vec<FileEntry>) -> Self {
        self.files
            .lock()
            .expect("client mutex poisoned")
            .insert(normalize_hash(hash), files);
        self
    }

    /// Make every subsequent call fail, for instance-isolation tests.
    pub fn fail_calls(&self) {
        self.fail.store(true, Ordering::Relaxed);
    }

    /// Deletions issued against this client as `(hash, delete_files)`.
    ///
    /// # Panics
    ///
    /// Panics if the client mutex has been poisoned.
    #[must_use]
    pub fn deleted(&self) -> Vec<(String, bool)> {
        self.deleted.lock().expect("client mutex poisoned").clone()
    }

    /// Skip mutations issued against this client as `(hash, file_index)`.
    ///
    /// # Panics
    ///
    /// Panics if the client mutex has been poisoned.
    #[must_use]
    pub fn skipped(&self) -> Vec<(String, u32)> {
        self.skipped.lock().expect("client mutex poisoned").clone()
    }

    /// Category changes issued against this client as `(hash, category)`.
    ///
    /// # Panics
    ///
    /// Panics if the client mutex has been poisoned.
    #[must_use]
    pub fn recategorized(&self) -> Vec<(String, String)> {
        self.recategorized.lock().expect("client mutex poisoned").clone()
    }

    fn ensure_available(&self) -> anyhow::Result<()> {
        if self.fail.load(Ordering::Relaxed) {
            bail!("client '{}' unavailable", self.name);
        }
        Ok(())
    }
}

#[async_trait]
impl DownloadClient for FakeDownloadClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_torrents(&self, hashes: Option<&[String]>) -> anyhow::Result<Vec<Torrent>> {
        self.ensure_available()?;
        let torrents = self.torrents.lock().expect("client mutex poisoned");
        Ok(match hashes {
            Some(wanted) => {
                let wanted: Vec<String> = wanted.iter().map(|hash| normalize_hash(hash)).collect();
                torrents
                    .iter()
                    .filter(|torrent| wanted.contains(&torrent.hash))
                    .cloned()
                    .collect()
            }
            None => torrents.clone(),
        })
    }

    async fn get_files(&self, hash: &str) -> anyhow::Result<Vec<FileEntry>> {
        self.ensure_available()?;
        let files = self.files.lock().expect("client mutex poisoned");
        Ok(files.get(&normalize_hash(hash)).cloned().unwrap_or_default())
    }

    async fn set_file_skip(&self, hash: &str, file_index: u32, skip: bool) -> anyhow::Result<()> {
        self.ensure_available()?;
        let hash = normalize_hash(hash);
        if skip {
            self.skipped
                .lock()
                .expect("client mutex poisoned")
                .push((hash.clone(), file_index));
        }
        let mut files = self.files.lock().expect("client mutex poisoned");
        if let Some(listing) = files.get_mut(&hash)
            && let Some(entry) = listing.iter_mut().find(|entry| entry.index == file_index)
        {
            entry.skipped = skip;
        }
        Ok(())
    }

    async fn delete_torrent(&self, hash: &str, delete_files: bool) -> anyhow::Result<()> {
        self.ensure_available()?;
        let hash = normalize_hash(hash);
        self.deleted
            .lock()
            .expect("client mutex poisoned")
            .push((hash.clone(), delete_files));
        self.torrents
            .lock()
            .expect("client mutex poisoned")
            .retain(|torrent| torrent.hash != hash);
        Ok(())
    }

    async fn change_category(&self, hash: &str, category: &str) -> anyhow::Result<()> {
        self.ensure_available()?;
        let hash = normalize_hash(hash);
        self.recategorized
            .lock()
            .expect("client mutex poisoned")
            .push((hash.clone(), category.to_string()));
        let mut torrents = self.torrents.lock().expect("client mutex poisoned");
        if let Some(torrent) = torrents.iter_mut().find(|torrent| torrent.hash == hash) {
            torrent.category = category.to_string();
        }
        Ok(())
    }
}

/// Arr-manager fake backed by a mutable queue.
pub struct FakeArrManager {
    name: String,
    records: Mutex<Vec<QueueRecord>>,
    removed: Mutex<Vec<(i64, bool)>>,
    searched: Mutex<Vec<Vec<i64>>>,
    fail: AtomicBool,
}

impl FakeArrManager {
    #[must_use]
    pub fn new(name: &str, records: Vec<QueueRecord>) -> Self {
        Self {
            name: name.to_string(),
            records: Mutex::new(records),
            removed: Mutex::new(Vec::new()),
            searched: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    /// Make every subsequent call fail, for instance-isolation tests.
    pub fn fail_calls(&self) {
        self.fail.store(true, Ordering::Relaxed);
    }

    /// Queue removals issued as `(record_id, remove_from_client)`.
    ///
    /// # Panics
    ///
    /// Panics if the manager mutex has been poisoned.
    #[must_use]
    pub fn removed(&self) -> Vec<(i64, bool)> {
        self.removed.lock().expect("manager mutex poisoned").clone()
    }

    /// Replacement searches triggered, one entry per call.
    ///
    /// # Panics
    ///
    /// Panics if the manager mutex has been poisoned.
    #[must_use]
    pub fn searched(&self) -> Vec<Vec<i64>> {
        self.searched.lock().expect("manager mutex poisoned").clone()
    }

    fn ensure_available(&self) -> anyhow::Result<()> {
        if self.fail.load(Ordering::Relaxed) {
            bail!("manager '{}' unavailable", self.name);
        }
        Ok(())
    }
}

#[async_trait]
impl ArrManager for FakeArrManager {
    fn name(&self) -> &str {
        &self.name
    }

    async fn queue_page(&self, page: u32, page_size: u32) -> anyhow::Result<QueuePage> {
        self.ensure_available()?;
        let records = self.records.lock().expect("manager mutex poisoned");
        let start = ((page.max(1) - 1) as usize) * page_size as usize;
        let slice: Vec<QueueRecord> = records
            .iter()
            .skip(start)
            .take(page_size as usize)
            .cloned()
            .collect();
        Ok(QueuePage {
            records: slice,
            total: records.len() as u64,
        })
    }

    async fn remove_from_queue(
        &self,
        record_id: i64,
        remove_from_client: bool,
    ) -> anyhow::Result<()> {
        self.ensure_available()?;
        self.removed
            .lock()
            .expect("manager mutex poisoned")
            .push((record_id, remove_from_client));
        self.records
            .lock()
            .expect("manager mutex poisoned")
            .retain(|record| record.id != record_id);
        Ok(())
    }

    async fn trigger_search(&self, item_ids: &[i64]) -> anyhow::Result<()> {
        self.ensure_available()?;
        self.searched
            .lock()
            .expect("manager mutex poisoned")
            .push(item_ids.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{sample_queue_record, sample_torrent};

    #[tokio::test]
    async fn strike_store_counts_per_kind() {
        let store = MemoryStrikeStore::default();
        let hash = "a".repeat(40);
        for kind in [StrikeKind::Stalled, StrikeKind::Slow] {
            store
                .record_strike(StrikeRequest {
                    hash: hash.clone(),
                    title: "release".into(),
                    kind,
                    job_run_id: Uuid::now_v7(),
                    max_strikes: 3,
                    downloaded_bytes: None,
                })
                .await
                .expect("record");
        }
        assert_eq!(store.live_strike_count(&hash, StrikeKind::Stalled).await.unwrap(), 1);
        assert_eq!(store.live_strike_count(&hash, StrikeKind::Slow).await.unwrap(), 1);
        assert_eq!(store.live_strike_count(&hash, StrikeKind::FailedImport).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn removed_item_returns_on_next_strike() {
        let store = MemoryStrikeStore::default();
        let hash = "b".repeat(40);
        store
            .record_strike(StrikeRequest {
                hash: hash.clone(),
                title: "release".into(),
                kind: StrikeKind::Stalled,
                job_run_id: Uuid::now_v7(),
                max_strikes: 1,
                downloaded_bytes: None,
            })
            .await
            .expect("record");
        store.mark_removed(&hash).await.expect("mark removed");
        assert!(!store.is_returning(&hash));

        store
            .record_strike(StrikeRequest {
                hash: hash.clone(),
                title: "release".into(),
                kind: StrikeKind::Stalled,
                job_run_id: Uuid::now_v7(),
                max_strikes: 3,
                downloaded_bytes: None,
            })
            .await
            .expect("record");
        assert!(store.is_returning(&hash), "re-striking a removed hash flags a requeue");
    }

    #[tokio::test]
    async fn fake_client_pages_and_mutations_record() {
        let hash = "c".repeat(40);
        let client = FakeDownloadClient::new("qbit", vec![sample_torrent(&hash)]);
        client.delete_torrent(&hash.to_uppercase(), true).await.expect("delete");
        assert_eq!(client.deleted(), vec![(hash.clone(), true)]);
        assert!(client.list_torrents(None).await.expect("list").is_empty());

        let manager = FakeArrManager::new(
            "sonarr",
            (1..=3).map(|id| sample_queue_record(id, &hash)).collect(),
        );
        let page = manager.queue_page(1, 2).await.expect("page");
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.total, 3);
        let page = manager.queue_page(2, 2).await.expect("page");
        assert_eq!(page.records.len(), 1);
    }
}
