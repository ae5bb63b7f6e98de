//! Dry-run gate for external mutations.
//!
//! Every mutation the engine issues against a download client or arr
//! manager flows through here. With dry-run enabled the gate logs the
//! intent and short-circuits; reads and strike persistence are never gated,
//! so strike accumulation behaves identically in both modes.

use sweeparr_core::{ArrManager, DownloadClient};
use tracing::info;

/// Intercepts external mutations when dry-run mode is active.
#[derive(Debug, Clone, Copy)]
pub struct MutationGate {
    dry_run: bool,
}

impl MutationGate {
    #[must_use]
    pub const fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    #[must_use]
    pub const fn is_dry_run(self) -> bool {
        self.dry_run
    }

    /// Delete a torrent from the client, optionally with its payload.
    pub async fn delete_torrent(
        self,
        client: &dyn DownloadClient,
        hash: &str,
        delete_files: bool,
    ) -> anyhow::Result<()> {
        if self.dry_run {
            info!(
                client = client.name(),
                hash, delete_files, "dry run: would delete torrent"
            );
            return Ok(());
        }
        client.delete_torrent(hash, delete_files).await
    }

    /// Mark a file skipped at the client.
    pub async fn set_file_skip(
        self,
        client: &dyn DownloadClient,
        hash: &str,
        file_index: u32,
    ) -> anyhow::Result<()> {
        if self.dry_run {
            info!(
                client = client.name(),
                hash, file_index, "dry run: would mark file skipped"
            );
            return Ok(());
        }
        client.set_file_skip(hash, file_index, true).await
    }

    /// Move a torrent into a different category.
    pub async fn change_category(
        self,
        client: &dyn DownloadClient,
        hash: &str,
        category: &str,
    ) -> anyhow::Result<()> {
        if self.dry_run {
            info!(
                client = client.name(),
                hash, category, "dry run: would change category"
            );
            return Ok(());
        }
        client.change_category(hash, category).await
    }

    /// Remove a queue record from the arr manager.
    pub async fn remove_from_queue(
        self,
        manager: &dyn ArrManager,
        record_id: i64,
        remove_from_client: bool,
    ) -> anyhow::Result<()> {
        if self.dry_run {
            info!(
                manager = manager.name(),
                record_id, remove_from_client, "dry run: would remove queue record"
            );
            return Ok(());
        }
        manager.remove_from_queue(record_id, remove_from_client).await
    }

    /// Trigger a replacement search for the given media items.
    pub async fn trigger_search(
        self,
        manager: &dyn ArrManager,
        item_ids: &[i64],
    ) -> anyhow::Result<()> {
        if self.dry_run {
            info!(
                manager = manager.name(),
                ?item_ids,
                "dry run: would trigger replacement search"
            );
            return Ok(());
        }
        manager.trigger_search(item_ids).await
    }
}
