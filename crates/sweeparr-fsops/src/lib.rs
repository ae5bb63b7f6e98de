//! Filesystem collaborator: hardlink detection for the unlinked policy.
//!
//! A torrent payload that has been imported into the media library via
//! hardlinks reports a link count above one on its files; a payload with no
//! such copy is safe to quarantine instead of seeding forever. Detection
//! walks the payload path on a blocking thread so the async pass never
//! stalls on disk IO.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sweeparr_core::HardlinkInspector;
use tracing::debug;
use walkdir::WalkDir;

/// [`HardlinkInspector`] backed by a filesystem walk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsHardlinkInspector;

impl FsHardlinkInspector {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HardlinkInspector for FsHardlinkInspector {
    async fn has_hardlinks(&self, path: &Path) -> Result<bool> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || scan_for_hardlinks(&path))
            .await
            .context("hardlink scan task aborted")?
    }
}

fn scan_for_hardlinks(path: &PathBuf) -> Result<bool> {
    if !path.exists() {
        anyhow::bail!("payload path '{}' does not exist", path.display());
    }

    for entry in WalkDir::new(path) {
        let entry = entry.with_context(|| format!("failed to walk '{}'", path.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = entry
            .metadata()
            .with_context(|| format!("failed to stat '{}'", entry.path().display()))?;
        if link_count(&metadata) > 1 {
            debug!(file = %entry.path().display(), "hardlinked copy found");
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(unix)]
fn link_count(metadata: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.nlink()
}

#[cfg(not(unix))]
fn link_count(_metadata: &std::fs::Metadata) -> u64 {
    // Link counts are not portable off unix; report everything as linked so
    // the quarantine policy never fires on a platform we cannot inspect.
    2
}
