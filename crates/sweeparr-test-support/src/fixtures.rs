//! Test fixtures and environment helpers.

use std::path::Path;
use std::process::Command;

use sweeparr_core::{FileEntry, Protocol, QueueRecord, Torrent, TorrentState};

/// Returns `true` if a Docker daemon is reachable for integration tests.
#[must_use]
pub fn docker_available() -> bool {
    docker_available_with_host(std::env::var("DOCKER_HOST").ok())
}

fn docker_available_with_host(host: Option<String>) -> bool {
    if let Some(host) = host {
        if let Some(path) = host.strip_prefix("unix://") {
            return Path::new(path).exists();
        }
        return true;
    }

    Path::new("/var/run/docker.sock").exists()
        || Command::new("docker")
            .args(["info"])
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
}

/// Canonical torrent snapshot with sensible defaults for engine tests.
#[must_use]
pub fn sample_torrent(hash: &str) -> Torrent {
    Torrent {
        hash: hash.to_string(),
        name: "Some.Release.1080p.WEB-DL".to_string(),
        category: "tv".to_string(),
        is_private: false,
        state: TorrentState::Downloading,
        size_bytes: 1_000_000,
        downloaded_bytes: 400_000,
        download_bps: 512_000,
        ratio: 0.0,
        eta_seconds: Some(1_200),
        seeding_seconds: 0,
        save_path: "/downloads/Some.Release.1080p.WEB-DL".to_string(),
        files: None,
    }
}

/// Queue record joined against [`sample_torrent`] by hash.
#[must_use]
pub fn sample_queue_record(id: i64, hash: &str) -> QueueRecord {
    QueueRecord {
        id,
        item_id: id * 10,
        download_id: hash.to_string(),
        title: "Some.Release.1080p.WEB-DL".to_string(),
        status: "downloading".to_string(),
        protocol: Protocol::Torrent,
    }
}

/// File listing builder for content-filter tests.
#[must_use]
pub fn sample_files(paths: &[&str]) -> Vec<FileEntry> {
    paths
        .iter()
        .enumerate()
        .map(|(index, path)| FileEntry {
            index: u32::try_from(index).unwrap_or(u32::MAX),
            path: (*path).to_string(),
            size_bytes: 1_024,
            bytes_completed: 0,
            skipped: false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_available_respects_unix_socket_env() {
        assert!(!docker_available_with_host(Some(
            "unix:///definitely/missing.sock".into()
        )));
    }

    #[test]
    fn docker_available_accepts_tcp_env() {
        assert!(docker_available_with_host(Some(
            "tcp://127.0.0.1:2375".into()
        )));
    }

    #[test]
    fn sample_record_joins_sample_torrent() {
        let hash = "c".repeat(40);
        let torrent = sample_torrent(&hash);
        let record = sample_queue_record(1, &hash);
        assert_eq!(torrent.hash, record.download_id);
    }
}
