//! Canonical torrent view and persistent-entity DTOs shared across the workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sweeparr_events::{Event, JobKind, Severity, StrikeKind};
use uuid::Uuid;

/// Normalise a torrent hash into the canonical lowercase compare key.
///
/// The hash is the only cross-run identity of a transfer; every comparison
/// and persistence key goes through this form.
#[must_use]
pub fn normalize_hash(hash: &str) -> String {
    hash.trim().to_ascii_lowercase()
}

/// High-level transfer states that the cleaning engine cares about.
///
/// Adapters map their backend's native state strings into this enum; states
/// without a counterpart collapse to [`TorrentState::Unknown`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TorrentState {
    Queued,
    Downloading,
    /// Downloading state reported with no connected seeds/progress.
    Stalled,
    Paused,
    Seeding,
    Completed,
    Unknown,
}

/// Backend-agnostic read model of one torrent/transfer.
///
/// Constructed fresh on every poll from adapter data and never persisted;
/// the `hash` field must already be in [`normalize_hash`] form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Torrent {
    /// Canonical lowercase info-hash.
    pub hash: String,
    /// Display name reported by the client.
    pub name: String,
    /// Category/label assigned in the client; may change between runs.
    pub category: String,
    /// Whether the torrent's tracker is private.
    pub is_private: bool,
    /// Current lifecycle state.
    pub state: TorrentState,
    /// Total payload size in bytes.
    pub size_bytes: u64,
    /// Bytes downloaded so far.
    pub downloaded_bytes: u64,
    /// Current download rate in bytes per second.
    pub download_bps: u64,
    /// Share ratio reported by the client.
    pub ratio: f64,
    /// Estimated seconds until completion, when the client reports one.
    pub eta_seconds: Option<u64>,
    /// Accumulated seeding time in seconds.
    pub seeding_seconds: i64,
    /// Save path of the payload on the client's filesystem.
    pub save_path: String,
    /// Per-file listing when the adapter supplied one.
    pub files: Option<Vec<FileEntry>>,
}

impl Torrent {
    /// Completion percentage derived from byte counters, clamped to [0, 100].
    #[must_use]
    pub fn completion_percent(&self) -> f64 {
        if self.size_bytes == 0 {
            return 0.0;
        }
        let percent = (to_f64(self.downloaded_bytes) / to_f64(self.size_bytes)) * 100.0;
        percent.clamp(0.0, 100.0)
    }

    /// Whether the transfer is in a state where stall/slow policies apply.
    #[must_use]
    pub const fn is_downloading(&self) -> bool {
        matches!(self.state, TorrentState::Downloading | TorrentState::Stalled)
    }

    /// Whether the client itself reports the transfer as stalled.
    #[must_use]
    pub const fn is_stalled(&self) -> bool {
        matches!(self.state, TorrentState::Stalled)
    }

    /// Whether the payload has fully downloaded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.completion_percent() >= 100.0
    }
}

const fn to_f64(value: u64) -> f64 {
    #[expect(
        clippy::cast_precision_loss,
        reason = "u64 to f64 conversion is required for completion percentage reporting"
    )]
    {
        value as f64
    }
}

/// Individual file exposed by a torrent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileEntry {
    /// Index of the file within the torrent payload.
    pub index: u32,
    /// Relative path of the file within the torrent payload.
    pub path: String,
    /// Total size of the file in bytes.
    pub size_bytes: u64,
    /// Bytes downloaded so far for this file.
    pub bytes_completed: u64,
    /// Whether the file is already excluded from download at the client.
    pub skipped: bool,
}

/// Transfer protocol of a queue record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Torrent,
    Usenet,
}

/// One row of an arr manager's download queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueRecord {
    /// Queue record identifier within the arr manager.
    pub id: i64,
    /// Media item the record belongs to, used for replacement searches.
    pub item_id: i64,
    /// External download id; for torrents this is the info-hash.
    pub download_id: String,
    /// Release title.
    pub title: String,
    /// Raw status string reported by the arr manager.
    pub status: String,
    /// Transfer protocol of the underlying download.
    pub protocol: Protocol,
}

/// One page of queue records together with the total count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuePage {
    pub records: Vec<QueueRecord>,
    pub total: u64,
}

/// Persistent identity for a supervised download.
///
/// Created on the first strike against a hash; survives until an explicit
/// purge or until it no longer owns any strikes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadItem {
    pub id: Uuid,
    /// Natural key: canonical lowercase hash, unique.
    pub hash: String,
    pub title: String,
    /// Set once the item has been condemned and queued for removal.
    pub marked_for_removal: bool,
    /// Set after the removal action completed.
    pub removed: bool,
    /// Set when the same hash reappears after a removal.
    pub returning: bool,
}

/// One recorded rule violation. Append-only; never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strike {
    pub id: Uuid,
    pub item_id: Uuid,
    /// Job run that observed the violation.
    pub job_run_id: Uuid,
    pub kind: StrikeKind,
    pub created_at: DateTime<Utc>,
    /// Downloaded-byte counter at strike time, used for progress resets.
    pub last_downloaded_bytes: Option<i64>,
}

/// Terminal status of a job run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Failed,
}

impl JobStatus {
    /// Label persisted in the job-run table.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// One scheduled pass, referenced by the strikes it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    /// Time-sortable identifier (UUID v7).
    pub id: Uuid,
    pub kind: JobKind,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// `None` while the run is still executing.
    pub status: Option<JobStatus>,
}

/// Input for recording one strike against a download item.
#[derive(Debug, Clone)]
pub struct StrikeRequest {
    /// Canonical lowercase hash of the transfer.
    pub hash: String,
    /// Display title used when the item row is first created.
    pub title: String,
    pub kind: StrikeKind,
    /// Job run the strike belongs to; at most one strike is recorded per
    /// (item, kind, run).
    pub job_run_id: Uuid,
    /// Strike threshold of the matched rule.
    pub max_strikes: u32,
    /// Downloaded-byte counter observed alongside the violation.
    pub downloaded_bytes: Option<i64>,
}

/// Result of a strike recording attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrikeOutcome {
    /// Whether a new strike row was inserted (false when the run already
    /// recorded one for this item and kind).
    pub recorded: bool,
    /// Live strike count for the (item, kind) pair after the call.
    pub live_count: u32,
    /// Whether the live count has reached the rule's threshold.
    pub condemned: bool,
}

/// Notification payload handed to the notification collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    /// Machine-friendly event discriminator.
    pub event_type: String,
    /// Human-readable summary.
    pub message: String,
    pub severity: Severity,
    /// Structured event payload.
    pub data: Value,
    /// Strike the notice refers to, when one exists.
    pub strike_id: Option<Uuid>,
}

impl Notice {
    /// Render a notice from a domain event.
    #[must_use]
    pub fn from_event(event: &Event) -> Self {
        Self {
            event_type: event.kind().to_string(),
            message: render_message(event),
            severity: event.severity(),
            data: event.payload(),
            strike_id: None,
        }
    }
}

fn render_message(event: &Event) -> String {
    match event {
        Event::JobRunStarted { kind, dry_run, .. } => {
            if *dry_run {
                format!("{} pass started (dry run)", kind.as_str())
            } else {
                format!("{} pass started", kind.as_str())
            }
        }
        Event::JobRunCompleted {
            kind,
            items_processed,
            removals,
            ..
        } => format!(
            "{} pass completed: {items_processed} items processed, {removals} removed",
            kind.as_str()
        ),
        Event::JobRunFailed { kind, message, .. } => {
            format!("{} pass failed: {message}", kind.as_str())
        }
        Event::StrikeRecorded {
            name,
            kind,
            count,
            max_strikes,
            ..
        } => format!("strike {count}/{max_strikes} ({}) against {name}", kind.as_str()),
        Event::StrikesReset { hash, kind } => {
            format!("{} strikes reset for {hash}", kind.as_str())
        }
        Event::ItemCondemned { name, kind, .. } => {
            format!("{name} reached the {} strike limit", kind.as_str())
        }
        Event::QueueRecordRemoved {
            title,
            instance,
            deleted_from_client,
            dry_run,
            ..
        } => {
            let action = if *deleted_from_client {
                "removed from queue and client"
            } else {
                "removed from queue"
            };
            if *dry_run {
                format!("[dry run] {title} would be {action} on {instance}")
            } else {
                format!("{title} {action} on {instance}")
            }
        }
        Event::FilesBlocked {
            name,
            blocked,
            total,
            fully_blocked,
            ..
        } => {
            if *fully_blocked {
                format!("all {total} files of {name} are blocked")
            } else {
                format!("{blocked}/{total} files of {name} blocked")
            }
        }
        Event::DownloadCleaned {
            name,
            category,
            deleted_files,
            dry_run,
            ..
        } => {
            let action = if *deleted_files {
                "deleted with source files"
            } else {
                "deleted"
            };
            if *dry_run {
                format!("[dry run] seeded-out {name} ({category}) would be {action}")
            } else {
                format!("seeded-out {name} ({category}) {action}")
            }
        }
        Event::TorrentRecategorized {
            name,
            from_category,
            to_category,
            dry_run,
            ..
        } => {
            if *dry_run {
                format!("[dry run] {name} would move from {from_category} to {to_category}")
            } else {
                format!("{name} moved from {from_category} to {to_category}")
            }
        }
        Event::InstanceFailed { instance, message } => {
            format!("instance {instance} failed: {message}")
        }
        Event::ConfigAdvisory { message } => message.clone(),
    }
}
