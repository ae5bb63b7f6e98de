//! Core event bus for the Sweeparr platform.
//!
//! The bus provides a typed event enum, sequential identifiers, and support
//! for replaying recent events when subscribers reconnect. Internally it uses
//! `tokio::broadcast` with a bounded buffer; when the channel overflows, the
//! oldest events are dropped, matching the desired backpressure behaviour.
//!
//! Cleaning passes publish here so that reporting surfaces and the
//! notification collaborator observe the same stream of decisions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};
use uuid::Uuid;

/// Identifier assigned to each event emitted by the platform.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Kind of scheduled pass that produced an event.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Queue supervision pass against the arr managers.
    QueueCleaner,
    /// Seed-complete / unlinked cleanup pass against the download clients.
    DownloadCleaner,
}

impl JobKind {
    /// Machine-friendly label used in logs and persisted job-run rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::QueueCleaner => "queue_cleaner",
            Self::DownloadCleaner => "download_cleaner",
        }
    }
}

/// Rule-violation category recorded against a download item.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StrikeKind {
    /// Transfer reported a downloading state without forward progress.
    Stalled,
    /// Transfer stayed below the configured minimum speed.
    Slow,
    /// Every wanted file of the transfer was blocked by content filtering.
    FailedImport,
}

impl StrikeKind {
    /// Machine-friendly label used in logs and persisted strike rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stalled => "stalled",
            Self::Slow => "slow",
            Self::FailedImport => "failed_import",
        }
    }
}

/// Severity attached to notifications derived from events.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Typed domain events surfaced across the system.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    JobRunStarted {
        run_id: Uuid,
        kind: JobKind,
        dry_run: bool,
    },
    JobRunCompleted {
        run_id: Uuid,
        kind: JobKind,
        items_processed: u64,
        removals: u64,
    },
    JobRunFailed {
        run_id: Uuid,
        kind: JobKind,
        message: String,
    },
    StrikeRecorded {
        hash: String,
        name: String,
        kind: StrikeKind,
        count: u32,
        max_strikes: u32,
    },
    StrikesReset {
        hash: String,
        kind: StrikeKind,
    },
    ItemCondemned {
        hash: String,
        name: String,
        kind: StrikeKind,
    },
    QueueRecordRemoved {
        hash: String,
        title: String,
        instance: String,
        deleted_from_client: bool,
        dry_run: bool,
    },
    FilesBlocked {
        hash: String,
        name: String,
        blocked: u32,
        total: u32,
        fully_blocked: bool,
        dry_run: bool,
    },
    DownloadCleaned {
        hash: String,
        name: String,
        category: String,
        ratio: f64,
        seeding_seconds: i64,
        deleted_files: bool,
        dry_run: bool,
    },
    TorrentRecategorized {
        hash: String,
        name: String,
        from_category: String,
        to_category: String,
        dry_run: bool,
    },
    InstanceFailed {
        instance: String,
        message: String,
    },
    ConfigAdvisory {
        message: String,
    },
}

impl Event {
    /// Machine-friendly discriminator for downstream consumers.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Event::JobRunStarted { .. } => "job_run_started",
            Event::JobRunCompleted { .. } => "job_run_completed",
            Event::JobRunFailed { .. } => "job_run_failed",
            Event::StrikeRecorded { .. } => "strike_recorded",
            Event::StrikesReset { .. } => "strikes_reset",
            Event::ItemCondemned { .. } => "item_condemned",
            Event::QueueRecordRemoved { .. } => "queue_record_removed",
            Event::FilesBlocked { .. } => "files_blocked",
            Event::DownloadCleaned { .. } => "download_cleaned",
            Event::TorrentRecategorized { .. } => "torrent_recategorized",
            Event::InstanceFailed { .. } => "instance_failed",
            Event::ConfigAdvisory { .. } => "config_advisory",
        }
    }

    /// Severity the notification collaborator should attach to this event.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Event::JobRunStarted { .. }
            | Event::JobRunCompleted { .. }
            | Event::StrikeRecorded { .. }
            | Event::StrikesReset { .. }
            | Event::FilesBlocked { .. }
            | Event::DownloadCleaned { .. }
            | Event::TorrentRecategorized { .. }
            | Event::QueueRecordRemoved { .. } => Severity::Info,
            Event::ItemCondemned { .. } | Event::InstanceFailed { .. } | Event::ConfigAdvisory { .. } => {
                Severity::Warning
            }
            Event::JobRunFailed { .. } => Severity::Error,
        }
    }

    /// Structured payload handed to the notification collaborator.
    ///
    /// # Panics
    ///
    /// Panics if the event cannot be serialised, which would indicate a bug
    /// in the serde derives rather than a runtime condition.
    #[must_use]
    pub fn payload(&self) -> Value {
        serde_json::to_value(self).expect("event serialisation is infallible")
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<std::sync::atomic::AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a new bus with the provided broadcast capacity.
    ///
    /// The broadcast channel uses the same capacity as the in-memory replay
    /// buffer, ensuring dropped events impact both structures consistently.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(std::sync::atomic::AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default in-memory buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish a new event to the bus, assigning it a sequential identifier.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.buffer.lock().expect("event buffer mutex poisoned");
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to the bus, replaying any buffered events newer than `since_id`.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let mut backlog = VecDeque::new();
        if let Some(since) = since_id {
            let buffer = self.buffer.lock().expect("event buffer mutex poisoned");
            for item in buffer.iter() {
                if item.id > since {
                    backlog.push_back(item.clone());
                }
            }
        }

        let receiver = self.sender.subscribe();
        EventStream { backlog, receiver }
    }

    /// Returns the last assigned identifier, if any events have been published.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        let buffer = self.buffer.lock().expect("event buffer mutex poisoned");
        buffer.back().map(|event| event.id)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper that yields events either from the replay backlog or from
/// the live broadcast channel.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event, respecting the replay backlog first.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(_)) => self.receiver.recv().await.ok(),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_strike_event(count: u32) -> Event {
        Event::StrikeRecorded {
            hash: format!("{count:040x}"),
            name: "Some.Release.1080p".to_string(),
            kind: StrikeKind::Stalled,
            count,
            max_strikes: 3,
        }
    }

    #[tokio::test]
    async fn sequential_ids_and_replay() {
        let bus = EventBus::with_capacity(16);

        let mut last_id = 0;
        for i in 0..5 {
            last_id = bus.publish(sample_strike_event(i));
        }
        assert_eq!(last_id, 5);

        let mut stream = bus.subscribe(Some(2));
        let mut received = Vec::new();
        for _ in 0..3 {
            if let Some(event) = stream.next().await {
                received.push(event);
            }
        }

        assert_eq!(received.len(), 3);
        assert_eq!(received.first().unwrap().id, 3);
        assert_eq!(received.last().unwrap().id, 5);
    }

    #[test]
    fn severity_escalates_with_outcome() {
        assert_eq!(sample_strike_event(1).severity(), Severity::Info);
        assert_eq!(
            Event::ItemCondemned {
                hash: "ab".repeat(20),
                name: "stuck".into(),
                kind: StrikeKind::Stalled,
            }
            .severity(),
            Severity::Warning
        );
        assert_eq!(
            Event::JobRunFailed {
                run_id: Uuid::nil(),
                kind: JobKind::QueueCleaner,
                message: "store unavailable".into(),
            }
            .severity(),
            Severity::Error
        );
    }

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(JobKind::QueueCleaner.as_str(), "queue_cleaner");
        assert_eq!(StrikeKind::FailedImport.as_str(), "failed_import");
        assert_eq!(sample_strike_event(1).kind(), "strike_recorded");
    }
}
