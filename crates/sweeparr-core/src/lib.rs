//! Backend-agnostic domain model and collaborator traits for Sweeparr.
//!
//! Every download-client and arr-manager backend is reduced to the canonical
//! types in [`model`] and the `async` traits in [`service`]; the cleaning
//! engine depends only on those seams and never on a concrete protocol.

pub mod error;
pub mod model;
pub mod service;

pub use error::{AdapterError, AdapterResult};
pub use model::{
    DownloadItem, FileEntry, JobRun, JobStatus, Notice, Protocol, QueuePage, QueueRecord, Strike,
    StrikeOutcome, StrikeRequest, Torrent, TorrentState, normalize_hash,
};
pub use service::{ArrManager, DownloadClient, HardlinkInspector, JobRunStore, Notifier, StrikeStore};
pub use sweeparr_events::{JobKind, StrikeKind};
