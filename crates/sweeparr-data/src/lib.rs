#![forbid(unsafe_code)]

//! Durable store for download items, strikes, and job runs.
//!
//! Postgres implementation of the `StrikeStore` and `JobRunStore` seams.
//! Strike counts are always derived from persisted rows, never cached; every
//! per-item mutation runs in a transaction that locks the item row, so two
//! concurrent evaluations of the same hash cannot both observe `n-1` strikes
//! and miss the condemnation threshold.

pub mod store;

pub use store::CleaningStore;
