//! Strike accumulation: converts repeated violations into removal decisions.
//!
//! The tracker wraps the durable [`StrikeStore`] and owns the only in-memory
//! state the engine carries between passes: the slow-rule observation map
//! (hash → instant first seen below the speed threshold). Strike counts
//! themselves are always derived from persisted rows.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use sweeparr_core::{StrikeKind, StrikeOutcome, StrikeRequest, StrikeStore};
use sweeparr_events::{Event, EventBus};
use tracing::debug;

use crate::error::{CleanerError, CleanerResult};

/// Durable per-item, per-kind strike counter with threshold detection.
pub struct StrikeTracker {
    store: Arc<dyn StrikeStore>,
    events: EventBus,
    slow_since: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl StrikeTracker {
    #[must_use]
    pub fn new(store: Arc<dyn StrikeStore>, events: EventBus) -> Self {
        Self {
            store,
            events,
            slow_since: Mutex::new(HashMap::new()),
        }
    }

    /// Record a violation and report whether the item is now condemned.
    ///
    /// Safe to call repeatedly within one job run: the store records at most
    /// one strike per (item, kind, run) and the count+threshold check is
    /// atomic per item.
    ///
    /// # Errors
    ///
    /// Returns [`CleanerError::Store`] on persistence failure, which aborts
    /// the current pass.
    pub async fn record(&self, request: StrikeRequest) -> CleanerResult<StrikeOutcome> {
        let hash = request.hash.clone();
        let name = request.title.clone();
        let kind = request.kind;
        let max_strikes = request.max_strikes;

        let outcome = self
            .store
            .record_strike(request)
            .await
            .map_err(|source| CleanerError::store("record_strike", source))?;

        if outcome.recorded {
            self.events.publish(Event::StrikeRecorded {
                hash: hash.clone(),
                name: name.clone(),
                kind,
                count: outcome.live_count,
                max_strikes,
            });
        } else {
            debug!(hash, kind = kind.as_str(), "strike already recorded this run");
        }
        if outcome.condemned {
            self.events.publish(Event::ItemCondemned { hash, name, kind });
        }
        Ok(outcome)
    }

    /// Clear the live strikes of `kind` for `hash` after qualifying progress.
    ///
    /// # Errors
    ///
    /// Returns [`CleanerError::Store`] on persistence failure.
    pub async fn reset(&self, hash: &str, kind: StrikeKind) -> CleanerResult<u64> {
        let removed = self
            .store
            .reset_strikes(hash, kind)
            .await
            .map_err(|source| CleanerError::store("reset_strikes", source))?;
        if removed > 0 {
            self.events.publish(Event::StrikesReset {
                hash: hash.to_string(),
                kind,
            });
        }
        Ok(removed)
    }

    /// Downloaded-byte counter stored with the most recent strike of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`CleanerError::Store`] on persistence failure.
    pub async fn previous_bytes(&self, hash: &str, kind: StrikeKind) -> CleanerResult<Option<i64>> {
        self.store
            .last_downloaded_bytes(hash, kind)
            .await
            .map_err(|source| CleanerError::store("last_downloaded_bytes", source))
    }

    /// Flag an item removed once the removal action completed.
    ///
    /// # Errors
    ///
    /// Returns [`CleanerError::Store`] on persistence failure.
    pub async fn mark_removed(&self, hash: &str) -> CleanerResult<()> {
        self.slow_since.lock().expect("slow observation mutex poisoned").remove(hash);
        self.store
            .mark_removed(hash)
            .await
            .map_err(|source| CleanerError::store("mark_removed", source))
    }

    /// Update the slow-speed observation for `hash` and return the instant
    /// it was first seen below the threshold, or `None` when it currently
    /// is not.
    ///
    /// # Panics
    ///
    /// Panics if the observation mutex has been poisoned.
    pub fn slow_sample(&self, hash: &str, below: bool, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut map = self.slow_since.lock().expect("slow observation mutex poisoned");
        if below {
            Some(*map.entry(hash.to_string()).or_insert(now))
        } else {
            map.remove(hash);
            None
        }
    }
}
