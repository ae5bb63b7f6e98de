//! Adapter construction seam.
//!
//! The engine only ever sees the collaborator traits from `sweeparr-core`.
//! Turning a configured instance (a name, kind, and base URL) into a live
//! protocol client is the job of an [`AdapterFactory`] supplied by the
//! embedding integration; this crate ships only the stub that refuses.

use std::sync::Arc;

use sweeparr_cleaner::ArrTarget;
use sweeparr_config::Settings;
use sweeparr_core::DownloadClient;

use crate::error::{AppError, AppResult};

/// Live adapters produced from the settings file.
#[derive(Default)]
pub struct AdapterSet {
    /// Arr managers joined with the download client their queue points at.
    pub targets: Vec<ArrTarget>,
    /// Every distinct download client, for the seeding cleaner.
    pub clients: Vec<Arc<dyn DownloadClient>>,
}

impl std::fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterSet")
            .field("targets", &self.targets.len())
            .field("clients", &self.clients.len())
            .finish()
    }
}

/// Builds live adapters for configured instances.
pub trait AdapterFactory: Send + Sync {
    /// Construct the adapter set for the given settings.
    ///
    /// # Errors
    ///
    /// Returns an error when an instance references a backend kind the
    /// factory cannot drive; startup fails loudly rather than silently
    /// ignoring configured instances.
    fn build(&self, settings: &Settings) -> AppResult<AdapterSet>;
}

/// Default factory for builds without any compiled-in backend.
pub struct StubAdapterFactory;

impl AdapterFactory for StubAdapterFactory {
    fn build(&self, settings: &Settings) -> AppResult<AdapterSet> {
        if let Some(client) = settings.client_instances.first() {
            return Err(AppError::UnsupportedBackend {
                kind: client.kind.clone(),
                instance: client.name.clone(),
            });
        }
        if let Some(arr) = settings.arr_instances.first() {
            return Err(AppError::UnsupportedBackend {
                kind: arr.kind.clone(),
                instance: arr.name.clone(),
            });
        }
        Ok(AdapterSet::default())
    }
}
