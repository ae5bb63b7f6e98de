//! Application wiring for Sweeparr: configuration, telemetry, the durable
//! store, and the recurring pass scheduler.
//!
//! Concrete backend protocol clients are integration points, not part of
//! this crate: the [`adapters::AdapterFactory`] seam turns configured
//! instances into live adapters, and the default factory rejects anything
//! it does not know how to build.

pub mod adapters;
pub mod bootstrap;
pub mod error;
pub mod scheduler;

pub use adapters::{AdapterFactory, AdapterSet, StubAdapterFactory};
pub use bootstrap::{run_app, run_app_with};
pub use error::{AppError, AppResult};
pub use scheduler::{JobGuard, spawn_recurring};
