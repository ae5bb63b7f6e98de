//! Configuration models and loading for Sweeparr.
//!
//! The engine treats configuration as a read-only snapshot per pass: rules,
//! block patterns and instance definitions are loaded once at startup (or on
//! an explicit reload) and handed to the cleaners by value. Validation
//! separates hard errors (malformed rules, bad regexes) from advisories
//! (rule-coverage gaps), which are surfaced to operators without blocking.

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::load_settings;
pub use model::{
    ArrInstanceSettings, BlockAction, BlocklistSettings, CategoryRule, ClientInstanceSettings,
    DownloadCleanerSettings, LiteralMatchMode, LoggingSettings, QueueCleanerSettings, RuleScope,
    ScheduleSettings, Settings, SlowRule, StallRule, UnlinkedSettings,
};
pub use validate::{Advisory, validate_settings};
