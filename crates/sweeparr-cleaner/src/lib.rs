//! The queue-cleaning decision engine.
//!
//! Everything here operates on the canonical torrent view and the
//! collaborator traits from `sweeparr-core`; no module knows which backend
//! produced the data. The engine is split along the decision pipeline:
//! content filtering ([`filter`]), rule selection ([`rules`]), verdict
//! evaluation ([`evaluate`]), strike accumulation ([`strikes`]), and the two
//! pass orchestrators ([`queue`], [`seeding`]). All external mutations go
//! through the dry-run gate ([`gate`]).

pub mod error;
pub mod evaluate;
pub mod filter;
pub mod gate;
pub mod pass;
pub mod queue;
pub mod rules;
pub mod seeding;
pub mod strikes;

pub use error::{CleanerError, CleanerResult};
pub use evaluate::{Verdict, evaluate_slow, evaluate_stall};
pub use filter::{ContentFilter, FileVerdict, FilterDecision};
pub use gate::MutationGate;
pub use pass::{CancelFlag, PassSummary};
pub use queue::{ArrTarget, QueueCleaner};
pub use rules::RuleManager;
pub use seeding::DownloadCleaner;
pub use strikes::StrikeTracker;
