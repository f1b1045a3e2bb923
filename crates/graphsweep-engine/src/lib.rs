//! graphsweep Engine - cleanup run orchestration
//!
//! Drives one cleanup run across host ticks: backup snapshot, collection
//! and resolution, removal, counting, closing snapshot. Also provides the
//! built-in catch-all addon and the progress seam a host UI plugs into.

pub mod default_addon;
pub mod orchestrator;
pub mod progress;
pub mod report;

pub use default_addon::{register_default_addon, DefaultAddon};
pub use orchestrator::{CleanupContext, CleanupOrchestrator, RunState, SubPhase};
pub use progress::{MessageLevel, NoopProgress, ProgressEvent, ProgressSink, RecordingProgress};
pub use report::{BlockedRemoval, RunOutcome, RunReport, RunSnapshots};

/// Result type of the engine boundary
pub type Result<T> = std::result::Result<T, graphsweep_core::ExError>;
