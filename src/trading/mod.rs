//! Trade lifecycle: signal evaluation, sizing, order orchestration,
//! position supervision, and forced close.

mod close;
mod orchestrator;
mod signal;
mod sizer;
mod supervisor;

pub use orchestrator::{EntryOutcome, OrderOrchestrator};
pub use signal::{EntrySignal, SignalEvaluator};
pub use sizer::PositionSizer;
pub use supervisor::PositionSupervisor;

/// Tracing target for events that require operator attention. Kept apart
/// from ordinary error logging so alerting can key on it.
pub const CRITICAL: &str = "critical";
