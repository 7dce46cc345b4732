//! Core orchestration logic.
//!
//! This module contains:
//! - Registry: Ordered, immutable stage list
//! - StatusStore: Shared per-stage run state
//! - Orchestrator: Sequential halt-on-failure execution
//! - Scheduler: Fixed-interval triggering
//! - Clock: Time source for status timestamps

pub mod clock;
pub mod orchestrator;
pub mod registry;
pub mod scheduler;
pub mod status_store;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use orchestrator::Orchestrator;
pub use registry::{ConfigError, StageRegistry};
pub use scheduler::{Scheduler, TickOutcome, DEFAULT_INTERVAL};
pub use status_store::{StageSnapshot, StatusSnapshot, StatusStore};
