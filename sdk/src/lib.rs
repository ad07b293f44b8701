//! Ross SDK
//!
//! Shared types for Ross components and clients: the engine error type and
//! the progress events a run streams to its observer.

/// Error types and handling
pub mod errors;

/// Progress event contract
pub mod events;

// Re-export commonly used types
pub use errors::{EngineError, ErrorExt};
pub use events::{AbortReason, EventKind, PlanStepSummary, PlanSummary, ProgressEvent, RunStatus, SourceRef};
