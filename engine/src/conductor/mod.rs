//! Conductor System
//!
//! Plans a query into search steps, executes them in dependency order,
//! and streams a cited answer.

pub mod context;
pub mod controller;
pub mod error;
pub mod events;
pub mod executor;
pub mod planner;
pub mod prompts;
pub mod rewriter;
pub mod summarizer;
pub mod types;

pub use controller::{Conductor, RunRequest, RunSettings};
pub use error::{PlanGenerationError, PlanValidationError, QueryDerivationError, RunError};
pub use events::{EventSink, Transition};
pub use executor::StepExecutor;
pub use planner::Planner;
pub use rewriter::QueryRewriter;
pub use summarizer::{Answer, Summarizer};
pub use types::{ChatMessage, ChatRole, Plan, ResultTracker, RunState, SearchResult, Step, StepResult};
