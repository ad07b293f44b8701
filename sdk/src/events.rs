//! Progress events
//!
//! A run reports its progress as an ordered sequence of [`ProgressEvent`]s.
//! The sequence always ends with exactly one `run_ended` event, whether the
//! run produced an answer or was aborted.
//!
//! Events serialize as flat JSON objects tagged by `event`:
//!
//! ```
//! use sdk::events::{EventKind, ProgressEvent};
//!
//! let event = ProgressEvent::new("s-1", EventKind::StepStarted {
//!     step_id: 0,
//!     description: "Find recent news".to_string(),
//! });
//! let json = serde_json::to_value(&event).unwrap();
//! assert_eq!(json["event"], "step_started");
//! assert_eq!(json["session_id"], "s-1");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// One observable progress event, scoped to a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Session the run belongs to
    pub session_id: String,

    /// What happened
    #[serde(flatten)]
    pub kind: EventKind,
}

impl ProgressEvent {
    /// Create a new event for a session
    pub fn new(session_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            session_id: session_id.into(),
            kind,
        }
    }

    /// Returns true for the terminal `run_ended` event
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::RunEnded { .. })
    }
}

/// Event payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    /// The query that planning will use is known
    QueryRewritten { query: String },

    /// Planning has begun
    PlanGenerationStarted,

    /// A validated plan is available
    PlanGenerated { plan: PlanSummary },

    /// A step is about to execute
    StepStarted { step_id: usize, description: String },

    /// A step's results were committed
    StepCompleted {
        step_id: usize,
        results: usize,
        skipped_queries: usize,
    },

    /// A piece of the streamed answer
    AnswerChunk { text: String },

    /// The full answer with its numbered sources
    AnswerCompleted {
        answer: String,
        sources: Vec<SourceRef>,
    },

    /// The run is over; always the last event
    RunEnded {
        status: RunStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<AbortReason>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl EventKind {
    /// Stable event name, used as the SSE event field
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::QueryRewritten { .. } => "query_rewritten",
            EventKind::PlanGenerationStarted => "plan_generation_started",
            EventKind::PlanGenerated { .. } => "plan_generated",
            EventKind::StepStarted { .. } => "step_started",
            EventKind::StepCompleted { .. } => "step_completed",
            EventKind::AnswerChunk { .. } => "answer_chunk",
            EventKind::AnswerCompleted { .. } => "answer_completed",
            EventKind::RunEnded { .. } => "run_ended",
        }
    }
}

/// Outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Aborted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Ok => write!(f, "ok"),
            RunStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// Reason code attached to an aborted run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    PlanValidation,
    PlanGeneration,
    QueryDerivation,
    SearchExhausted,
    Summarization,
    SessionBusy,
    SessionStore,
    Cancelled,
}

impl AbortReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortReason::PlanValidation => "plan_validation",
            AbortReason::PlanGeneration => "plan_generation",
            AbortReason::QueryDerivation => "query_derivation",
            AbortReason::SearchExhausted => "search_exhausted",
            AbortReason::Summarization => "summarization",
            AbortReason::SessionBusy => "session_busy",
            AbortReason::SessionStore => "session_store",
            AbortReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-facing view of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub steps: Vec<PlanStepSummary>,
}

/// Client-facing view of one plan step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStepSummary {
    pub id: usize,
    pub description: String,
    pub dependencies: Vec<usize>,
}

/// A numbered source the answer may cite as `[index]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub index: usize,
    pub url: String,
}
