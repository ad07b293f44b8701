//! Conductor error taxonomy
//!
//! Every fatal error maps to one stable [`AbortReason`] code that is
//! reported in the final `run_ended` event. Recoverable failures (a skipped
//! search sub-query, a failed rewrite) never surface as a [`RunError`].

use crate::llm::LLMError;
use crate::search::SearchError;
use sdk::AbortReason;

/// A plan that breaks the structural rules
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanValidationError {
    #[error("plan has no steps")]
    Empty,

    #[error("plan has {0} steps, at most {max} allowed", max = super::types::MAX_PLAN_STEPS)]
    TooManySteps(usize),

    #[error("step at position {position} has id {id}, expected {position}")]
    NonContiguousId { position: usize, id: usize },

    #[error("step {step} depends on step {dependency}, which does not precede it")]
    ForwardDependency { step: usize, dependency: usize },
}

/// Planning failed
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlanGenerationError {
    #[error("plan request failed: {0}")]
    Llm(#[from] LLMError),

    #[error("plan output is malformed: {0}")]
    Malformed(String),

    #[error("plan is invalid: {0}")]
    Invalid(#[from] PlanValidationError),
}

impl PlanGenerationError {
    pub fn reason(&self) -> AbortReason {
        match self {
            PlanGenerationError::Invalid(_) => AbortReason::PlanValidation,
            _ => AbortReason::PlanGeneration,
        }
    }
}

/// Search-query derivation failed for a step
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueryDerivationError {
    #[error("query derivation request failed: {0}")]
    Llm(#[from] LLMError),

    #[error("query derivation output is malformed: {0}")]
    Malformed(String),

    #[error("derived {0} search queries, expected between 1 and 3")]
    Count(usize),

    #[error("derived search query {0} is blank")]
    BlankQuery(usize),
}

/// The query rewrite failed; the raw query is used instead
#[derive(Debug, Clone, thiserror::Error)]
pub enum RewriteError {
    #[error("rewrite request failed: {0}")]
    Llm(#[from] LLMError),

    #[error("rewrite produced an empty query")]
    Empty,
}

/// A fatal error that aborts a run
#[derive(Debug, Clone, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Plan(#[from] PlanGenerationError),

    #[error("step {step_id}: {source}")]
    QueryDerivation {
        step_id: usize,
        source: QueryDerivationError,
    },

    #[error("step {step_id}: all {attempted} search queries failed (last error: {last})")]
    SearchExhausted {
        step_id: usize,
        attempted: usize,
        last: SearchError,
    },

    #[error("answer generation failed: {0}")]
    Summarization(LLMError),

    #[error("session {0} already has a run in progress")]
    SessionBusy(String),

    #[error("session store failed: {0}")]
    SessionStore(String),

    #[error("run cancelled")]
    Cancelled,
}

impl RunError {
    /// Stable reason code reported to observers
    pub fn reason(&self) -> AbortReason {
        match self {
            RunError::Plan(e) => e.reason(),
            RunError::QueryDerivation { .. } => AbortReason::QueryDerivation,
            RunError::SearchExhausted { .. } => AbortReason::SearchExhausted,
            RunError::Summarization(_) => AbortReason::Summarization,
            RunError::SessionBusy(_) => AbortReason::SessionBusy,
            RunError::SessionStore(_) => AbortReason::SessionStore,
            RunError::Cancelled => AbortReason::Cancelled,
        }
    }
}
