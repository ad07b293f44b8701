//! Conductor Planner
//!
//! Asks the LLM for a structured query plan and validates it into a [`Plan`].
//! There is no retry and no fallback plan: a plan that cannot be produced
//! aborts the run.

use crate::conductor::error::PlanGenerationError;
use crate::conductor::prompts;
use crate::conductor::types::{Plan, Step};
use crate::llm::{self, LLMError, LLMProvider};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

pub struct Planner {
    llm: Arc<dyn LLMProvider>,
    timeout: Duration,
}

/// Intermediate deserialization type for LLM JSON output
#[derive(Debug, Deserialize)]
struct RawPlan {
    steps: Vec<RawPlanStep>,
}

#[derive(Debug, Deserialize)]
struct RawPlanStep {
    id: usize,
    step: String,
    #[serde(default)]
    dependencies: Vec<usize>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LLMProvider>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Generate a validated plan for a query
    pub async fn generate_plan(&self, query: &str) -> Result<Plan, PlanGenerationError> {
        let messages = prompts::plan_messages(query);
        let schema = prompts::plan_schema();

        let raw: RawPlan = tokio::time::timeout(
            self.timeout,
            llm::generate_typed(self.llm.as_ref(), &messages, &schema),
        )
        .await
        .map_err(|_| LLMError::Timeout)?
        .map_err(|e| match e {
            LLMError::ParseError(msg) => PlanGenerationError::Malformed(msg),
            other => PlanGenerationError::Llm(other),
        })?;

        let plan = Self::into_plan(raw)?;
        tracing::info!(steps = plan.len(), "Plan generated");
        Ok(plan)
    }

    fn into_plan(raw: RawPlan) -> Result<Plan, PlanGenerationError> {
        let steps = raw
            .steps
            .into_iter()
            .map(|s| Step::new(s.id, s.step, s.dependencies))
            .collect();
        Ok(Plan::new(steps)?)
    }
}
