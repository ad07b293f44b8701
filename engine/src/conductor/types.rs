//! Conductor data model
//!
//! A [`Plan`] is an arena of [`Step`]s addressed by integer id; dependencies
//! are plain id lists with no back-references. Results accumulate in a
//! [`ResultTracker`] whose index always equals the step id.

use super::error::PlanValidationError;
use sdk::{PlanStepSummary, PlanSummary, RunStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on the number of steps in a plan
pub const MAX_PLAN_STEPS: usize = 4;

/// One search step of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: usize,
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<usize>,
}

impl Step {
    pub fn new(id: usize, description: impl Into<String>, dependencies: Vec<usize>) -> Self {
        Self {
            id,
            description: description.into(),
            dependencies,
        }
    }
}

/// A validated, immutable query plan.
///
/// Construction enforces:
/// - between 1 and [`MAX_PLAN_STEPS`] steps
/// - step ids are exactly `0..N` in order
/// - every dependency of step `k` is strictly less than `k`
///
/// Dependency lists are normalized to sorted, de-duplicated sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PlanData")]
pub struct Plan {
    steps: Vec<Step>,
}

#[derive(Deserialize)]
struct PlanData {
    steps: Vec<Step>,
}

impl TryFrom<PlanData> for Plan {
    type Error = PlanValidationError;

    fn try_from(data: PlanData) -> Result<Self, Self::Error> {
        Plan::new(data.steps)
    }
}

impl Plan {
    pub fn new(mut steps: Vec<Step>) -> Result<Self, PlanValidationError> {
        if steps.is_empty() {
            return Err(PlanValidationError::Empty);
        }
        if steps.len() > MAX_PLAN_STEPS {
            return Err(PlanValidationError::TooManySteps(steps.len()));
        }

        for (position, step) in steps.iter_mut().enumerate() {
            if step.id != position {
                return Err(PlanValidationError::NonContiguousId {
                    position,
                    id: step.id,
                });
            }
            if let Some(&dependency) = step.dependencies.iter().find(|&&d| d >= step.id) {
                return Err(PlanValidationError::ForwardDependency {
                    step: step.id,
                    dependency,
                });
            }
            step.dependencies.sort_unstable();
            step.dependencies.dedup();
        }

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, id: usize) -> Option<&Step> {
        self.steps.get(id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Client-facing view of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            steps: self
                .steps
                .iter()
                .map(|s| PlanStepSummary {
                    id: s.id,
                    description: s.description.clone(),
                    dependencies: s.dependencies.clone(),
                })
                .collect(),
        }
    }
}

/// A single search hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub content: String,
}

impl SearchResult {
    pub fn new(url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content: content.into(),
        }
    }
}

impl fmt::Display for SearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "URL: {}\nSummary: {}", self.url, self.content)
    }
}

/// Outcome of executing one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: Step,
    pub results: Vec<SearchResult>,
    /// Sub-queries whose search failed and were left out
    #[serde(default)]
    pub skipped_queries: Vec<String>,
}

/// Step results of one run, indexed by step id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultTracker {
    results: Vec<StepResult>,
}

impl ResultTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit the result of the next step.
    ///
    /// Steps are committed strictly in id order.
    pub fn append(&mut self, result: StepResult) {
        debug_assert_eq!(result.step.id, self.results.len());
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn is_done(&self, step_id: usize) -> bool {
        step_id < self.results.len()
    }

    pub fn get(&self, step_id: usize) -> Option<&StepResult> {
        self.results.get(step_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StepResult> {
        self.results.iter()
    }

    /// Every search hit in accumulation order
    pub fn sources(&self) -> impl Iterator<Item = &SearchResult> {
        self.results.iter().flat_map(|r| r.results.iter())
    }
}

/// Who wrote a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for ChatRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ChatRole::User),
            "assistant" => Ok(ChatRole::Assistant),
            other => Err(format!("unknown chat role '{}'", other)),
        }
    }
}

/// Append-only transcript entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Mutable state of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    pub original_query: String,
    #[serde(default)]
    pub rewritten_query: Option<String>,
    #[serde(default)]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub cursor: usize,
    #[serde(default)]
    pub tracker: ResultTracker,
    #[serde(default)]
    pub transcript: Vec<ChatMessage>,
    /// Set once the run has terminated
    #[serde(default)]
    pub outcome: Option<RunStatus>,
}

impl RunState {
    /// Fresh run state carrying over an existing conversation
    pub fn new(original_query: impl Into<String>, transcript: Vec<ChatMessage>) -> Self {
        Self {
            original_query: original_query.into(),
            rewritten_query: None,
            plan: None,
            cursor: 0,
            tracker: ResultTracker::new(),
            transcript,
            outcome: None,
        }
    }

    /// The query used for planning, once known
    pub fn query(&self) -> &str {
        self.rewritten_query
            .as_deref()
            .unwrap_or(&self.original_query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_plan_normalizes_dependencies() {
        let plan = Plan::new(vec![
            Step::new(0, "a", vec![]),
            Step::new(1, "b", vec![]),
            Step::new(2, "c", vec![1, 0, 1]),
        ])
        .unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.steps()[2].dependencies, vec![0, 1]);
    }

    #[test]
    fn test_plan_rejects_empty_and_oversized() {
        assert_eq!(Plan::new(vec![]), Err(PlanValidationError::Empty));

        let steps = (0..5).map(|i| Step::new(i, "s", vec![])).collect();
        assert_eq!(Plan::new(steps), Err(PlanValidationError::TooManySteps(5)));
    }

    #[test]
    fn test_plan_rejects_forward_and_self_dependencies() {
        let err = Plan::new(vec![
            Step::new(0, "a", vec![]),
            Step::new(1, "b", vec![2]),
            Step::new(2, "c", vec![]),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            PlanValidationError::ForwardDependency {
                step: 1,
                dependency: 2
            }
        );

        let err = Plan::new(vec![Step::new(0, "a", vec![0])]).unwrap_err();
        assert!(matches!(err, PlanValidationError::ForwardDependency { .. }));
    }

    #[test]
    fn test_plan_rejects_non_contiguous_ids() {
        let err = Plan::new(vec![Step::new(1, "a", vec![])]).unwrap_err();
        assert_eq!(err, PlanValidationError::NonContiguousId { position: 0, id: 1 });
    }

    #[test]
    fn test_plan_deserialization_validates() {
        let ok: Plan = serde_json::from_str(
            r#"{"steps":[{"id":0,"description":"a","dependencies":[]}]}"#,
        )
        .unwrap();
        assert_eq!(ok.len(), 1);

        let bad = serde_json::from_str::<Plan>(
            r#"{"steps":[{"id":0,"description":"a","dependencies":[3]}]}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_search_result_display() {
        let r = SearchResult::new("https://example.com", "An example");
        assert_eq!(r.to_string(), "URL: https://example.com\nSummary: An example");
    }

    #[test]
    fn test_tracker_sources_in_accumulation_order() {
        let mut tracker = ResultTracker::new();
        tracker.append(StepResult {
            step: Step::new(0, "a", vec![]),
            results: vec![SearchResult::new("u1", "c1"), SearchResult::new("u2", "c2")],
            skipped_queries: vec![],
        });
        tracker.append(StepResult {
            step: Step::new(1, "b", vec![0]),
            results: vec![SearchResult::new("u3", "c3")],
            skipped_queries: vec!["q".into()],
        });

        let urls: Vec<&str> = tracker.sources().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["u1", "u2", "u3"]);
        assert!(tracker.is_done(1));
        assert!(!tracker.is_done(2));
    }

    #[test]
    fn test_run_state_round_trips_through_json() {
        let mut state = RunState::new("raw", vec![ChatMessage::user("earlier")]);
        state.rewritten_query = Some("rewritten".into());
        state.plan = Some(Plan::new(vec![Step::new(0, "a", vec![])]).unwrap());

        let json = serde_json::to_string(&state).unwrap();
        let back: RunState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
        assert_eq!(back.query(), "rewritten");
    }
}
