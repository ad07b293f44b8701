//! Context Accumulator
//!
//! Renders the results of earlier steps into the text handed to the
//! search-query prompt of a dependent step.

use crate::conductor::types::{ResultTracker, StepResult};

/// Render one step's results as `Step: ...\nContext: ...`
pub fn render_step(result: &StepResult) -> String {
    let summaries = result
        .results
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n");

    format!("Step: {}\nContext: {}", result.step.description, summaries)
}

/// Context for a step with the given dependencies, in dependency order.
///
/// Dependencies that have no committed result contribute nothing. An empty
/// dependency list yields an empty string.
pub fn dependency_context(tracker: &ResultTracker, dependencies: &[usize]) -> String {
    dependencies
        .iter()
        .filter_map(|&id| tracker.get(id))
        .map(render_step)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conductor::types::{SearchResult, Step};

    fn tracker() -> ResultTracker {
        let mut tracker = ResultTracker::new();
        tracker.append(StepResult {
            step: Step::new(0, "Find the capital of France", vec![]),
            results: vec![
                SearchResult::new("https://a.example", "Paris is the capital"),
                SearchResult::new("https://b.example", "Paris, France"),
            ],
            skipped_queries: vec![],
        });
        tracker.append(StepResult {
            step: Step::new(1, "Find its population", vec![0]),
            results: vec![],
            skipped_queries: vec![],
        });
        tracker
    }

    #[test]
    fn test_empty_dependencies_yield_empty_context() {
        assert_eq!(dependency_context(&tracker(), &[]), "");
    }

    #[test]
    fn test_render_single_dependency() {
        assert_eq!(
            dependency_context(&tracker(), &[0]),
            "Step: Find the capital of France\nContext: URL: https://a.example\nSummary: Paris is the capital\nURL: https://b.example\nSummary: Paris, France"
        );
    }

    #[test]
    fn test_render_follows_dependency_order() {
        let context = dependency_context(&tracker(), &[1, 0]);
        assert!(context.starts_with("Step: Find its population\nContext: \nStep: Find the capital"));
    }

    #[test]
    fn test_render_is_pure() {
        let t = tracker();
        assert_eq!(dependency_context(&t, &[0, 1]), dependency_context(&t, &[0, 1]));
    }
}
