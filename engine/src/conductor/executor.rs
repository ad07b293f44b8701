//! Step Executor
//!
//! Executes one `Step` of a plan:
//! 1. Derives 1 to 3 search queries from the step, the query, and the
//!    dependency context via a structured LLM call
//! 2. Runs every query against the search provider concurrently
//! 3. Flattens the hits in derivation order into a `StepResult`
//!
//! A failed sub-query is skipped and recorded; the step only fails when
//! every sub-query fails.

use crate::conductor::error::{QueryDerivationError, RunError};
use crate::conductor::prompts::{self, MAX_SEARCH_QUERIES};
use crate::conductor::types::{SearchResult, Step, StepResult};
use crate::llm::{self, LLMError, LLMProvider};
use crate::search::{SearchError, SearchProvider};
use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Executes individual plan steps against the search provider
pub struct StepExecutor {
    llm: Arc<dyn LLMProvider>,
    search: Arc<dyn SearchProvider>,
    llm_timeout: Duration,
    search_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct DerivedQueries {
    search_queries: Vec<String>,
}

impl StepExecutor {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        search: Arc<dyn SearchProvider>,
        llm_timeout: Duration,
        search_timeout: Duration,
    ) -> Self {
        Self {
            llm,
            search,
            llm_timeout,
            search_timeout,
        }
    }

    /// Execute a single plan step
    pub async fn execute_step(
        &self,
        step: &Step,
        query: &str,
        context: &str,
    ) -> Result<StepResult, RunError> {
        let start = Instant::now();
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();

        let queries = self
            .derive_queries(step, query, context, &today)
            .await
            .map_err(|source| RunError::QueryDerivation {
                step_id: step.id,
                source,
            })?;

        debug!(step_id = step.id, ?queries, "Derived search queries");

        let outcomes = join_all(queries.iter().map(|q| self.search_one(q))).await;

        let mut results = Vec::new();
        let mut skipped_queries = Vec::new();
        let mut last_error = None;

        for (q, outcome) in queries.iter().zip(outcomes) {
            match outcome {
                Ok(hits) => results.extend(hits),
                Err(e) => {
                    warn!(step_id = step.id, query = %q, error = %e, "Search query failed, skipping");
                    skipped_queries.push(q.clone());
                    last_error = Some(e);
                }
            }
        }

        if skipped_queries.len() == queries.len() {
            return Err(RunError::SearchExhausted {
                step_id: step.id,
                attempted: queries.len(),
                last: last_error.unwrap_or(SearchError::Timeout),
            });
        }

        info!(
            step_id = step.id,
            results = results.len(),
            skipped = skipped_queries.len(),
            "Step completed in {:.1}s",
            start.elapsed().as_secs_f64()
        );

        Ok(StepResult {
            step: step.clone(),
            results,
            skipped_queries,
        })
    }

    /// Ask the LLM for the search queries of a step.
    ///
    /// The result always holds between 1 and 3 non-blank queries.
    pub async fn derive_queries(
        &self,
        step: &Step,
        query: &str,
        context: &str,
        today: &str,
    ) -> Result<Vec<String>, QueryDerivationError> {
        let messages = prompts::search_query_messages(&step.description, query, context, today);
        let schema = prompts::search_query_schema();

        let derived: DerivedQueries = tokio::time::timeout(
            self.llm_timeout,
            llm::generate_typed(self.llm.as_ref(), &messages, &schema),
        )
        .await
        .map_err(|_| LLMError::Timeout)?
        .map_err(|e| match e {
            LLMError::ParseError(msg) => QueryDerivationError::Malformed(msg),
            other => QueryDerivationError::Llm(other),
        })?;

        validate_queries(derived.search_queries)
    }

    async fn search_one(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        tokio::time::timeout(self.search_timeout, self.search.search(query))
            .await
            .map_err(|_| SearchError::Timeout)?
    }
}

/// Enforce the 1..=3 query contract and reject blank queries
pub fn validate_queries(queries: Vec<String>) -> Result<Vec<String>, QueryDerivationError> {
    if queries.is_empty() || queries.len() > MAX_SEARCH_QUERIES {
        return Err(QueryDerivationError::Count(queries.len()));
    }

    queries
        .into_iter()
        .enumerate()
        .map(|(i, q)| {
            let q = q.trim();
            if q.is_empty() {
                Err(QueryDerivationError::BlankQuery(i))
            } else {
                Ok(q.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider(String);

    #[async_trait]
    impl LLMProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn model(&self) -> &str {
            "fixed"
        }

        fn is_local(&self) -> bool {
            true
        }

        async fn generate(&self, _messages: &[Message]) -> llm::Result<String> {
            Ok(self.0.clone())
        }
    }

    /// Search backend keyed by query; unknown queries fail
    #[derive(Default)]
    struct MapSearch {
        hits: HashMap<String, Vec<SearchResult>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SearchProvider for MapSearch {
        fn name(&self) -> &str {
            "map"
        }

        async fn search(&self, query: &str) -> crate::search::Result<Vec<SearchResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.hits
                .get(query)
                .cloned()
                .ok_or_else(|| SearchError::NetworkError(format!("no route for {}", query)))
        }
    }

    fn executor(llm_output: &str, search: Arc<MapSearch>) -> StepExecutor {
        StepExecutor::new(
            Arc::new(FixedProvider(llm_output.to_string())),
            search,
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
    }

    fn search_with(entries: &[(&str, &[&str])]) -> Arc<MapSearch> {
        let hits = entries
            .iter()
            .map(|(q, urls)| {
                (
                    q.to_string(),
                    urls.iter().map(|u| SearchResult::new(*u, "content")).collect(),
                )
            })
            .collect();
        Arc::new(MapSearch {
            hits,
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_validate_queries_bounds() {
        assert!(matches!(
            validate_queries(vec![]),
            Err(QueryDerivationError::Count(0))
        ));
        assert!(matches!(
            validate_queries(vec!["a".into(), "b".into(), "c".into(), "d".into()]),
            Err(QueryDerivationError::Count(4))
        ));
        assert!(matches!(
            validate_queries(vec!["a".into(), "  ".into()]),
            Err(QueryDerivationError::BlankQuery(1))
        ));
        assert_eq!(
            validate_queries(vec![" a ".into(), "b".into()]).unwrap(),
            vec!["a", "b"]
        );
    }

    #[tokio::test]
    async fn test_results_flattened_in_derivation_order() {
        let search = search_with(&[("q1", &["u1", "u2"]), ("q2", &["u3"])]);
        let exec = executor(r#"{"search_queries": ["q1", "q2"]}"#, Arc::clone(&search));

        let result = exec
            .execute_step(&Step::new(0, "step", vec![]), "query", "")
            .await
            .unwrap();

        let urls: Vec<&str> = result.results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["u1", "u2", "u3"]);
        assert!(result.skipped_queries.is_empty());
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_sub_query_is_skipped() {
        let search = search_with(&[("good", &["u1"])]);
        let exec = executor(r#"{"search_queries": ["good", "bad"]}"#, search);

        let result = exec
            .execute_step(&Step::new(0, "step", vec![]), "query", "")
            .await
            .unwrap();

        assert_eq!(result.results.len(), 1);
        assert_eq!(result.skipped_queries, vec!["bad"]);
    }

    #[tokio::test]
    async fn test_zero_hits_is_not_a_failure() {
        let search = search_with(&[("empty", &[])]);
        let exec = executor(r#"{"search_queries": ["empty"]}"#, search);

        let result = exec
            .execute_step(&Step::new(0, "step", vec![]), "query", "")
            .await
            .unwrap();
        assert!(result.results.is_empty());
        assert!(result.skipped_queries.is_empty());
    }

    #[tokio::test]
    async fn test_all_sub_queries_failing_exhausts_step() {
        let search = search_with(&[]);
        let exec = executor(r#"{"search_queries": ["x", "y"]}"#, search);

        let err = exec
            .execute_step(&Step::new(2, "step", vec![]), "query", "")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunError::SearchExhausted {
                step_id: 2,
                attempted: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_too_many_queries_rejected_before_search() {
        let search = search_with(&[("a", &["u"])]);
        let exec = executor(
            r#"{"search_queries": ["a", "a", "a", "a"]}"#,
            Arc::clone(&search),
        );

        let err = exec
            .execute_step(&Step::new(0, "step", vec![]), "query", "")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunError::QueryDerivation {
                source: QueryDerivationError::Count(4),
                ..
            }
        ));
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_derivation_output() {
        let search = search_with(&[]);
        let exec = executor("just search for it", Arc::clone(&search));

        let err = exec
            .derive_queries(&Step::new(0, "s", vec![]), "q", "", "2026-10-16")
            .await
            .unwrap_err();
        assert!(matches!(err, QueryDerivationError::Malformed(_)));
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
    }
}
