//! Summarizer
//!
//! Streams the final answer over every accumulated search result. Sources are
//! numbered 1-based in accumulation order (step by step, hit by hit), and the
//! answer cites them inline as `[n]`.

use crate::conductor::error::RunError;
use crate::conductor::prompts;
use crate::conductor::types::ResultTracker;
use crate::llm::{LLMError, LLMProvider, TextStream};
use futures::StreamExt;
use regex::Regex;
use sdk::SourceRef;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

static CITATION: OnceLock<Regex> = OnceLock::new();

fn citation_pattern() -> &'static Regex {
    CITATION.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("Invalid citation pattern"))
}

/// Numbered source list, in accumulation order
pub fn numbered_sources(tracker: &ResultTracker) -> Vec<SourceRef> {
    tracker
        .sources()
        .enumerate()
        .map(|(i, r)| SourceRef {
            index: i + 1,
            url: r.url.clone(),
        })
        .collect()
}

/// Render every source as `[n] URL: ...\nSummary: ...`, grouped by step
pub fn render_sources(tracker: &ResultTracker) -> String {
    let mut index = 0;
    let mut blocks = Vec::with_capacity(tracker.len());

    for step_result in tracker.iter() {
        let mut block = format!("Step: {}", step_result.step.description);
        for result in &step_result.results {
            index += 1;
            block.push_str(&format!("\n[{}] {}", index, result));
        }
        blocks.push(block);
    }

    blocks.join("\n")
}

/// Cited source indices in first-mention order.
///
/// Indices outside `1..=source_count` do not resolve and are dropped.
pub fn extract_citations(answer: &str, source_count: usize) -> Vec<usize> {
    let mut seen = HashSet::new();
    citation_pattern()
        .captures_iter(answer)
        .filter_map(|c| c[1].parse::<usize>().ok())
        .filter(|&i| (1..=source_count).contains(&i))
        .filter(|&i| seen.insert(i))
        .collect()
}

/// A finished answer
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceRef>,
    /// Source indices the answer actually cites
    pub cited: Vec<usize>,
}

pub struct Summarizer {
    llm: Arc<dyn LLMProvider>,
    timeout: Duration,
}

impl Summarizer {
    pub fn new(llm: Arc<dyn LLMProvider>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Start streaming the answer for `query`
    pub async fn start(
        &self,
        query: &str,
        tracker: &ResultTracker,
    ) -> Result<AnswerStream, RunError> {
        let sources = numbered_sources(tracker);
        let messages = prompts::answer_messages(query, &render_sources(tracker));

        tracing::info!(sources = sources.len(), "Generating answer");

        let inner = tokio::time::timeout(self.timeout, self.llm.stream(&messages))
            .await
            .map_err(|_| RunError::Summarization(LLMError::Timeout))?
            .map_err(RunError::Summarization)?;

        Ok(AnswerStream {
            inner,
            timeout: self.timeout,
            text: String::new(),
            sources,
        })
    }
}

/// Consumer side of the answer stream.
///
/// Dropping it drops the provider stream, which cancels the request.
pub struct AnswerStream {
    inner: TextStream,
    timeout: Duration,
    text: String,
    sources: Vec<SourceRef>,
}

impl AnswerStream {
    /// Next non-empty chunk, or `None` when the answer is complete.
    ///
    /// The timeout applies to the wait for each chunk.
    pub async fn next_chunk(&mut self) -> Option<Result<String, RunError>> {
        loop {
            let next = match tokio::time::timeout(self.timeout, self.inner.next()).await {
                Ok(next) => next,
                Err(_) => return Some(Err(RunError::Summarization(LLMError::Timeout))),
            };

            match next? {
                Ok(chunk) if chunk.is_empty() => continue,
                Ok(chunk) => {
                    self.text.push_str(&chunk);
                    return Some(Ok(chunk));
                }
                Err(e) => return Some(Err(RunError::Summarization(e))),
            }
        }
    }

    /// The answer accumulated so far with its sources
    pub fn finish(self) -> Answer {
        let cited = extract_citations(&self.text, self.sources.len());
        Answer {
            text: self.text,
            sources: self.sources,
            cited,
        }
    }
}
