//! Query Rewriter
//!
//! Turns a follow-up question into a standalone query using the session
//! transcript. A first question passes through unchanged.

use crate::conductor::error::RewriteError;
use crate::conductor::prompts;
use crate::conductor::types::ChatMessage;
use crate::llm::{LLMError, LLMProvider};
use std::sync::Arc;
use std::time::Duration;

pub struct QueryRewriter {
    llm: Arc<dyn LLMProvider>,
    timeout: Duration,
}

impl QueryRewriter {
    pub fn new(llm: Arc<dyn LLMProvider>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// The query to plan with.
    ///
    /// Falls back to `raw` when the transcript is empty or the rewrite fails.
    pub async fn resolve(&self, transcript: &[ChatMessage], raw: &str) -> String {
        if transcript.is_empty() {
            return raw.to_string();
        }

        match self.rewrite(transcript, raw).await {
            Ok(query) => {
                tracing::info!(query = %query, "Query rewritten");
                query
            }
            Err(e) => {
                tracing::warn!(error = %e, "Query rewrite failed, using raw query");
                raw.to_string()
            }
        }
    }

    pub async fn rewrite(
        &self,
        transcript: &[ChatMessage],
        raw: &str,
    ) -> Result<String, RewriteError> {
        let messages = prompts::rewrite_messages(transcript, raw);
        let text = tokio::time::timeout(self.timeout, self.llm.generate(&messages))
            .await
            .map_err(|_| LLMError::Timeout)??;

        let query = text.trim().trim_matches('"').trim();
        if query.is_empty() {
            return Err(RewriteError::Empty);
        }
        Ok(query.to_string())
    }
}
