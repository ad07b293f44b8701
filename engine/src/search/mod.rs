//! Web search providers
//!
//! A search provider takes one query string and returns an ordered list of
//! `{url, content}` hits. Providers never retry; the step executor decides
//! what a failed query means for the run.

use crate::conductor::types::SearchResult;
use async_trait::async_trait;

pub mod tavily;

pub use tavily::TavilyProvider;

/// Result type for search operations
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors that can occur while searching
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    #[error("Search provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Search request failed ({status}): {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Search provider trait that all backends implement
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "tavily")
    fn name(&self) -> &str;

    /// Run a single query
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;
}
