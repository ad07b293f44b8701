//! Tavily search API client

use super::{Result, SearchError, SearchProvider};
use crate::conductor::types::SearchResult;
use crate::config::TavilyConfig;
use crate::secrets::{scrub, SecretCache};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const API_KEY_NAME: &str = "tavily_api_key";

pub struct TavilyProvider {
    config: TavilyConfig,
    secret_cache: Arc<SecretCache>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u32,
    search_depth: &'a str,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyHit>,
}

#[derive(Debug, Deserialize)]
struct TavilyHit {
    url: String,
    #[serde(default)]
    content: String,
}

impl TavilyProvider {
    pub fn new(config: TavilyConfig, secret_cache: Arc<SecretCache>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            config,
            secret_cache,
            client,
        }
    }
}

#[async_trait]
impl SearchProvider for TavilyProvider {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let api_key = self
            .secret_cache
            .get_secret(API_KEY_NAME)
            .map_err(|e| SearchError::AuthenticationFailed(e.to_string()))?;

        let request = TavilyRequest {
            api_key: api_key.expose(),
            query,
            max_results: self.config.max_results,
            search_depth: &self.config.search_depth,
        };

        tracing::debug!(query, "Tavily search");

        let url = format!("{}/search", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout
                } else if e.is_connect() {
                    SearchError::ProviderUnavailable(e.to_string())
                } else {
                    SearchError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = scrub(&response.text().await.unwrap_or_default());
            return Err(match status.as_u16() {
                401 | 403 => SearchError::AuthenticationFailed(message),
                429 => SearchError::RateLimitExceeded,
                code => SearchError::RequestFailed {
                    status: code,
                    message,
                },
            });
        }

        let body: TavilyResponse = response
            .json()
            .await
            .map_err(|e| SearchError::ParseError(e.to_string()))?;

        Ok(body
            .results
            .into_iter()
            .map(|hit| SearchResult::new(hit.url, hit.content))
            .collect())
    }
}
