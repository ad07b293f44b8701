//! LLM Router
//!
//! Resolves the model-selection token that accompanies a run to one of the
//! configured providers. A token may name a provider (`openai`), a model
//! (`gpt-4o`), or both (`ollama/llama3.1:8b`). Absent or unknown tokens fall
//! back to the configured default provider.

use super::LLMProvider;
use std::sync::Arc;

/// Selects an LLM provider for a run
pub struct LLMRouter {
    /// Available LLM providers
    providers: Vec<Arc<dyn LLMProvider>>,

    /// Name of the provider used when no token matches
    default_provider: String,
}

impl LLMRouter {
    /// Create a new LLM router
    ///
    /// # Arguments
    /// * `providers` - List of available LLM providers
    /// * `default_provider` - Name of the fallback provider
    pub fn new(providers: Vec<Arc<dyn LLMProvider>>, default_provider: impl Into<String>) -> Self {
        Self {
            providers,
            default_provider: default_provider.into(),
        }
    }

    /// Names of the registered providers, in registration order
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Resolve a model-selection token.
    ///
    /// Returns `None` only when no providers are registered.
    pub fn select(&self, token: Option<&str>) -> Option<Arc<dyn LLMProvider>> {
        let token = token.map(str::trim).filter(|t| !t.is_empty());

        if let Some(token) = token {
            if let Some(provider) = self.find(token) {
                tracing::debug!(
                    "Model token '{}' resolved to {}/{}",
                    token,
                    provider.name(),
                    provider.model()
                );
                return Some(provider);
            }
            tracing::warn!(
                "Unknown model token '{}', using default provider '{}'",
                token,
                self.default_provider
            );
        }

        self.default_provider()
    }

    /// The configured default provider, or the first registered one
    pub fn default_provider(&self) -> Option<Arc<dyn LLMProvider>> {
        self.providers
            .iter()
            .find(|p| p.name() == self.default_provider)
            .or_else(|| self.providers.first())
            .cloned()
    }

    fn find(&self, token: &str) -> Option<Arc<dyn LLMProvider>> {
        if let Some((name, model)) = token.split_once('/') {
            if let Some(p) = self
                .providers
                .iter()
                .find(|p| p.name() == name && p.model() == model)
            {
                return Some(Arc::clone(p));
            }
        }

        self.providers
            .iter()
            .find(|p| p.name() == token)
            .or_else(|| self.providers.iter().find(|p| p.model() == token))
            .cloned()
    }

    /// Check the health of all registered providers
    /// Returns a list of (provider_name, is_healthy)
    pub async fn check_health(&self) -> Vec<(&str, bool)> {
        let mut results = Vec::new();
        for provider in &self.providers {
            let is_healthy = provider.check_health().await;
            results.push((provider.name(), is_healthy));
        }
        results
    }
}
