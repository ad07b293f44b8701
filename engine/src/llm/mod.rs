//! LLM Provider Abstraction Layer
//!
//! This module provides a common interface for the text-generation backends
//! (OpenAI-compatible APIs and Ollama). The `LLMProvider` trait defines the
//! three call shapes the search pipeline needs:
//!
//! - `generate`: one plain completion (query rewriting)
//! - `generate_structured`: one completion constrained to a JSON schema
//!   (plan generation, search-query derivation)
//! - `stream`: a completion delivered as text chunks (answer synthesis)
//!
//! The [`router::LLMRouter`] maps a model-selection token to a provider.

use async_trait::async_trait;
use futures::Stream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;

pub mod ollama;
pub mod openai;
pub mod router;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// A stream of generated text chunks
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Errors that can occur during LLM operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Message in a conversation sent to a provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// JSON schema a structured completion must conform to
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    /// Schema name, as required by OpenAI's `json_schema` response format
    pub name: String,

    /// The JSON schema document
    pub schema: serde_json::Value,
}

impl ResponseSchema {
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "openai", "ollama")
    fn name(&self) -> &str;

    /// Returns the model this provider instance talks to
    fn model(&self) -> &str;

    /// Returns true if this is a local provider (e.g., Ollama)
    fn is_local(&self) -> bool;

    /// Generate a plain text completion
    async fn generate(&self, messages: &[Message]) -> Result<String>;

    /// Generate a completion that is a JSON document matching `schema`
    ///
    /// The default implementation asks for JSON in a trailing system message
    /// and extracts it leniently from whatever text comes back.
    async fn generate_structured(
        &self,
        messages: &[Message],
        schema: &ResponseSchema,
    ) -> Result<serde_json::Value> {
        let mut messages = messages.to_vec();
        messages.push(Message::system(format!(
            "Respond ONLY with a JSON document matching this schema, no markdown, no explanation:\n{}",
            schema.schema
        )));
        let content = self.generate(&messages).await?;
        parse_json_content(&content)
    }

    /// Generate a completion as a stream of text chunks
    ///
    /// The default implementation yields the whole completion as one chunk.
    async fn stream(&self, messages: &[Message]) -> Result<TextStream> {
        let text = self.generate(messages).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(text) })))
    }

    /// Check if the provider is currently healthy and available
    async fn check_health(&self) -> bool {
        true
    }
}

/// Run a structured completion and deserialize it into `T`.
pub async fn generate_typed<T: DeserializeOwned>(
    provider: &dyn LLMProvider,
    messages: &[Message],
    schema: &ResponseSchema,
) -> Result<T> {
    let value = provider.generate_structured(messages, schema).await?;
    serde_json::from_value(value).map_err(|e| LLMError::ParseError(e.to_string()))
}

/// Parse a JSON document out of model output.
///
/// Handles multiple output shapes:
/// 1. Raw JSON (the entire content)
/// 2. Fenced JSON (with or without trailing text): ` ```json\n{...}\n``` `
/// 3. JSON embedded in prose: the first balanced `{...}` or `[...]`
pub fn parse_json_content(content: &str) -> Result<serde_json::Value> {
    let trimmed = content.trim();

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Ok(value) = serde_json::from_str(inner.trim()) {
            return Ok(value);
        }
    }

    if let Some(pos) = trimmed.find(['{', '[']) {
        if let Some(json_str) = extract_balanced_json(&trimmed[pos..]) {
            if let Ok(value) = serde_json::from_str(json_str) {
                return Ok(value);
            }
        }
    }

    Err(LLMError::ParseError(
        "No JSON document found in model output".to_string(),
    ))
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object or array starting at position 0 of `s`.
///
/// Counts bracket depth, respecting string literals, to find the
/// matching close bracket.
fn extract_balanced_json(s: &str) -> Option<&str> {
    let (open, close) = match s.chars().next()? {
        '{' => ('{', '}'),
        '[' => ('[', ']'),
        _ => return None,
    };
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
