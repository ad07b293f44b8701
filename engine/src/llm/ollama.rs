//! Ollama LLM Provider
//!
//! Talks to a local Ollama server, typically at http://localhost:11434.
//! Structured output passes the JSON schema as the `format` field;
//! streaming reads newline-delimited JSON objects until `done` is true.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{LLMError, LLMProvider, Message, ResponseSchema, Result, TextStream};

/// Ollama provider configuration
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    /// Base URL for Ollama API (typically http://localhost:11434)
    base_url: String,

    /// Model name to use (e.g., "llama3.1:8b")
    model: String,

    /// HTTP client for API requests
    client: Client,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    ///
    /// # Arguments
    /// * `base_url` - Base URL for Ollama API (e.g., "http://localhost:11434")
    /// * `model` - Model name to use (e.g., "llama3.1:8b")
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Convert our Message format to Ollama's format
    fn convert_messages(&self, messages: &[Message]) -> Vec<OllamaMessage> {
        messages
            .iter()
            .map(|msg| OllamaMessage {
                role: msg.role.to_string(),
                content: msg.content.clone(),
            })
            .collect()
    }

    fn build_request(
        &self,
        messages: &[Message],
        schema: Option<&ResponseSchema>,
        stream: bool,
    ) -> OllamaRequest {
        OllamaRequest {
            model: self.model.clone(),
            messages: self.convert_messages(messages),
            stream,
            format: schema.map(|s| s.schema.clone()),
        }
    }

    async fn send(&self, request: &OllamaRequest) -> Result<reqwest::Response> {
        tracing::debug!(
            "Ollama request: model={}, messages={}, stream={}",
            self.model,
            request.messages.len(),
            request.stream
        );

        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout
                } else if e.is_connect() {
                    LLMError::ProviderUnavailable(format!(
                        "Cannot connect to Ollama at {}. Is Ollama running?",
                        self.base_url
                    ))
                } else {
                    LLMError::NetworkError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LLMError::ProviderUnavailable(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }

    async fn complete(&self, request: &OllamaRequest) -> Result<String> {
        let start = std::time::Instant::now();
        let response = self.send(request).await?;

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(format!("Failed to parse Ollama response: {}", e)))?;

        tracing::info!(
            "Ollama response received in {:.1}s",
            start.elapsed().as_secs_f64()
        );

        Ok(ollama_response.message.content)
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn check_health(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        matches!(
            self.client.get(&url).send().await,
            Ok(response) if response.status().is_success()
        )
    }

    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let request = self.build_request(messages, None, false);
        self.complete(&request).await
    }

    async fn generate_structured(
        &self,
        messages: &[Message],
        schema: &ResponseSchema,
    ) -> Result<serde_json::Value> {
        let request = self.build_request(messages, Some(schema), false);
        let content = self.complete(&request).await?;
        super::parse_json_content(&content)
    }

    async fn stream(&self, messages: &[Message]) -> Result<TextStream> {
        let request = self.build_request(messages, None, true);
        let response = self.send(&request).await?;

        let stream = async_stream::try_stream! {
            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            'read: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| LLMError::NetworkError(e.to_string()))?;
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let Some(part) = parse_stream_line(&line)? else {
                        continue;
                    };
                    if !part.message.content.is_empty() {
                        yield part.message.content;
                    }
                    if part.done {
                        break 'read;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

fn parse_stream_line(line: &[u8]) -> Result<Option<OllamaResponse>> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| LLMError::ParseError(format!("Failed to parse Ollama stream line: {}", e)))
}

/// Ollama API request format
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<serde_json::Value>,
}

/// Ollama message format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

/// Ollama API response format, also used for each streamed line
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ollama_provider_properties() {
        let provider = OllamaProvider::new("http://localhost:11434", "llama3.1:8b");

        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.model(), "llama3.1:8b");
        assert!(provider.is_local());
    }

    #[test]
    fn test_message_conversion() {
        let provider = OllamaProvider::new("http://localhost:11434", "llama3.1:8b");

        let messages = vec![
            Message::system("You are a helpful assistant"),
            Message::user("Hello"),
            Message::assistant("Hi there"),
        ];

        let ollama_messages = provider.convert_messages(&messages);

        assert_eq!(ollama_messages.len(), 3);
        assert_eq!(ollama_messages[0].role, "system");
        assert_eq!(ollama_messages[1].role, "user");
        assert_eq!(ollama_messages[2].role, "assistant");
    }

    #[test]
    fn test_request_carries_format_only_when_structured() {
        let provider = OllamaProvider::new("http://localhost:11434", "llama3.1:8b");
        let schema = ResponseSchema::new("plan", json!({"type": "object"}));

        let structured = serde_json::to_value(provider.build_request(
            &[Message::user("q")],
            Some(&schema),
            false,
        ))
        .unwrap();
        assert_eq!(structured["format"], json!({"type": "object"}));

        let plain =
            serde_json::to_value(provider.build_request(&[Message::user("q")], None, true)).unwrap();
        assert!(plain.get("format").is_none());
        assert_eq!(plain["stream"], true);
    }

    #[test]
    fn test_parse_stream_line() {
        let part = parse_stream_line(
            br#"{"message":{"role":"assistant","content":"Hi"},"done":false}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(part.message.content, "Hi");
        assert!(!part.done);

        assert!(parse_stream_line(b"   \n").unwrap().is_none());
        assert!(parse_stream_line(b"{not json").is_err());
    }
}
