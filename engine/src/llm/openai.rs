//! OpenAI-compatible chat completions provider
//!
//! Structured output uses the `json_schema` response format in strict mode.
//! Streaming reads server-sent `data:` lines until `[DONE]`.

use super::{LLMError, LLMProvider, Message, ResponseSchema, Result, TextStream};
use crate::config::OpenAIConfig;
use crate::secrets::{scrub, SecretCache};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const API_KEY_NAME: &str = "openai_api_key";

pub struct OpenAIProvider {
    config: OpenAIConfig,
    secret_cache: Arc<SecretCache>,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: OpenAIConfig, secret_cache: Arc<SecretCache>) -> Self {
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

    fn build_payload(
        &self,
        messages: &[Message],
        schema: Option<&ResponseSchema>,
        stream: bool,
    ) -> Value {
        let api_messages: Vec<Value> = messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content
                })
            })
            .collect();

        let mut payload = json!({
            "model": self.config.model,
            "messages": api_messages,
            "temperature": self.config.temperature,
            "stream": stream,
        });

        if let Some(schema) = schema {
            payload["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "strict": true,
                    "schema": schema.schema,
                }
            });
        }

        payload
    }

    async fn send(&self, payload: &Value) -> Result<reqwest::Response> {
        let api_key = self
            .secret_cache
            .get_secret(API_KEY_NAME)
            .map_err(|e| LLMError::AuthenticationFailed(e.to_string()))?;

        let url = format!("{}/chat/completions", self.config.base_url);

        tracing::debug!(
            "OpenAI request: model={}, stream={}",
            self.config.model,
            payload["stream"]
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key.expose()))
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = scrub(&response.text().await.unwrap_or_default());

            return Err(match status.as_u16() {
                401 | 403 => LLMError::AuthenticationFailed(text),
                429 => LLMError::RateLimitExceeded,
                s if s >= 500 => LLMError::ProviderUnavailable(format!(
                    "OpenAI API error ({}): {}",
                    status, text
                )),
                _ => LLMError::InvalidRequest(text),
            });
        }

        Ok(response)
    }

    async fn complete(&self, payload: &Value) -> Result<String> {
        let response = self.send(payload).await?;

        let data: Value = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        let message = data
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .ok_or_else(|| LLMError::ParseError("No message in response".to_string()))?;

        if let Some(refusal) = message.get("refusal").and_then(|r| r.as_str()) {
            return Err(LLMError::InvalidRequest(format!("Model refused: {}", refusal)));
        }

        message
            .get("content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| LLMError::ParseError("Empty content".to_string()))
    }
}

fn map_transport_error(e: reqwest::Error) -> LLMError {
    if e.is_timeout() {
        LLMError::Timeout
    } else if e.is_connect() {
        LLMError::ProviderUnavailable(e.to_string())
    } else {
        LLMError::NetworkError(e.to_string())
    }
}

/// One parsed line of a chat-completions event stream
#[derive(Debug, PartialEq)]
enum StreamLine {
    Delta(String),
    Done,
    Skip,
}

fn parse_stream_line(line: &str) -> Result<StreamLine> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(StreamLine::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(StreamLine::Done);
    }

    let value: Value =
        serde_json::from_str(data).map_err(|e| LLMError::ParseError(e.to_string()))?;

    let delta = value
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|choice| choice.get("delta"))
        .and_then(|delta| delta.get("content"))
        .and_then(|content| content.as_str())
        .unwrap_or_default();

    if delta.is_empty() {
        Ok(StreamLine::Skip)
    } else {
        Ok(StreamLine::Delta(delta.to_string()))
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn is_local(&self) -> bool {
        false
    }

    async fn check_health(&self) -> bool {
        self.secret_cache.get_secret(API_KEY_NAME).is_ok()
    }

    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let payload = self.build_payload(messages, None, false);
        self.complete(&payload).await
    }

    async fn generate_structured(
        &self,
        messages: &[Message],
        schema: &ResponseSchema,
    ) -> Result<Value> {
        let payload = self.build_payload(messages, Some(schema), false);
        let content = self.complete(&payload).await?;
        super::parse_json_content(&content)
    }

    async fn stream(&self, messages: &[Message]) -> Result<TextStream> {
        let payload = self.build_payload(messages, None, true);
        let response = self.send(&payload).await?;

        let stream = async_stream::try_stream! {
            let mut bytes = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            'read: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(map_transport_error)?;
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    match parse_stream_line(&line)? {
                        StreamLine::Delta(text) => yield text,
                        StreamLine::Done => break 'read,
                        StreamLine::Skip => {}
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
