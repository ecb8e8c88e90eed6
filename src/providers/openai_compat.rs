//! Streaming chat completions over the OpenAI wire format
//!
//! `POST {base_url}/chat/completions` with `stream: true`; the reply arrives as
//! server-sent events, one `data:` line per delta, ending with `data: [DONE]`.
//! The same client serves OpenAI itself (`CHAT_PROVIDER=openai`, key required)
//! and keyless self-hosted servers (`CHAT_PROVIDER=local`).

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::conversation::Message;

use super::{CompletionService, LineBuffer, ProviderError, TokenStream};

/// OpenAI-compatible chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
        }
    }
}

/// Chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// One `data:` payload of a streamed completion
#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Error response from API
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Decoded server-sent event
#[derive(Debug, PartialEq, Eq)]
enum SseEvent {
    Delta(String),
    Done,
}

/// Interpret one SSE line. Comments, keep-alives and empty deltas yield `None`.
fn parse_sse_line(line: &str) -> Result<Option<SseEvent>, ProviderError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }

    let chunk: ChatCompletionChunk = serde_json::from_str(data)
        .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse stream chunk: {}", e)))?;

    if let Some(error) = chunk.error {
        return Err(ProviderError::InvalidResponse(format!("API error: {}", error.message)));
    }

    let content: String = chunk
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.content)
        .collect();

    Ok((!content.is_empty()).then_some(SseEvent::Delta(content)))
}

#[derive(Debug, Clone)]
pub struct OpenAICompatConfig {
    /// Up to and including the version segment, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    /// Sent as a bearer token when present
    pub api_key: Option<String>,
    /// Model used when the caller passes an empty model name
    pub default_model: String,
    /// Whole-request timeout, including the streamed body
    pub timeout: Duration,
}

impl Default for OpenAICompatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            default_model: "gpt-4o".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl OpenAICompatConfig {
    /// Hosted OpenAI with the default base URL
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Self-hosted server that takes no key
    pub fn local(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            default_model: model.into(),
            ..Self::default()
        }
    }
}

pub struct OpenAICompatProvider {
    config: OpenAICompatConfig,
    client: Client,
}

impl OpenAICompatProvider {
    pub fn new(config: OpenAICompatConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.timeout)
            .build()?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl CompletionService for OpenAICompatProvider {
    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    async fn stream_chat(
        &self,
        messages: &[Message],
        model: &str,
    ) -> Result<TokenStream, ProviderError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let request = ChatCompletionRequest {
            model: if model.is_empty() {
                self.config.default_model.clone()
            } else {
                model.to_string()
            },
            messages: messages.iter().map(ChatMessage::from).collect(),
            stream: true,
            temperature: Some(0.7),
            max_tokens: Some(4096),
        };

        let mut builder = self.client.post(&url);
        if let Some(api_key) = &self.config.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Ok(error_resp) = serde_json::from_str::<ErrorResponse>(&body) {
                return Err(ProviderError::InvalidResponse(format!(
                    "API error ({}): {}",
                    status, error_resp.error.message
                )));
            }
            return Err(ProviderError::InvalidResponse(format!("HTTP {}", status)));
        }

        let mut bytes = response.bytes_stream();

        let stream = async_stream::try_stream! {
            let mut lines = LineBuffer::default();

            'read: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(ProviderError::from)?;
                for line in lines.push(&chunk) {
                    match parse_sse_line(&line)? {
                        Some(SseEvent::Delta(text)) => {
                            yield text;
                        }
                        Some(SseEvent::Done) => break 'read,
                        None => {}
                    }
                }
            }

            if let Some(line) = lines.finish() {
                if let Some(SseEvent::Delta(text)) = parse_sse_line(&line)? {
                    yield text;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;

    #[test]
    fn test_config_presets() {
        let openai = OpenAICompatConfig::openai("test-key");
        assert!(openai.base_url.contains("openai.com"));
        assert_eq!(openai.api_key, Some("test-key".to_string()));
        assert_eq!(openai.default_model, "gpt-4o");

        let local = OpenAICompatConfig::local("http://localhost:8000/v1", "llama-3");
        assert!(local.api_key.is_none());
        assert_eq!(local.default_model, "llama-3");
    }

    #[test]
    fn test_message_conversion() {
        let msg = Message {
            role: Role::System,
            content: "Be brief".to_string(),
        };
        let chat_msg = ChatMessage::from(&msg);
        assert_eq!(chat_msg.role, "system");
        assert_eq!(chat_msg.content, "Be brief");
    }

    #[test]
    fn test_parse_delta() {
        let line = r#"data: {"id":"c1","choices":[{"index":0,"delta":{"content":"The "},"finish_reason":null}]}"#;
        assert_eq!(
            parse_sse_line(line).unwrap(),
            Some(SseEvent::Delta("The ".to_string()))
        );
    }

    #[test]
    fn test_parse_role_only_delta_is_skipped() {
        let line = r#"data: {"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), None);

        let line = r#"data: {"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), None);
    }

    #[test]
    fn test_parse_done_and_comments() {
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), Some(SseEvent::Done));
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), None);
        assert_eq!(parse_sse_line("event: message").unwrap(), None);
    }

    #[test]
    fn test_parse_error_chunk() {
        let line = r#"data: {"error":{"message":"Rate limit reached","type":"requests"}}"#;
        let err = parse_sse_line(line).unwrap_err();
        assert!(err.to_string().contains("Rate limit reached"));

        assert!(parse_sse_line("data: {not json").is_err());
    }
}
