//! Ollama provider implementation
//!
//! Uses `/api/chat` with streaming enabled, which answers with one JSON
//! object per line until a chunk carries `"done": true`.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::conversation::Message;

use super::{CompletionService, LineBuffer, ProviderError, TokenStream};

pub struct OllamaProvider {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Decode one NDJSON line into `(content, done)`
fn parse_chunk(line: &str) -> Result<(String, bool), ProviderError> {
    let chunk: OllamaChunk = serde_json::from_str(line)
        .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse stream chunk: {}", e)))?;

    if let Some(error) = chunk.error {
        return Err(ProviderError::InvalidResponse(error));
    }

    let content = chunk.message.map(|m| m.content).unwrap_or_default();
    Ok((content, chunk.done))
}

impl OllamaProvider {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl CompletionService for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn stream_chat(
        &self,
        messages: &[Message],
        model: &str,
    ) -> Result<TokenStream, ProviderError> {
        let ollama_messages: Vec<OllamaMessage> = messages
            .iter()
            .map(|m| OllamaMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect();

        let request = OllamaRequest {
            model: model.to_string(),
            messages: ollama_messages,
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url.trim_end_matches('/')))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::InvalidResponse(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let mut bytes = response.bytes_stream();

        let stream = async_stream::try_stream! {
            let mut lines = LineBuffer::default();

            'read: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(ProviderError::from)?;
                for line in lines.push(&chunk) {
                    let (content, done) = parse_chunk(&line)?;
                    if !content.is_empty() {
                        yield content;
                    }
                    if done {
                        break 'read;
                    }
                }
            }

            if let Some(line) = lines.finish() {
                let (content, _) = parse_chunk(&line)?;
                if !content.is_empty() {
                    yield content;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
