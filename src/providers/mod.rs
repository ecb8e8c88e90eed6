//! Text-completion provider integrations

mod ollama;
mod openai_compat;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use crate::config::Config;
use crate::conversation::Message;

pub use ollama::OllamaProvider;
pub use openai_compat::{OpenAICompatConfig, OpenAICompatProvider};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Incremental reply text, one delta per item
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// An external service that generates a reply for a full prompt.
///
/// `stream_chat` resolves once the upstream has accepted the request; the
/// returned stream then yields content as it is generated.
#[async_trait]
pub trait CompletionService: Send + Sync {
    fn name(&self) -> &'static str;

    async fn stream_chat(
        &self,
        messages: &[Message],
        model: &str,
    ) -> Result<TokenStream, ProviderError>;
}

pub struct Provider;

impl Provider {
    pub fn from_name(
        name: &str,
        config: &Config,
    ) -> Result<Arc<dyn CompletionService>, ProviderError> {
        let timeout = Duration::from_secs(config.upstream_timeout_secs);

        match name.to_lowercase().as_str() {
            "openai" => {
                let api_key = config
                    .openai_api_key
                    .clone()
                    .ok_or_else(|| ProviderError::NotConfigured("OPENAI_API_KEY".into()))?;

                let compat = OpenAICompatConfig {
                    base_url: config.openai_base_url.clone(),
                    default_model: config.model.clone(),
                    timeout,
                    ..OpenAICompatConfig::openai(api_key)
                };
                Ok(Arc::new(OpenAICompatProvider::new(compat)?))
            }
            // OpenAI-compatible servers that need no key (vLLM, LM Studio, ...)
            "local" => {
                let compat = OpenAICompatConfig {
                    timeout,
                    ..OpenAICompatConfig::local(config.openai_base_url.as_str(), config.model.as_str())
                };
                Ok(Arc::new(OpenAICompatProvider::new(compat)?))
            }
            "ollama" => Ok(Arc::new(OllamaProvider::new(
                config.ollama_url.clone(),
                timeout,
            )?)),
            _ => Err(ProviderError::UnknownProvider(name.to_string())),
        }
    }
}

/// Splits a byte stream into complete lines.
///
/// Bytes are buffered until a newline arrives, so multi-byte characters split
/// across network chunks are decoded intact.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Whatever is left once the stream ends without a trailing newline
    fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        (!rest.is_empty()).then_some(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(provider: &str) -> Config {
        Config {
            provider: provider.to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_line_buffer_splits_lines() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"data: one").is_empty());
        assert_eq!(buffer.push(b"\n\ndata: two\ndata: th"), vec!["data: one", "data: two"]);
        assert_eq!(buffer.finish(), Some("data: th".to_string()));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_line_buffer_keeps_split_utf8() {
        let mut buffer = LineBuffer::default();
        let text = "قانون\n".as_bytes();
        let (head, tail) = text.split_at(3);

        assert!(buffer.push(head).is_empty());
        assert_eq!(buffer.push(tail), vec!["قانون"]);
    }

    #[test]
    fn test_provider_selection() {
        let config = test_config("ollama");
        assert_eq!(Provider::from_name("ollama", &config).unwrap().name(), "ollama");
        assert_eq!(Provider::from_name("LOCAL", &config).unwrap().name(), "openai-compatible");

        assert!(matches!(
            Provider::from_name("openai", &config),
            Err(ProviderError::NotConfigured(_))
        ));
        assert!(matches!(
            Provider::from_name("carrier-pigeon", &config),
            Err(ProviderError::UnknownProvider(_))
        ));

        let keyed = Config {
            openai_api_key: Some("sk-test".into()),
            ..test_config("openai")
        };
        assert!(Provider::from_name("openai", &keyed).is_ok());
    }
}
