//! Application configuration

pub mod prompts;

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::ReplyTiming;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Upstream completion provider: "openai", "local" or "ollama"
    pub provider: String,
    pub model: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub ollama_url: String,
    pub upstream_timeout_secs: u64,
    /// TOML persona overriding the built-in system instruction
    pub system_prompt_file: Option<PathBuf>,
    pub reply_delay_ms: u64,
    pub contact_prompt_delay_ms: u64,
    pub direct_reply_delay_ms: u64,
    /// Conversations untouched this long are closed and dropped
    pub conversation_idle_secs: u64,
    pub conversation_sweep_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            provider: "openai".into(),
            model: "gpt-4o".into(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".into(),
            ollama_url: "http://localhost:11434".into(),
            upstream_timeout_secs: 120,
            system_prompt_file: None,
            reply_delay_ms: 1500,
            contact_prompt_delay_ms: 1000,
            direct_reply_delay_ms: 2000,
            conversation_idle_secs: 1800,
            conversation_sweep_secs: 60,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str, default: u64| {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(defaults.port),
            provider: lookup("CHAT_PROVIDER").unwrap_or(defaults.provider),
            model: lookup("CHAT_MODEL").unwrap_or(defaults.model),
            openai_api_key: lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()),
            openai_base_url: lookup("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            ollama_url: lookup("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            upstream_timeout_secs: parsed("UPSTREAM_TIMEOUT_SECS", defaults.upstream_timeout_secs),
            system_prompt_file: lookup("SYSTEM_PROMPT_FILE").map(PathBuf::from),
            reply_delay_ms: parsed("REPLY_DELAY_MS", defaults.reply_delay_ms),
            contact_prompt_delay_ms: parsed("CONTACT_PROMPT_DELAY_MS", defaults.contact_prompt_delay_ms),
            direct_reply_delay_ms: parsed("DIRECT_REPLY_DELAY_MS", defaults.direct_reply_delay_ms),
            conversation_idle_secs: parsed("CONVERSATION_IDLE_SECS", defaults.conversation_idle_secs),
            // A zero period would make tokio's interval panic
            conversation_sweep_secs: parsed("CONVERSATION_SWEEP_SECS", defaults.conversation_sweep_secs)
                .max(1),
        }
    }

    pub fn reply_timing(&self) -> ReplyTiming {
        ReplyTiming {
            standard: Duration::from_millis(self.reply_delay_ms),
            contact_prompt: Duration::from_millis(self.contact_prompt_delay_ms),
            direct: Duration::from_millis(self.direct_reply_delay_ms),
        }
    }

    pub fn conversation_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.conversation_idle_secs)
    }

    pub fn conversation_sweep_period(&self) -> Duration {
        Duration::from_secs(self.conversation_sweep_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
        assert_eq!(config.provider, "openai");
        assert_eq!(config.model, "gpt-4o");
        assert!(config.openai_api_key.is_none());

        let timing = config.reply_timing();
        assert_eq!(timing.standard, Duration::from_millis(1500));
        assert_eq!(timing.contact_prompt, Duration::from_millis(1000));
        assert_eq!(timing.direct, Duration::from_millis(2000));

        assert_eq!(config.conversation_idle_timeout(), Duration::from_secs(1800));
        assert_eq!(config.conversation_sweep_period(), Duration::from_secs(60));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "8080"),
            ("CHAT_PROVIDER", "ollama"),
            ("CHAT_MODEL", "llama3.2"),
            ("REPLY_DELAY_MS", "0"),
            ("SYSTEM_PROMPT_FILE", "personas/legal.toml"),
        ]));

        assert_eq!(config.port, 8080);
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.reply_timing().standard, Duration::ZERO);
        assert_eq!(
            config.system_prompt_file,
            Some(PathBuf::from("personas/legal.toml"))
        );
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "not-a-port"),
            ("UPSTREAM_TIMEOUT_SECS", "-5"),
            ("OPENAI_API_KEY", "  "),
            ("CONVERSATION_SWEEP_SECS", "0"),
        ]));

        assert_eq!(config.conversation_sweep_period(), Duration::from_secs(1));
        assert_eq!(config.port, 3000);
        assert_eq!(config.upstream_timeout_secs, 120);
        assert!(config.openai_api_key.is_none());
    }
}
