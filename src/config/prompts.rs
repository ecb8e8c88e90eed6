//! System-instruction personas
//!
//! The completion gateway prepends one system turn to every transcript. By
//! default that is [`builtin::LEGAL_ASSISTANT`]; a deployment can swap in its
//! own persona from a TOML file.
//!
//! # Example Persona File
//!
//! ```toml
//! [persona]
//! name = "Family Law Assistant"
//! description = "Answers questions on marriage, divorce and custody"
//!
//! [system_prompt]
//! content = """
//! You are a helpful legal assistant specializing in Pakistani family law...
//! """
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;

/// Persona file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub persona: PersonaInfo,
    pub system_prompt: SystemPrompt,
}

/// Only used for the startup log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPrompt {
    /// Sent verbatim, after trimming, as the leading system turn
    pub content: String,
}

impl PromptTemplate {
    pub async fn load_from_file(path: &Path) -> Result<Self, PromptError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PromptError::IoError(format!("{}: {}", path.display(), e)))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, PromptError> {
        let template: PromptTemplate =
            toml::from_str(content).map_err(|e| PromptError::ParseError(e.to_string()))?;

        if template.system_prompt.content.trim().is_empty() {
            return Err(PromptError::Empty(template.persona.name));
        }

        Ok(template)
    }
}

/// System instruction to use: the persona file when given, else the built-in one
pub async fn resolve_system_prompt(path: Option<&Path>) -> Result<String, PromptError> {
    match path {
        Some(path) => {
            let template = PromptTemplate::load_from_file(path).await?;
            tracing::info!(
                persona = %template.persona.name,
                description = %template.persona.description,
                "Loaded system persona from {}",
                path.display()
            );
            Ok(template.system_prompt.content.trim().to_string())
        }
        None => Ok(builtin::LEGAL_ASSISTANT.to_string()),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Persona '{0}' has an empty system prompt")]
    Empty(String),
}

pub mod builtin {
    /// Pakistani legal assistant, used by `/api/chat`
    pub const LEGAL_ASSISTANT: &str = "You are a helpful legal assistant specializing in Pakistani law.
Provide accurate information about Pakistani laws, legal procedures, and regulations.
If you're unsure about something, acknowledge your limitations and suggest consulting with a qualified lawyer.
Keep responses concise, informative, and focused on Pakistani legal matters.";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_template() {
        let toml_content = r#"
[persona]
name = "Family Law Assistant"
description = "Marriage, divorce and custody"

[system_prompt]
content = """
You are a family law assistant.
"""
"#;

        let template = PromptTemplate::parse(toml_content).unwrap();
        assert_eq!(template.persona.name, "Family Law Assistant");
        assert_eq!(template.system_prompt.content.trim(), "You are a family law assistant.");
    }

    #[test]
    fn test_minimal_template() {
        let toml_content = r#"
[persona]
name = "Minimal"

[system_prompt]
content = "Hello"
"#;

        let template = PromptTemplate::parse(toml_content).unwrap();
        assert_eq!(template.persona.name, "Minimal");
        assert!(template.persona.description.is_empty());
    }

    #[test]
    fn test_empty_prompt_rejected() {
        let toml_content = r#"
[persona]
name = "Blank"

[system_prompt]
content = "   "
"#;

        assert!(matches!(
            PromptTemplate::parse(toml_content),
            Err(PromptError::Empty(name)) if name == "Blank"
        ));
        assert!(matches!(
            PromptTemplate::parse("not = [valid"),
            Err(PromptError::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_defaults_to_builtin() {
        let prompt = resolve_system_prompt(None).await.unwrap();
        assert_eq!(prompt, builtin::LEGAL_ASSISTANT);
        assert!(prompt.contains("Pakistani law"));
    }

    #[tokio::test]
    async fn test_resolve_from_file() {
        let path = std::env::temp_dir().join(format!("persona-{}.toml", uuid::Uuid::new_v4()));
        tokio::fs::write(
            &path,
            "[persona]\nname = \"Tax\"\n\n[system_prompt]\ncontent = \"You answer tax questions.\"\n",
        )
        .await
        .unwrap();

        let prompt = resolve_system_prompt(Some(&path)).await.unwrap();
        assert_eq!(prompt, "You answer tax questions.");

        tokio::fs::remove_file(&path).await.unwrap();

        let missing = resolve_system_prompt(Some(&path)).await;
        assert!(matches!(missing, Err(PromptError::IoError(_))));
    }
}
