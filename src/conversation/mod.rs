//! Conversation types and the append-only transcript

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Wire-level chat message, as exchanged with completion providers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message in a conversation. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub content: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            role,
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Self {
        Message {
            role: turn.role,
            content: turn.content.clone(),
        }
    }
}

/// Rejected append: the turn had no visible content
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("turn content must not be empty")]
pub struct InvalidTurnError;

/// Ordered log of turns for one chat surface.
///
/// There is intentionally no way to edit or remove a turn once appended.
#[derive(Debug, Clone)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// Start a transcript with an assistant greeting
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::assistant(greeting)],
        }
    }

    /// Append a turn to the end of the log
    pub fn append(&mut self, turn: Turn) -> Result<(), InvalidTurnError> {
        if turn.content.trim().is_empty() {
            return Err(InvalidTurnError);
        }
        self.turns.push(turn);
        Ok(())
    }

    /// All turns in insertion order
    pub fn all(&self) -> &[Turn] {
        &self.turns
    }
}

/// The lawyer (or assistant) on the other side of a chat surface.
///
/// Only used to personalise greeting text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
}

/// Which chat surface a conversation backs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    /// Marketing-page legal assistant
    #[default]
    Assistant,
    /// Per-lawyer quick chat widget that collects contact details
    QuickChat,
    /// Dashboard messaging between a client and a lawyer
    Direct,
}
