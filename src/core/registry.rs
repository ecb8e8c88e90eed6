//! Open conversations, keyed by id
//!
//! Conversations live only as long as the process (or until closed). Each one
//! is independent; the registry lock is never held across a reply.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::conversation::{ConversationKind, Recipient};

use super::session::{Conversation, ConversationError, ReplyTiming};

pub struct ConversationRegistry {
    conversations: RwLock<HashMap<Uuid, Arc<Conversation>>>,
    timing: ReplyTiming,
}

impl ConversationRegistry {
    pub fn new(timing: ReplyTiming) -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            timing,
        }
    }

    pub async fn open(
        &self,
        kind: ConversationKind,
        recipient: Option<Recipient>,
    ) -> Arc<Conversation> {
        let conversation = Arc::new(Conversation::open(kind, recipient, self.timing));
        self.conversations
            .write()
            .await
            .insert(conversation.id(), Arc::clone(&conversation));

        tracing::debug!(conversation = %conversation.id(), kind = ?kind, "conversation opened");
        conversation
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<Conversation>, ConversationError> {
        self.conversations
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(ConversationError::NotFound(id))
    }

    /// Remove a conversation and cancel its pending reply, if any
    pub async fn close(&self, id: Uuid) -> Result<(), ConversationError> {
        let conversation = self
            .conversations
            .write()
            .await
            .remove(&id)
            .ok_or(ConversationError::NotFound(id))?;

        conversation.close();
        tracing::debug!(conversation = %id, "conversation closed");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    /// Close and drop every conversation idle for at least `ttl`.
    /// Conversations with a reply in flight are kept.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let mut conversations = self.conversations.write().await;
        let before = conversations.len();

        conversations.retain(|id, conversation| {
            let keep = conversation.is_awaiting_reply() || conversation.idle_for() < ttl;
            if !keep {
                conversation.close();
                tracing::debug!(conversation = %id, "idle conversation evicted");
            }
            keep
        });

        before - conversations.len()
    }

    /// Run [`evict_idle`](Self::evict_idle) every `period` for as long as the
    /// returned task lives
    pub fn spawn_sweeper(self: &Arc<Self>, ttl: Duration, period: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let evicted = registry.evict_idle(ttl).await;
                if evicted > 0 {
                    tracing::info!("Evicted {} idle conversation(s)", evicted);
                }
            }
        })
    }
}
