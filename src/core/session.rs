//! Live conversations
//!
//! A [`Conversation`] owns its transcript and reply policy. Replies are computed
//! on a spawned task after a cosmetic delay. At most one reply is in flight per
//! conversation; further sends wait their turn in FIFO order, so the transcript
//! always reads `user, assistant, user, assistant, ...` after the greeting.
//! Closing a conversation discards any reply that has not been appended yet.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use crate::conversation::{ConversationKind, InvalidTurnError, Recipient, Transcript, Turn};

use super::canned::{ReplyKind, Responder};

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error(transparent)]
    InvalidTurn(#[from] InvalidTurnError),

    #[error("conversation not found: {0}")]
    NotFound(Uuid),

    #[error("conversation is closed")]
    Closed,

    #[error("malformed conversation request: {0}")]
    Malformed(String),

    #[error("reply task failed: {0}")]
    Interrupted(String),
}

impl IntoResponse for ConversationError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ConversationError::InvalidTurn(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Message content must not be empty",
            ),
            ConversationError::NotFound(_) => (StatusCode::NOT_FOUND, "Conversation not found"),
            ConversationError::Closed => (StatusCode::GONE, "Conversation is closed"),
            ConversationError::Malformed(_) => {
                (StatusCode::BAD_REQUEST, "Invalid conversation request")
            }
            ConversationError::Interrupted(_) => {
                tracing::error!(error = %self, "reply task did not complete");
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to process chat request")
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<JsonRejection> for ConversationError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::warn!(error = %rejection.body_text(), "Rejected conversation request body");
        ConversationError::Malformed(rejection.body_text())
    }
}

/// Simulated typing latency per reply kind
#[derive(Debug, Clone, Copy)]
pub struct ReplyTiming {
    pub standard: Duration,
    pub contact_prompt: Duration,
    pub direct: Duration,
}

impl ReplyTiming {
    pub fn delay_for(&self, kind: ReplyKind) -> Duration {
        match kind {
            ReplyKind::ContactRequest => self.contact_prompt,
            ReplyKind::Acknowledgement => self.direct,
            ReplyKind::Topic | ReplyKind::Fallback | ReplyKind::ContactAcknowledged => {
                self.standard
            }
        }
    }

    #[cfg(test)]
    pub fn immediate() -> Self {
        Self {
            standard: Duration::ZERO,
            contact_prompt: Duration::ZERO,
            direct: Duration::ZERO,
        }
    }
}

impl Default for ReplyTiming {
    fn default() -> Self {
        Self {
            standard: Duration::from_millis(1500),
            contact_prompt: Duration::from_millis(1000),
            direct: Duration::from_millis(2000),
        }
    }
}

/// A user turn together with the reply it produced
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub user: Turn,
    pub reply: Turn,
}

/// Point-in-time view of a conversation for rendering
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSnapshot {
    pub id: Uuid,
    pub kind: ConversationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Recipient>,
    pub awaiting_reply: bool,
    pub turns: Vec<Turn>,
}

/// Marks a conversation as awaiting a reply; cleared on drop
struct PendingGuard {
    flag: Arc<AtomicBool>,
}

impl PendingGuard {
    fn acquire(flag: Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self { flag }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct Conversation {
    id: Uuid,
    kind: ConversationKind,
    recipient: Option<Recipient>,
    timing: ReplyTiming,
    transcript: RwLock<Transcript>,
    // Held for the whole of one send; doubles as the FIFO queue for later sends
    responder: Arc<Mutex<Responder>>,
    pending: Arc<AtomicBool>,
    closed: watch::Sender<bool>,
    opened_at: Instant,
    // Millis since `opened_at` of the last send or read
    last_active_ms: AtomicU64,
}

impl Conversation {
    /// Open a conversation, seeded with the surface's greeting
    pub fn open(kind: ConversationKind, recipient: Option<Recipient>, timing: ReplyTiming) -> Self {
        let responder = Responder::for_kind(kind);
        let transcript = Transcript::with_greeting(responder.greeting(recipient.as_ref()));
        let (closed, _) = watch::channel(false);

        Self {
            id: Uuid::new_v4(),
            kind,
            recipient,
            timing,
            transcript: RwLock::new(transcript),
            responder: Arc::new(Mutex::new(responder)),
            pending: Arc::new(AtomicBool::new(false)),
            closed,
            opened_at: Instant::now(),
            last_active_ms: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_awaiting_reply(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn touch(&self) {
        let elapsed = self.opened_at.elapsed().as_millis() as u64;
        self.last_active_ms.store(elapsed, Ordering::SeqCst);
    }

    /// Time since the last send or snapshot
    pub fn idle_for(&self) -> Duration {
        let last_active = Duration::from_millis(self.last_active_ms.load(Ordering::SeqCst));
        self.opened_at.elapsed().saturating_sub(last_active)
    }

    pub async fn turns(&self) -> Vec<Turn> {
        self.transcript.read().await.all().to_vec()
    }

    pub async fn snapshot(&self) -> ConversationSnapshot {
        self.touch();
        ConversationSnapshot {
            id: self.id,
            kind: self.kind,
            recipient: self.recipient.clone(),
            awaiting_reply: self.is_awaiting_reply(),
            turns: self.turns().await,
        }
    }

    /// Append a user turn and wait for its reply.
    ///
    /// Blank content is rejected before anything is appended. If the
    /// conversation is closed while the reply is pending, the user turn stays
    /// in the transcript and the reply is dropped.
    pub async fn send(self: &Arc<Self>, content: &str) -> Result<Exchange, ConversationError> {
        if content.trim().is_empty() {
            return Err(InvalidTurnError.into());
        }
        self.touch();

        let responder = Arc::clone(&self.responder).lock_owned().await;
        if self.is_closed() {
            return Err(ConversationError::Closed);
        }

        let pending = PendingGuard::acquire(Arc::clone(&self.pending));
        let user = Turn::user(content);
        self.transcript.write().await.append(user.clone())?;

        let conversation = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut responder = responder;
            let result = conversation.complete_reply(&mut responder, user).await;
            // Clear the flag before the next queued send can take the lock
            conversation.touch();
            drop(pending);
            drop(responder);
            result
        });

        task.await
            .map_err(|e| ConversationError::Interrupted(e.to_string()))?
    }

    async fn complete_reply(
        &self,
        responder: &mut Responder,
        user: Turn,
    ) -> Result<Exchange, ConversationError> {
        let reply = responder.respond(&user.content);
        let delay = self.timing.delay_for(reply.kind);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = closed_signal(self.closed.subscribe()) => {
                tracing::debug!(conversation = %self.id, "closed while reply pending, discarding");
                return Err(ConversationError::Closed);
            }
        }

        // Readers may hold the transcript past a close; decide under the write lock
        let mut transcript = self.transcript.write().await;
        if self.is_closed() {
            tracing::debug!(conversation = %self.id, "closed before reply landed, discarding");
            return Err(ConversationError::Closed);
        }

        let reply = Turn::assistant(reply.text);
        transcript.append(reply.clone())?;

        tracing::debug!(
            conversation = %self.id,
            kind = ?self.kind,
            turns = transcript.all().len(),
            "reply appended"
        );

        Ok(Exchange { user, reply })
    }

    /// Stop the conversation. Pending replies are discarded.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }
}

/// Resolves once the conversation's closed flag is raised
async fn closed_signal(mut closed: watch::Receiver<bool>) {
    loop {
        let is_closed = *closed.borrow_and_update();
        if is_closed || closed.changed().await.is_err() {
            return;
        }
    }
}
