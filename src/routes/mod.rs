//! API routes

use axum::{
    body::{Body, Bytes},
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conversation::{ConversationKind, Recipient};
use crate::core::{
    CompletionGateway, ConversationError, ConversationSnapshot, Exchange, GatewayError,
};
use crate::AppState;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    open_conversations: usize,
}

#[derive(Debug, Deserialize)]
pub struct OpenConversationRequest {
    #[serde(default)]
    pub kind: ConversationKind,
    #[serde(default)]
    pub recipient: Option<Recipient>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        open_conversations: state.conversations.len().await,
    })
}

/// Relay a transcript to the model and stream the reply back as plain text
async fn chat(State(state): State<AppState>, body: Bytes) -> Result<Response, GatewayError> {
    let messages = CompletionGateway::parse_request(&body)?;
    let tokens = state.gateway.stream(messages).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(state.gateway.relay(tokens)),
    )
        .into_response())
}

async fn open_conversation(
    State(state): State<AppState>,
    request: Result<Json<OpenConversationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ConversationSnapshot>), ConversationError> {
    let Json(request) = request?;
    let conversation = state
        .conversations
        .open(request.kind, request.recipient)
        .await;

    Ok((StatusCode::CREATED, Json(conversation.snapshot().await)))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationSnapshot>, ConversationError> {
    let conversation = state.conversations.get(id).await?;
    Ok(Json(conversation.snapshot().await))
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    request: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<Exchange>, ConversationError> {
    let Json(request) = request?;
    let conversation = state.conversations.get(id).await?;
    let exchange = conversation.send(&request.content).await?;
    Ok(Json(exchange))
}

async fn close_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ConversationError> {
    state.conversations.close(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/conversations", post(open_conversation))
        .route(
            "/api/conversations/:id",
            get(get_conversation).delete(close_conversation),
        )
        .route("/api/conversations/:id/messages", post(send_message))
}
