//! PakLegal chat backend
//!
//! Serves the site's chat surfaces: canned-reply conversations for the legal
//! assistant and lawyer widgets, and a streaming proxy to an external LLM.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod conversation;
mod core;
mod providers;
mod routes;

use config::{prompts, Config};
use crate::core::{CompletionGateway, ConversationRegistry};
use providers::Provider;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<CompletionGateway>,
    pub conversations: Arc<ConversationRegistry>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paklegal_chat=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let system_prompt = prompts::resolve_system_prompt(config.system_prompt_file.as_deref()).await?;
    let service = Provider::from_name(&config.provider, &config)?;

    let gateway = Arc::new(CompletionGateway::new(service, system_prompt, config.model.clone()));
    tracing::info!(
        "Completion provider: {} (model {})",
        config.provider,
        gateway.model()
    );

    let conversations = Arc::new(ConversationRegistry::new(config.reply_timing()));
    let _sweeper = conversations.spawn_sweeper(
        config.conversation_idle_timeout(),
        config.conversation_sweep_period(),
    );

    let state = AppState {
        gateway,
        conversations,
    };

    let app = Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("PakLegal chat API running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
