//! Modern Chat - single-conversation chat server backed by Gemini
//!
//! Serves an embedded chat page and a small JSON/SSE API around a
//! conversation state machine.

mod api;
mod controller;
mod conversation;
mod llm;
mod state_machine;

use api::{create_router, AppState};
use controller::ConversationController;
use llm::{service_from_config, LlmConfig};
use state_machine::{AdmissionPolicy, ChatContext};
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "modern_chat=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let port: u16 = std::env::var("CHAT_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    let admission = admission_from_env();

    let llm_config = LlmConfig::from_env();
    if !llm_config.is_complete() {
        tracing::warn!(
            "GEMINI_API_KEY or GEMINI_API_URL not set. Every reply will be the fallback message."
        );
    }
    let llm = service_from_config(&llm_config);

    tracing::info!(service = llm.service_id(), admission = %admission, "Completion service ready");

    // Create application state
    let controller = ConversationController::new(llm, ChatContext::new(admission));
    let state = AppState::new(controller);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(cors)
        .layer(compression)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Modern Chat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn admission_from_env() -> AdmissionPolicy {
    match std::env::var("CHAT_ADMISSION") {
        Ok(value) if !value.trim().is_empty() => value.parse().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to default admission policy");
            AdmissionPolicy::default()
        }),
        _ => AdmissionPolicy::default(),
    }
}
