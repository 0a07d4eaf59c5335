//! HTTP request handlers

use super::assets::{get_index_html, serve_static};
use super::sse::sse_stream;
use super::types::{
    ChatRequest, ChatResponse, ConversationResponse, ErrorResponse, SuccessResponse,
};
use super::AppState;
use crate::state_machine::TransitionError;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Root serves the chat page
        .route("/", get(serve_page))
        // Other embedded assets
        .route("/assets/*path", get(serve_static))
        // Conversation view
        .route("/api/conversation", get(get_conversation))
        // SSE streaming
        .route("/api/stream", get(stream_conversation))
        // User actions
        .route("/api/chat", post(send_chat))
        .route("/api/clear", post(clear_conversation))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Page
// ============================================================

async fn serve_page() -> impl IntoResponse {
    match get_index_html() {
        Some(content) => Html(content).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Html("<h1>404 - chat page not found</h1>".to_string()),
        )
            .into_response(),
    }
}

// ============================================================
// Conversation
// ============================================================

async fn get_conversation(State(state): State<AppState>) -> Json<ConversationResponse> {
    let snapshot = state.controller.snapshot();
    Json(ConversationResponse {
        messages: snapshot.messages,
        pending: snapshot.pending,
    })
}

async fn stream_conversation(State(state): State<AppState>) -> impl IntoResponse {
    let (snapshot, rx) = state.controller.subscribe_with_snapshot();
    sse_stream(snapshot, rx)
}

// ============================================================
// User Actions
// ============================================================

/// Accept a message and return immediately; the reply arrives over SSE.
async fn send_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    match state.controller.begin(&req.text) {
        // The call keeps running after the handle is dropped
        Ok(Some(_in_flight)) => Ok(Json(ChatResponse { accepted: true })),
        Ok(None) => Ok(Json(ChatResponse { accepted: false })),
        Err(e @ TransitionError::Busy) => Err(AppError::Conflict(e.to_string())),
        Err(e) => Err(AppError::Internal(e.to_string())),
    }
}

async fn clear_conversation(State(state): State<AppState>) -> Json<SuccessResponse> {
    state.controller.clear();
    Json(SuccessResponse { success: true })
}

async fn get_version() -> &'static str {
    concat!("modern-chat ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    Conflict(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
