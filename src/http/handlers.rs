//! Demo handlers behind the guard.
//!
//! These stand in for the real downstream services. They only see requests
//! the guard admitted, with the body already buffered.

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::error::ShieldError;
use crate::http::payload::{ChatMessage, ChatRequest};
use crate::http::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub tracked_clients: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        tracked_clients: state.limiter.tracked_keys(),
    })
}

/// Reply for an accepted chat turn. Echoes the sanitized input.
#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub conversation_history: Vec<ChatMessage>,
}

pub async fn chat(State(state): State<AppState>, body: Bytes) -> Result<Json<ChatReply>, ShieldError> {
    let request = ChatRequest::parse(&body, &state.security)?;
    tracing::debug!(
        message_chars = request.message.chars().count(),
        history = request.conversation_history.len(),
        "Chat request accepted"
    );

    Ok(Json(ChatReply {
        response: request.message,
        conversation_history: request.conversation_history,
    }))
}

#[derive(Debug, Serialize)]
pub struct IndexStatus {
    pub status: &'static str,
}

pub async fn init_index() -> (StatusCode, Json<IndexStatus>) {
    tracing::info!("Index initialization requested");
    (StatusCode::ACCEPTED, Json(IndexStatus { status: "accepted" }))
}
