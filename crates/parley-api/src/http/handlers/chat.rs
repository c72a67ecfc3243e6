//! REST turn endpoint for text clients.
//!
//! `POST /api/v1/chat` relays one utterance and returns the complete reply.
//! Omitting `session_id` starts a new session; passing the returned id back
//! continues it. A continued session keeps its business; naming another one
//! is a 409. Sessions left alone are dropped by the idle sweeper.

use std::time::Instant;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use parley_types::chat::{FallbackReason, SessionId, TurnReply};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<SessionId>,
    pub message: String,
    /// Prompt catalog key; the server default when omitted.
    #[serde(default)]
    pub business: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: SessionId,
    pub business: String,
    pub reply: TurnReply,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackReason>,
    pub latency_ms: u64,
}

/// POST /api/v1/chat - Relay one utterance.
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<ApiResponse<ChatResponse>, AppError> {
    let started = Instant::now();

    if request.message.trim().is_empty() {
        return Err(AppError::Validation("message must not be empty".into()));
    }

    let business = request.business.as_deref();
    let session = match request.session_id {
        Some(id) => state.relay.resume_session(id, business).await?,
        None => state.relay.open_session(business)?,
    };

    let outcome = state.relay.run_turn(&session, &request.message).await;

    let link = format!("/api/v1/sessions/{}", session.id);
    let response = ChatResponse {
        session_id: session.id,
        business: session.business,
        reply: outcome.reply,
        fallback: outcome.fallback,
        latency_ms: outcome.latency_ms,
    };
    Ok(ApiResponse::success(response, started).with_link("session", &link))
}
