//! Session HTTP handlers.
//!
//! Endpoints:
//! - DELETE /api/v1/sessions/{id} - End a REST session and drop its history

use std::time::Instant;

use axum::extract::{Path, State};
use serde::Serialize;

use parley_types::chat::SessionId;

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SessionEnded {
    pub session_id: SessionId,
    pub ended: bool,
}

/// DELETE /api/v1/sessions/{id} - End a session. Unknown ids are a no-op.
pub async fn end_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<SessionEnded>, AppError> {
    let started = Instant::now();
    let session_id: SessionId = id
        .parse()
        .map_err(|_| AppError::Validation(format!("Invalid session id: {id}")))?;

    state.relay.end_session(&session_id).await;

    Ok(ApiResponse::success(
        SessionEnded {
            session_id,
            ended: true,
        },
        started,
    ))
}
