//! Prompt catalog listing.

use std::time::Instant;

use axum::extract::State;
use serde::Serialize;

use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct PromptList {
    /// Business used when a request names none.
    pub default: String,
    pub businesses: Vec<String>,
}

/// GET /api/v1/prompts - List catalog keys.
pub async fn list_prompts(State(state): State<AppState>) -> ApiResponse<PromptList> {
    let started = Instant::now();
    let list = PromptList {
        default: state.relay.default_business().to_string(),
        businesses: state.relay.catalog().keys().map(str::to_string).collect(),
    };
    ApiResponse::success(list, started)
}
