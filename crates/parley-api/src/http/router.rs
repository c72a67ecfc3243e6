//! Axum router configuration with middleware.
//!
//! REST routes are under `/api/v1/`; the voice channel is `/ws`.
//! Middleware: CORS, tracing.
//!
//! When a web directory is configured, its files are served for every other
//! path, with `index.html` as the fallback. If the directory does not exist,
//! only the API is served.

use std::path::Path;

use axum::Router;
use axum::extract::State;
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete router with all routes and middleware.
pub fn build_router(state: AppState, web_dir: Option<&Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/chat", post(handlers::chat::chat))
        .route("/sessions/{id}", delete(handlers::session::end_session))
        .route("/prompts", get(handlers::prompts::list_prompts));

    let mut router = Router::new()
        .nest("/api/v1", api_routes)
        .route("/ws", get(handlers::ws::ws_handler))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if let Some(web_dir) = web_dir {
        if web_dir.exists() {
            let serve_dir = ServeDir::new(web_dir).fallback(ServeFile::new(web_dir.join("index.html")));
            router = router.fallback_service(serve_dir);
            tracing::info!(path = %web_dir.display(), "Static file serving enabled");
        } else {
            tracing::warn!(path = %web_dir.display(), "Web directory not found, serving API only");
        }
    }

    router
}

/// GET /health - Liveness plus relay and backend status.
async fn health_check(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    let active_sessions = match state.relay.active_sessions().await {
        Ok(count) => Some(count),
        Err(err) => {
            tracing::warn!(error = %err, "Cannot count sessions");
            None
        }
    };

    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "provider": state.relay.provider_name(),
        "model": state.relay.settings().model,
        "response_mode": state.response_mode,
        "session_store": state.relay.store_kind(),
        "active_sessions": active_sessions,
        "infra": state.infra.as_ref(),
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use parley_types::config::ResponseMode;

    use super::*;
    use crate::state::test_support::test_state;

    #[tokio::test]
    async fn test_health() {
        let response = build_router(test_state(vec![], ResponseMode::Stream), None)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["provider"], "stub");
        assert_eq!(body["session_store"], "memory");
        assert_eq!(body["response_mode"], "stream");
        assert_eq!(body["active_sessions"], 0);
        assert_eq!(body["infra"]["turn_log"]["state"], "disabled");
    }

    #[tokio::test]
    async fn test_unknown_path_without_web_dir() {
        let response = build_router(test_state(vec![], ResponseMode::Stream), None)
            .oneshot(Request::get("/index.html").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serves_web_dir_with_index_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>Parley</h1>").unwrap();

        let app = build_router(test_state(vec![], ResponseMode::Stream), Some(dir.path()));
        let response = app
            .clone()
            .oneshot(Request::get("/some/page").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"<h1>Parley</h1>");

        // API routes still win over the static fallback.
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(std::str::from_utf8(&bytes).unwrap().contains("\"status\":\"ok\""));
    }
}
