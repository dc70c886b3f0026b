//! HTTP endpoints
//!
//! Health and readiness probes, the Prometheus scrape endpoint, call record
//! lookup, and the media-stream WebSocket route.

use axum::{
    extract::{Path, State},
    http::{HeaderValue, Method, StatusCode},
    routing::get,
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use callbridge_core::CallRecord;

use crate::state::AppState;
use crate::websocket::media_stream_handler;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let cors_layer = build_cors_layer(
        &state.settings.server.cors_origins,
        state.settings.server.cors_enabled,
    );
    let ws_path = state.settings.server.ws_path.clone();

    Router::new()
        .route(&ws_path, get(media_stream_handler))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/api/calls/:call_sid", get(get_call))
        .route("/api/sessions", get(list_sessions))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Build the CORS layer from configured origins. Disabled means no CORS
/// headers at all; enabled with no origins falls back to permissive for
/// local development.
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        return CorsLayer::new();
    }

    if origins.is_empty() {
        tracing::warn!("CORS enabled with no origins configured, allowing all");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET])
        .allow_headers(Any)
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_sessions": state.registry.count(),
    }))
}

async fn readiness_check() -> StatusCode {
    StatusCode::OK
}

/// Prometheus scrape endpoint
async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    match &state.metrics {
        Some(handle) => Ok(handle.render()),
        None => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

/// Fetch the persisted record for a finished call
async fn get_call(
    State(state): State<AppState>,
    Path(call_sid): Path<String>,
) -> Result<Json<CallRecord>, StatusCode> {
    match state.pipeline.store.get(&call_sid).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!(call_sid = %call_sid, error = %e, "Call record lookup failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// List active media-stream sessions
async fn list_sessions(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sessions = state.registry.list();
    Json(serde_json::json!({
        "count": sessions.len(),
        "sessions": sessions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use callbridge_config::Settings;
    use callbridge_persistence::{InMemoryBillingService, InMemoryCallStore, InMemoryPromptStore};
    use callbridge_pipeline::{PipelineConfig, PipelineContext};
    use callbridge_providers::{
        ChatClient, ChatConfig, SynthesisClient, SynthesisConfig, TranscriptionClient,
        TranscriptionConfig,
    };

    use crate::registry::SessionRegistry;

    fn test_state() -> AppState {
        let stt = TranscriptionClient::new(TranscriptionConfig::default()).unwrap();
        let chat = ChatClient::new(ChatConfig::default()).unwrap();
        let tts = SynthesisClient::new(SynthesisConfig::default()).unwrap();

        let pipeline = Arc::new(PipelineContext {
            stt,
            chat,
            tts,
            store: Arc::new(InMemoryCallStore::new()),
            billing: Arc::new(InMemoryBillingService::new()),
            config: PipelineConfig::default(),
        });

        let registry = Arc::new(SessionRegistry::new(
            10,
            Duration::from_secs(60),
            Duration::from_secs(3600),
        ));

        AppState::new(
            Arc::new(Settings::default()),
            registry,
            pipeline,
            Arc::new(InMemoryPromptStore::new()),
        )
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = create_router(test_state());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["active_sessions"], 0);
    }

    #[tokio::test]
    async fn test_unknown_call_returns_not_found() {
        let app = create_router(test_state());

        let response = app
            .oneshot(Request::builder().uri("/api/calls/CA404").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sessions_endpoint_empty() {
        let app = create_router(test_state());

        let response = app
            .oneshot(Request::builder().uri("/api/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["count"], 0);
    }

    #[tokio::test]
    async fn test_metrics_unavailable_without_recorder() {
        let app = create_router(test_state());

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
