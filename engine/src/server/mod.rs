//! HTTP surface
//!
//! # Endpoints
//!
//! - GET /stream?query=&session_id=&model= - Run a query, streaming progress as SSE
//! - GET /sessions/:id/messages - Transcript of a session
//! - GET /health - Liveness and provider health
//!
//! Each SSE event is named after its kind (`plan_generated`, `answer_chunk`,
//! ...) and carries the JSON-encoded progress event. Closing the connection
//! drops the event receiver, which cancels the run.

use crate::conductor::{Conductor, RunRequest};
use crate::config::ServerConfig;
use crate::llm::router::LLMRouter;
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// State shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub conductor: Conductor,
    pub router: Arc<LLMRouter>,
}

/// Query parameters of `/stream`
#[derive(Debug, Deserialize)]
pub struct StreamParams {
    query: String,
    session_id: Option<String>,
    model: Option<String>,
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

/// Build the application router
pub fn app(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/stream", get(stream_handler))
        .route("/sessions/:id/messages", get(messages_handler))
        .route("/health", get(health_handler))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers(Any);

    if allowed_origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();

    base.allow_origin(AllowOrigin::list(origins))
}

/// Bind and serve until Ctrl-C
pub async fn serve(config: &ServerConfig, state: AppState) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app(state, &config.allowed_origins))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Server shutting down gracefully");
        })
        .await
        .context("Server error")?;

    Ok(())
}

/// GET /stream - start a run and stream its events
async fn stream_handler(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let query = params.query.trim().to_string();
    if query.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "query must not be empty"));
    }

    let session_id = params
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::info!(session_id = %session_id, "Stream requested");

    let request = RunRequest::new(session_id, query).with_model(params.model);
    let mut rx = state.conductor.start_run(request);

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            match Event::default().event(event.kind.name()).json_data(&event) {
                Ok(sse_event) => yield Ok(sse_event),
                Err(e) => tracing::warn!(error = %e, "Failed to encode progress event"),
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}

/// GET /sessions/:id/messages - session transcript
async fn messages_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let stored = state
        .conductor
        .store()
        .load(&session_id)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let Some(run) = stored else {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("session {} not found", session_id),
        ));
    };

    Ok(Json(json!({
        "session_id": session_id,
        "messages": run.transcript,
    })))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let providers: Vec<Value> = state
        .router
        .check_health()
        .await
        .into_iter()
        .map(|(name, healthy)| json!({ "name": name, "healthy": healthy }))
        .collect();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "providers": providers,
    }))
}
