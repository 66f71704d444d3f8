//! HTTP surface of the Tollgate server.
//!
//! Mounts a small form application behind the CSRF layer plus the
//! operational endpoints, which are exempt from CSRF handling.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics::{counter, histogram};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, Span};

use crate::config::StorageConfig;
use crate::csrf::{CsrfGuard, CsrfLayer, Locals, MemoryStore, RedisStore, TokenStore};
use crate::error::Result;
use crate::telemetry::{redacted_headers, MetricsRegistry};

/// Locals key the demo handlers read the token from.
pub const CONTEXT_KEY: &str = "csrf";

/// Shared state for the operational endpoints.
#[derive(Clone)]
pub struct AppState {
    pub guard: Arc<CsrfGuard>,
    pub metrics: MetricsRegistry,
}

/// Build the token store selected by `config`.
///
/// The memory store gets its background sweeper spawned here, so this must
/// run inside a tokio runtime.
pub async fn build_store(config: &StorageConfig) -> Result<Arc<dyn TokenStore>> {
    match config {
        StorageConfig::Memory { gc_interval } => {
            let store = Arc::new(MemoryStore::with_gc_interval(*gc_interval));
            store.clone().start_cleanup_task();
            info!(gc_interval = ?gc_interval, "Using in-memory token store");
            Ok(store)
        }
        StorageConfig::Redis { url, key_prefix } => {
            let store = RedisStore::connect(url, key_prefix.clone()).await?;
            Ok(Arc::new(store))
        }
    }
}

/// Build the application router.
///
/// `/health` and `/metrics` sit outside the CSRF layer.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/", get(index))
        .route("/update", post(update))
        .layer(CsrfLayer::from_guard(state.guard.clone()));

    let operational = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .with_state(state);

    protected.merge(operational).layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &Request| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    headers = %redacted_headers(request.headers()),
                )
            })
            .on_response(|response: &Response, latency: Duration, _span: &Span| {
                let status = response.status().as_u16().to_string();
                counter!("http_requests_total", "status" => status).increment(1);
                histogram!("http_request_duration_seconds").record(latency.as_secs_f64());
            }),
    )
}

async fn index(locals: Locals) -> impl IntoResponse {
    let token = locals.get(CONTEXT_KEY).unwrap_or_default().to_string();
    Json(json!({ "csrf_token": token }))
}

async fn update() -> impl IntoResponse {
    Json(json!({ "success": true }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "store": state.guard.store().name(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.metrics.is_enabled() {
        return StatusCode::NOT_FOUND.into_response();
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
        .into_response()
}
