//! Admin route handlers.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::resilience::{
    Backend, BackendHealthReport, CacheStats, QueueInfo, ResetTarget, ResilienceService,
    StatusSnapshot,
};
use crate::types::{Error, Result};
use crate::validation::validate_non_empty;

/// Shared handler state.
pub type AdminState = Arc<ResilienceService>;

/// Build the admin router over a service.
pub fn router(service: AdminState) -> Router {
    Router::new()
        .route("/health", get(liveness))
        .route("/admin/status", get(get_status))
        .route("/admin/backends/{backend}", get(get_backend))
        .route("/admin/backends/{backend}/reset", post(reset_backend))
        .route("/admin/network/check", post(check_network))
        .route("/admin/cache", get(get_cache).delete(clear_cache))
        .route("/admin/queue", get(get_queue).delete(clear_queue))
        .with_state(service)
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("admin_request_failed: {}", self);
        }
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct NetworkCheckParams {
    #[serde(default)]
    pub force: bool,
}

async fn liveness() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_status(State(service): State<AdminState>) -> Json<StatusSnapshot> {
    Json(service.refresh_status().await)
}

async fn get_backend(
    State(service): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<BackendHealthReport>> {
    let backend = parse_backend(&name)?;
    let snapshot = service.refresh_status().await;
    snapshot
        .backends
        .get(&backend)
        .cloned()
        .map(Json)
        .ok_or_else(|| Error::not_found(format!("No health record for {}", backend)))
}

async fn reset_backend(
    State(service): State<AdminState>,
    Path(name): Path<String>,
) -> Result<Json<StatusSnapshot>> {
    validate_non_empty(&name, "backend")?;
    let target: ResetTarget = name.parse()?;
    tracing::info!("admin_reset: target={:?}", target);
    Ok(Json(service.reset(target).await))
}

async fn check_network(
    State(service): State<AdminState>,
    Query(params): Query<NetworkCheckParams>,
) -> Json<Value> {
    let available = service.check_network(params.force).await;
    let mode = service.mode().await;
    Json(json!({
        "network_available": available,
        "mode": mode,
    }))
}

async fn get_cache(State(service): State<AdminState>) -> Json<CacheStats> {
    Json(service.cache_stats().await)
}

async fn clear_cache(State(service): State<AdminState>) -> Json<Value> {
    let cleared = service.clear_cache().await;
    Json(json!({ "cleared": cleared }))
}

async fn get_queue(State(service): State<AdminState>) -> Json<QueueInfo> {
    Json(service.queue_info().await)
}

async fn clear_queue(State(service): State<AdminState>) -> Json<Value> {
    let cleared = service.clear_queue().await;
    Json(json!({ "cleared": cleared }))
}

fn parse_backend(name: &str) -> Result<Backend> {
    validate_non_empty(name, "backend")?;
    name.parse()
}
