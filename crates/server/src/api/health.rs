use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use serde::Serialize;

use rowgate_core::{ScopeKey, UsageMetric};
use rowgate_gateway::{MetricsSnapshot, QuotaBackend};

use super::AppState;
use crate::error::ServerError;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub function: String,
    pub backend: &'static str,
    pub metrics: MetricsSnapshot,
}

/// `GET /health` -- service status and dispatch metrics.
///
/// A persistent usage store is checked with a read; if it cannot be reached
/// the endpoint answers 503.
pub async fn health(State(state): State<AppState>) -> Result<impl IntoResponse, ServerError> {
    let dispatcher = &state.dispatcher;
    let backend = dispatcher.quota().backend();

    if let QuotaBackend::Persistent(store) = backend {
        let scope = ScopeKey::for_instant("health", dispatcher.function().clone(), &Utc::now());
        store.aggregate(&scope, UsageMetric::Requests).await?;
    }

    Ok(Json(HealthResponse {
        status: "ok",
        function: dispatcher.function().to_string(),
        backend: backend.label(),
        metrics: dispatcher.metrics(),
    }))
}
