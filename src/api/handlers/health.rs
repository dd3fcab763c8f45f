/*
 * Responsibility
 * - GET /elastauth/health, /elastauth/live (プロセス疎通)
 * - GET /elastauth/ready (credential store に到達できるか)
 */
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::api::dto::health::HealthResponse;
use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse::ok()))
}

pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse::ok()))
}

pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse::ok())),
        Err(e) => {
            tracing::warn!(backend = state.store.backend_name(), error = %e, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse::unavailable()),
            )
        }
    }
}
