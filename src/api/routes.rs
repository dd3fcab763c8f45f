/*
 * Responsibility
 * - URL 構造を定義
 * - /elastauth/... の bypass (health/ready/live/config/docs/metrics) は認証を通さない
 * - それ以外は mode (auth-only / proxy) によって handler を起動時に一度だけ決める
 */
use axum::{
    Router,
    routing::{any, get},
};

use crate::api::handlers::{
    auth::authenticate,
    config::config,
    docs::{docs, openapi},
    health::{health, live, ready},
    metrics::metrics,
    proxy::proxy,
    reserved::not_found,
};
use crate::config::Mode;
use crate::middleware::security_headers;
use crate::state::AppState;

pub fn routes(state: &AppState) -> Router<AppState> {
    let mut bypass = Router::new()
        .route("/elastauth/health", get(health))
        .route("/elastauth/ready", get(ready))
        .route("/elastauth/live", get(live))
        .route("/elastauth/config", get(config))
        .route("/elastauth/docs", get(docs))
        .route("/elastauth/api/openapi.yaml", get(openapi))
        .route("/elastauth/{*rest}", any(not_found));

    if state.metrics.is_some() {
        bypass = bypass.route("/elastauth/metrics", get(metrics));
    }

    let pipeline = Router::new().route("/elastauth", any(authenticate));
    let pipeline = match state.mode() {
        Mode::AuthOnly => pipeline.fallback(authenticate),
        Mode::Proxy => pipeline.fallback(proxy),
    };

    security_headers::apply(bypass).merge(pipeline)
}
