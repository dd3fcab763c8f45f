//! Shared helpers: env-style config maps, app assembly and response decoding.
#![allow(dead_code)]

use std::collections::HashMap;

use axum::{Router, body::Body, http::Response};
use base64::{Engine, engine::general_purpose::STANDARD};
use http_body_util::BodyExt;
use wiremock::MockServer;

use elastauth::app;
use elastauth::config::Config;
use elastauth::services::crypto;
use elastauth::state::AppState;

/// Minimal header-provider setup pointed at `backend` for user provisioning.
pub fn base_env(backend: &MockServer) -> HashMap<String, String> {
    [
        ("ELASTAUTH_ELASTICSEARCH_HOSTS", backend.uri()),
        ("ELASTAUTH_ELASTICSEARCH_USERNAME", "elastic".to_string()),
        ("ELASTAUTH_ELASTICSEARCH_PASSWORD", "changeme".to_string()),
        ("ELASTAUTH_SECRET_KEY", crypto::generate_key_hex()),
        ("ELASTAUTH_BACKEND_RETRY_BACKOFF_MS", "1".to_string()),
        ("ELASTAUTH_DEFAULT_ROLES", "kibana_user".to_string()),
        (
            "ELASTAUTH_GROUP_MAPPINGS",
            r#"{"admins":["superuser"],"devs":["kibana_admin","monitoring_user"]}"#.to_string(),
        ),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

pub fn config(env: &HashMap<String, String>) -> Config {
    Config::from_lookup(|key| env.get(key).cloned()).expect("valid test config")
}

pub async fn state(env: &HashMap<String, String>) -> AppState {
    app::build_state(config(env)).await.expect("state builds")
}

pub async fn router(env: &HashMap<String, String>) -> Router {
    app::build_router(state(env).await)
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("body readable")
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json body")
}

/// Splits `Basic base64(user:secret)` back into its parts.
pub fn decode_basic(value: &str) -> (String, String) {
    let encoded = value.strip_prefix("Basic ").expect("basic scheme");
    let decoded = String::from_utf8(STANDARD.decode(encoded).expect("base64")).expect("utf8");
    let (user, secret) = decoded.split_once(':').expect("user:secret");
    (user.to_string(), secret.to_string())
}

/// Bodies of every user upsert the mock backend received, in order.
pub async fn upserts(backend: &MockServer) -> Vec<(String, serde_json::Value)> {
    backend
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path().starts_with("/_security/user/"))
        .map(|r| {
            let user = r.url.path().trim_start_matches("/_security/user/").to_string();
            (user, serde_json::from_slice(&r.body).expect("upsert body is json"))
        })
        .collect()
}
