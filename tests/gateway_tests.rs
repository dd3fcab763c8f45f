//! Auth-only gateway tests
//!
//! Tests for:
//! - Provisioning on first sight (roles, metadata, Basic header)
//! - Rejection of requests without a usable identity
//! - Cache hits, expiry and regeneration
//! - Group whitelist enforcement
//! - Bypass routes and configuration masking
//! - Concurrent resolution of one username

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use tower::ServiceExt;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use elastauth::services::cache::CredentialStore;
use elastauth::services::identity::Principal;

mod common;

async fn backend_accepting_users() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/_security/user/[^/]+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"created": true})))
        .mount(&server)
        .await;
    server
}

fn elastauth_request(user: Option<&str>, groups: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri("/elastauth");
    if let Some(user) = user {
        builder = builder.header("Remote-User", user);
    }
    if let Some(groups) = groups {
        builder = builder.header("Remote-Groups", groups);
    }
    builder
        .header("Remote-Email", "alice@example.com")
        .header("Remote-Name", "Alice Example")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_first_request_provisions_user() {
    let backend = backend_accepting_users().await;
    let app = common::router(&common::base_env(&backend)).await;

    let response = app
        .oneshot(elastauth_request(Some("alice"), Some("admins,devs")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let auth = response
        .headers()
        .get(header::AUTHORIZATION)
        .expect("authorization header")
        .to_str()
        .unwrap()
        .to_string();
    let (user, secret) = common::decode_basic(&auth);
    assert_eq!(user, "alice");
    assert_eq!(secret.len(), 32);

    let upserts = common::upserts(&backend).await;
    assert_eq!(upserts.len(), 1);
    let (name, body) = &upserts[0];
    assert_eq!(name, "alice");
    assert_eq!(body["enabled"], true);
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["full_name"], "Alice Example");
    assert_eq!(body["password"], secret.as_str());
    assert_eq!(
        body["roles"],
        serde_json::json!(["kibana_admin", "monitoring_user", "superuser"])
    );
    assert_eq!(body["metadata"]["groups"], serde_json::json!(["admins", "devs"]));
}

#[tokio::test]
async fn test_unmapped_groups_get_default_roles() {
    let backend = backend_accepting_users().await;
    let app = common::router(&common::base_env(&backend)).await;

    let response = app
        .oneshot(elastauth_request(Some("bob"), Some("guests")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let upserts = common::upserts(&backend).await;
    assert_eq!(upserts[0].1["roles"], serde_json::json!(["kibana_user"]));
}

#[tokio::test]
async fn test_missing_username_is_rejected_without_backend_calls() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&backend)
        .await;
    let app = common::router(&common::base_env(&backend)).await;

    let response = app.oneshot(elastauth_request(None, Some("admins"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::AUTHORIZATION).is_none());
    let body = common::body_json(response).await;
    assert_eq!(body["error"]["code"], "MISSING_PRINCIPAL");
}

#[tokio::test]
async fn test_invalid_username_is_rejected() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&backend)
        .await;
    let app = common::router(&common::base_env(&backend)).await;

    let response = app
        .oneshot(elastauth_request(Some("../etc/passwd"), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = common::body_json(response).await;
    assert_eq!(body["error"]["code"], "INVALID_PRINCIPAL");
}

#[tokio::test]
async fn test_group_outside_whitelist_is_rejected() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_security/user/alice"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&backend)
        .await;
    let mut env = common::base_env(&backend);
    env.insert("ELASTAUTH_ENABLE_GROUP_WHITELIST".into(), "true".into());
    env.insert("ELASTAUTH_GROUP_WHITELIST".into(), "admins".into());
    let app = common::router(&env).await;

    let rejected = app
        .clone()
        .oneshot(elastauth_request(Some("alice"), Some("admins,contractors")))
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
    assert!(rejected.headers().get(header::AUTHORIZATION).is_none());
    let body = common::body_json(rejected).await;
    assert_eq!(body["error"]["code"], "INVALID_PRINCIPAL");
    assert!(common::upserts(&backend).await.is_empty());

    let accepted = app
        .oneshot(elastauth_request(Some("alice"), Some("admins")))
        .await
        .unwrap();
    assert_eq!(accepted.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_repeat_request_is_served_from_cache() {
    let backend = backend_accepting_users().await;
    let app = common::router(&common::base_env(&backend)).await;

    let first = app
        .clone()
        .oneshot(elastauth_request(Some("alice"), Some("admins")))
        .await
        .unwrap();
    let second = app
        .oneshot(elastauth_request(Some("alice"), Some("admins")))
        .await
        .unwrap();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(
        first.headers().get(header::AUTHORIZATION),
        second.headers().get(header::AUTHORIZATION)
    );
    assert_eq!(common::upserts(&backend).await.len(), 1);
}

#[tokio::test]
async fn test_expired_entry_rotates_secret() {
    let backend = backend_accepting_users().await;
    let mut env = common::base_env(&backend);
    env.insert("ELASTAUTH_CACHE_EXPIRATION".into(), "1s".into());
    let app = common::router(&env).await;

    let first = app
        .clone()
        .oneshot(elastauth_request(Some("alice"), None))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let second = app.oneshot(elastauth_request(Some("alice"), None)).await.unwrap();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    assert_ne!(
        first.headers().get(header::AUTHORIZATION),
        second.headers().get(header::AUTHORIZATION)
    );
    assert_eq!(common::upserts(&backend).await.len(), 2);
}

#[tokio::test]
async fn test_backend_failure_returns_500_and_caches_nothing() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_security/user/alice"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&backend)
        .await;
    let env = common::base_env(&backend);
    let state = common::state(&env).await;
    let app = elastauth::app::build_router(state.clone());

    let response = app.oneshot(elastauth_request(Some("alice"), None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().get(header::AUTHORIZATION).is_none());
    let key = state.credentials.cache_key("alice");
    assert_eq!(state.store.get(&key).await.unwrap(), None);
}

#[tokio::test]
async fn test_bypass_routes_ignore_identity_headers() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&backend)
        .await;
    let app = common::router(&common::base_env(&backend)).await;

    for uri in [
        "/elastauth/health",
        "/elastauth/live",
        "/elastauth/ready",
        "/elastauth/config",
        "/elastauth/docs",
        "/elastauth/api/openapi.yaml",
    ] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .header("Remote-User", "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        assert!(response.headers().get(header::AUTHORIZATION).is_none(), "{uri}");
        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff",
            "{uri}"
        );
    }

    let response = app
        .oneshot(
            Request::builder()
                .uri("/elastauth/unknown")
                .header("Remote-User", "alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_route_bypasses_authentication() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&backend)
        .await;
    let mut env = common::base_env(&backend);
    env.insert("ELASTAUTH_METRICS_ENABLED".into(), "true".into());
    let app = common::router(&env).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/elastauth/metrics")
                .header("Remote-User", "alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::AUTHORIZATION).is_none());
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
}

#[tokio::test]
async fn test_metrics_route_absent_when_disabled() {
    let backend = backend_accepting_users().await;
    let app = common::router(&common::base_env(&backend)).await;

    let response = app
        .oneshot(Request::builder().uri("/elastauth/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_any_path_authenticates_in_auth_only_mode() {
    let backend = backend_accepting_users().await;
    let app = common::router(&common::base_env(&backend)).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/app/dashboards?from=now-1h")
                .header("Remote-User", "alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::AUTHORIZATION).is_some());
}

#[tokio::test]
async fn test_config_endpoint_masks_secrets() {
    let backend = MockServer::start().await;
    let mut env = common::base_env(&backend);
    env.insert("ELASTAUTH_AUTH_PROVIDER".into(), "oidc".into());
    env.insert("ELASTAUTH_OIDC_ISSUER".into(), "https://idp.example.com".into());
    env.insert("ELASTAUTH_OIDC_CLIENT_ID".into(), "elastauth".into());
    env.insert("ELASTAUTH_OIDC_CLIENT_SECRET".into(), "super-secret".into());
    let app = common::router(&env).await;

    let response = app
        .oneshot(Request::builder().uri("/elastauth/config").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::body_json(response).await;
    assert_eq!(body["auth_provider"], "oidc");
    assert_eq!(body["mode"], "auth-only");
    assert_eq!(body["default_roles"], serde_json::json!(["kibana_user"]));
    assert_eq!(body["group_mappings"]["admins"], serde_json::json!(["superuser"]));
    assert_eq!(body["provider_config"]["client_secret"], "***");
    assert_eq!(body["provider_config"]["client_id"], "elastauth");
    assert_eq!(body["cache"]["type"], "memory");

    let raw = body.to_string();
    assert!(!raw.contains("super-secret"));
    assert!(!raw.contains("changeme"));
}

#[tokio::test]
async fn test_concurrent_resolves_provision_once() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_security/user/alice"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(50)))
        .expect(1)
        .mount(&backend)
        .await;
    let state = common::state(&common::base_env(&backend)).await;
    let principal = Principal::new("alice", None, None, ["admins"]).unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let credentials = state.credentials.clone();
            let principal = principal.clone();
            tokio::spawn(async move { credentials.resolve(&principal).await })
        })
        .collect();

    let mut secrets = Vec::new();
    for handle in handles {
        secrets.push(handle.await.unwrap().unwrap().secret().to_string());
    }

    secrets.dedup();
    assert_eq!(secrets.len(), 1);
    assert_eq!(state.credentials.in_flight(), 0);
}
