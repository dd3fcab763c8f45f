/*
 * Responsibility
 * - GET /elastauth/config: 実効設定の公開 (どの group がどの role になるか)
 * - secret 系の値は必ず mask する
 */
use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::api::dto::config::ConfigResponse;
use crate::config::{AuthProviderConfig, CacheConfig, CacheKind};
use crate::services::sanitize::mask_sensitive;
use crate::state::AppState;

pub async fn config(State(state): State<AppState>) -> Json<ConfigResponse> {
    let cfg = &state.config;

    Json(ConfigResponse {
        auth_provider: cfg.auth.name(),
        mode: cfg.mode().as_str(),
        cache: mask_sensitive(cache_view(&cfg.cache)),
        default_roles: cfg.roles.default_roles.clone(),
        group_mappings: cfg.roles.group_mappings.clone(),
        group_whitelist: cfg.group_whitelist.clone(),
        provider_config: mask_sensitive(provider_view(&cfg.auth)),
    })
}

fn cache_view(cache: &CacheConfig) -> Value {
    let mut view = json!({
        "type": cache.kind.as_str(),
        "expiration_secs": cache.ttl.as_secs(),
        "prefix": cache.key_prefix,
        "refresh_threshold": cache.refresh_threshold,
    });
    match cache.kind {
        CacheKind::Redis => {
            view["redis_host"] = json!(cache.redis_host);
            view["redis_db"] = json!(cache.redis_db);
        }
        CacheKind::File => view["file_dir"] = json!(cache.file_dir.display().to_string()),
        CacheKind::Memory => {}
    }
    view
}

fn provider_view(auth: &AuthProviderConfig) -> Value {
    match auth {
        AuthProviderConfig::Authelia(names) => json!({
            "header_username": names.username,
            "header_groups": names.groups,
            "header_email": names.email,
            "header_name": names.full_name,
        }),
        AuthProviderConfig::Oidc(oidc) => json!({
            "issuer": oidc.issuer,
            "client_id": oidc.client_id,
            "client_secret": oidc.client_secret,
            "jwks_uri": oidc.jwks_uri.as_ref().map(|u| u.as_str()),
            "userinfo_endpoint": oidc.userinfo_endpoint.as_ref().map(|u| u.as_str()),
            "validation_mode": oidc.token_validation.as_str(),
            "claim_mappings": {
                "username": oidc.claims.username,
                "email": oidc.claims.email,
                "groups": oidc.claims.groups,
                "full_name": oidc.claims.full_name,
            },
            "custom_header_names": oidc.custom_headers.keys().collect::<Vec<_>>(),
        }),
    }
}
