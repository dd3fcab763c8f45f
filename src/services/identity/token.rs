//! Identity from an OIDC bearer token (JWKS signature check and/or userinfo).
use axum::http::{HeaderMap, header};
use jsonwebtoken::{Validation, decode, decode_header};
use serde_json::Value;
use tokio::sync::OnceCell;
use url::Url;

use crate::config::{OidcConfig, TokenValidation};
use crate::error::AppError;
use crate::services::identity::claims::{string_claim, string_list_claim};
use crate::services::identity::jwks::{JwksCache, JwksError, ProviderMetadata};
use crate::services::identity::principal::Principal;

const ID_TOKEN_COOKIE: &str = "id_token";

#[derive(Debug)]
pub struct TokenExtractor {
    config: OidcConfig,
    http: reqwest::Client,
    keys: JwksCache,
    discovery: OnceCell<ProviderMetadata>,
}

impl TokenExtractor {
    pub fn new(config: OidcConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build OIDC http client");
                AppError::Internal
            })?;
        let keys = JwksCache::new(http.clone(), config.jwks_cache_ttl);

        Ok(Self {
            config,
            http,
            keys,
            discovery: OnceCell::new(),
        })
    }

    pub async fn extract(&self, headers: &HeaderMap) -> Result<Principal, AppError> {
        let token = find_token(headers, &self.config.token_cookie).ok_or_else(|| {
            AppError::MissingPrincipal("no bearer token or token cookie".into())
        })?;

        let claims = self.validate(&token).await?;
        self.map_claims(&claims)
    }

    async fn validate(&self, token: &str) -> Result<Value, AppError> {
        match self.config.token_validation {
            TokenValidation::Jwks => self.validate_jwt(token).await,
            TokenValidation::Userinfo => self.userinfo(token).await,
            TokenValidation::Both => match self.validate_jwt(token).await {
                Ok(claims) => Ok(claims),
                Err(e) => {
                    tracing::debug!(error = %e, "JWKS validation failed, trying userinfo");
                    self.userinfo(token).await
                }
            },
        }
    }

    async fn metadata(&self) -> Result<&ProviderMetadata, AppError> {
        self.discovery
            .get_or_try_init(|| async {
                let Some(issuer) = self.config.issuer.as_deref() else {
                    return Ok(ProviderMetadata {
                        jwks_uri: None,
                        userinfo_endpoint: None,
                    });
                };
                let url = format!("{issuer}/.well-known/openid-configuration");
                tracing::info!(%url, "discovering OIDC provider");
                self.http
                    .get(&url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| AppError::BackendUnavailable(format!("OIDC discovery: {e}")))?
                    .json::<ProviderMetadata>()
                    .await
                    .map_err(|e| AppError::BackendUnavailable(format!("OIDC discovery: {e}")))
            })
            .await
    }

    async fn jwks_uri(&self) -> Result<Url, AppError> {
        if let Some(uri) = &self.config.jwks_uri {
            return Ok(uri.clone());
        }
        self.metadata()
            .await?
            .jwks_uri
            .clone()
            .ok_or_else(|| AppError::BackendUnavailable("issuer publishes no jwks_uri".into()))
    }

    async fn userinfo_endpoint(&self) -> Result<Url, AppError> {
        if let Some(uri) = &self.config.userinfo_endpoint {
            return Ok(uri.clone());
        }
        self.metadata()
            .await?
            .userinfo_endpoint
            .clone()
            .ok_or_else(|| {
                AppError::BackendUnavailable("issuer publishes no userinfo_endpoint".into())
            })
    }

    async fn validate_jwt(&self, token: &str) -> Result<Value, AppError> {
        let header =
            decode_header(token).map_err(|e| AppError::TokenInvalid(format!("header: {e}")))?;

        let uri = self.jwks_uri().await?;
        let jwk = self
            .keys
            .key_for(&uri, header.kid.as_deref())
            .await
            .map_err(|e| match e {
                JwksError::Fetch(_) => AppError::BackendUnavailable(e.to_string()),
                JwksError::UnknownKid(_) => AppError::TokenInvalid(e.to_string()),
            })?;
        if !jwk.supports(header.alg) {
            return Err(AppError::TokenInvalid(format!(
                "{:?} does not match {} key",
                header.alg, jwk.kty
            )));
        }
        let key = jwk.decoding_key().map_err(AppError::TokenInvalid)?;

        let mut validation = Validation::new(header.alg);
        if let Some(issuer) = self.config.issuer.as_deref() {
            validation.set_issuer(&[issuer.to_string(), format!("{issuer}/")]);
        }
        match self.config.client_id.as_deref() {
            Some(client_id) => validation.set_audience(&[client_id]),
            None => validation.validate_aud = false,
        }

        let data = decode::<Value>(token, &key, &validation)
            .map_err(|e| AppError::TokenInvalid(e.to_string()))?;
        Ok(data.claims)
    }

    async fn userinfo(&self, token: &str) -> Result<Value, AppError> {
        let endpoint = self.userinfo_endpoint().await?;

        let mut req = self.http.get(endpoint).bearer_auth(token);
        for (name, value) in &self.config.custom_headers {
            req = req.header(name.as_str(), value.as_str());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| AppError::BackendUnavailable(format!("userinfo: {e}")))?;
        if !resp.status().is_success() {
            return Err(AppError::TokenInvalid(format!(
                "userinfo returned {}",
                resp.status()
            )));
        }

        let claims: Value = resp
            .json()
            .await
            .map_err(|e| AppError::TokenInvalid(format!("userinfo body: {e}")))?;
        if !claims.is_object() {
            return Err(AppError::TokenInvalid("userinfo body is not an object".into()));
        }
        Ok(claims)
    }

    fn map_claims(&self, claims: &Value) -> Result<Principal, AppError> {
        let mapping = &self.config.claims;
        let username = string_claim(claims, &mapping.username)
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| AppError::ClaimMissing(mapping.username.clone()))?;

        Principal::new(
            &username,
            string_claim(claims, &mapping.email).as_deref(),
            string_claim(claims, &mapping.full_name).as_deref(),
            string_list_claim(claims, &mapping.groups),
        )
    }
}

/// `Authorization: Bearer`, then the configured cookie, then `id_token`.
fn find_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, rest) = v.split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| rest.trim())
        })
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    cookie(headers, cookie_name).or_else(|| cookie(headers, ID_TOKEN_COOKIE))
}

fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, v)| *k == name && !v.is_empty())
        .map(|(_, v)| v.to_string())
}
