//! Issuer discovery and JWKS caching.
use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use url::Url;

/// Minimum spacing between forced refetches triggered by unknown `kid`s.
const FORCED_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum JwksError {
    /// The key set could not be retrieved; says nothing about the token.
    #[error("JWKS unavailable: {0}")]
    Fetch(String),
    #[error("no signing key for kid {0:?}")]
    UnknownKid(Option<String>),
}

/// Subset of `/.well-known/openid-configuration` we care about.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub jwks_uri: Option<Url>,
    pub userinfo_endpoint: Option<Url>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: Option<String>,
    // RSA
    pub n: Option<String>,
    pub e: Option<String>,
    // EC
    pub x: Option<String>,
    pub y: Option<String>,
}

impl Jwk {
    /// Whether `alg` belongs to this key's family (RSA keys never verify HMAC or EC).
    pub fn supports(&self, alg: Algorithm) -> bool {
        use Algorithm::*;
        match self.kty.as_str() {
            "RSA" => matches!(alg, RS256 | RS384 | RS512 | PS256 | PS384 | PS512),
            "EC" => matches!(alg, ES256 | ES384),
            _ => false,
        }
    }

    pub fn decoding_key(&self) -> Result<DecodingKey, String> {
        match self.kty.as_str() {
            "RSA" => match (&self.n, &self.e) {
                (Some(n), Some(e)) => {
                    DecodingKey::from_rsa_components(n, e).map_err(|e| e.to_string())
                }
                _ => Err("RSA key without n/e".to_string()),
            },
            "EC" => match (&self.x, &self.y) {
                (Some(x), Some(y)) => DecodingKey::from_ec_components(x, y).map_err(|e| e.to_string()),
                _ => Err("EC key without x/y".to_string()),
            },
            other => Err(format!("unsupported key type {other}")),
        }
    }
}

#[derive(Debug)]
struct CachedJwks {
    jwks: Jwks,
    fetched_at: Instant,
}

#[derive(Debug)]
pub struct JwksCache {
    http: reqwest::Client,
    ttl: Duration,
    cached: RwLock<Option<CachedJwks>>,
    last_forced: Mutex<Option<Instant>>,
}

impl JwksCache {
    pub fn new(http: reqwest::Client, ttl: Duration) -> Self {
        Self {
            http,
            ttl,
            cached: RwLock::new(None),
            last_forced: Mutex::new(None),
        }
    }

    async fn fetch(&self, uri: &Url) -> Result<Jwks, JwksError> {
        tracing::debug!(jwks_uri = %uri, "fetching JWKS");
        let jwks = self
            .http
            .get(uri.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| JwksError::Fetch(e.to_string()))?
            .json::<Jwks>()
            .await
            .map_err(|e| JwksError::Fetch(format!("decode: {e}")))?;

        *self.cached.write().await = Some(CachedJwks {
            jwks: jwks.clone(),
            fetched_at: Instant::now(),
        });
        tracing::info!(keys = jwks.keys.len(), "JWKS cache refreshed");
        Ok(jwks)
    }

    /// Returns `(keys, fetched_just_now)`.
    async fn current(&self, uri: &Url) -> Result<(Jwks, bool), JwksError> {
        {
            let cached = self.cached.read().await;
            if let Some(c) = cached.as_ref() {
                if c.fetched_at.elapsed() < self.ttl {
                    return Ok((c.jwks.clone(), false));
                }
            }
        }
        Ok((self.fetch(uri).await?, true))
    }

    fn find(jwks: &Jwks, kid: Option<&str>) -> Option<Jwk> {
        match kid {
            Some(kid) => jwks.keys.iter().find(|k| k.kid.as_deref() == Some(kid)),
            None => jwks.keys.first(),
        }
        .cloned()
    }

    /// Key for `kid`; an unknown `kid` triggers one rate-limited refetch (key rotation).
    pub async fn key_for(&self, uri: &Url, kid: Option<&str>) -> Result<Jwk, JwksError> {
        let (jwks, fresh) = self.current(uri).await?;
        if let Some(key) = Self::find(&jwks, kid) {
            return Ok(key);
        }

        if !fresh {
            let mut last = self.last_forced.lock().await;
            let allowed = last.is_none_or(|t| t.elapsed() >= FORCED_REFRESH_INTERVAL);
            if allowed {
                *last = Some(Instant::now());
                drop(last);
                let jwks = self.fetch(uri).await?;
                if let Some(key) = Self::find(&jwks, kid) {
                    return Ok(key);
                }
            }
        }

        Err(JwksError::UnknownKid(kid.map(str::to_string)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ec(kid: &str) -> serde_json::Value {
        serde_json::json!({
            "kty": "EC",
            "kid": kid,
            "x": "5tgWSZoQ-prA_wYkPnwH8evjlJ4EI-q7ajvV7D4eMt4",
            "y": "wWHXpU9Ubsamd9QLfpBucf4OsRvFMAvXrBJD7DS9tVI",
        })
    }

    #[test]
    fn key_family_restricts_algorithms() {
        let key: Jwk = serde_json::from_value(ec("a")).unwrap();
        assert!(key.supports(Algorithm::ES256));
        assert!(!key.supports(Algorithm::HS256));
        assert!(!key.supports(Algorithm::RS256));
        assert!(key.decoding_key().is_ok());
    }

    #[tokio::test]
    async fn unknown_kid_refetches_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "keys": [ec("a")] })),
            )
            .expect(2)
            .mount(&server)
            .await;
        let uri = Url::parse(&format!("{}/jwks", server.uri())).unwrap();
        let cache = JwksCache::new(reqwest::Client::new(), Duration::from_secs(3600));

        assert_eq!(cache.key_for(&uri, Some("a")).await.unwrap().kid.as_deref(), Some("a"));
        // cached hit, no fetch
        assert!(cache.key_for(&uri, Some("a")).await.is_ok());
        // forced refetch
        assert!(matches!(
            cache.key_for(&uri, Some("rotated")).await,
            Err(JwksError::UnknownKid(_))
        ));
        // rate limited, no fetch
        assert!(matches!(
            cache.key_for(&uri, Some("rotated")).await,
            Err(JwksError::UnknownKid(_))
        ));
    }

    #[tokio::test]
    async fn fetch_failures_are_not_unknown_kids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let uri = Url::parse(&format!("{}/jwks", server.uri())).unwrap();
        let cache = JwksCache::new(reqwest::Client::new(), Duration::from_secs(3600));

        assert!(matches!(cache.key_for(&uri, Some("a")).await, Err(JwksError::Fetch(_))));

        let unreachable = Url::parse("http://127.0.0.1:9/jwks").unwrap();
        assert!(matches!(
            cache.key_for(&unreachable, Some("a")).await,
            Err(JwksError::Fetch(_))
        ));
    }
}
