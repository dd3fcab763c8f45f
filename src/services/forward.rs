//! Transparent-proxy transport: relays an authenticated request to the backend
//! origin with the resolved Basic credential and streams the answer back.
use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Request, Response, header},
};
use url::Url;

use crate::config::ProxyConfig;
use crate::error::AppError;
use crate::services::credentials::Credential;

/// Connection-scoped headers (RFC 9110 §7.6.1) never forwarded in either direction.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Backend response headers that would make clients prompt for, or reason
/// about, backend credentials they never hold.
const STRIPPED_RESPONSE: &[&str] = &["www-authenticate", "proxy-authenticate", "x-elastic-product"];

#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    target: Url,
}

impl Forwarder {
    pub fn new(config: &ProxyConfig, target: Url) -> Result<Self, AppError> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.max_idle_conns)
            .pool_idle_timeout(config.idle_conn_timeout)
            .danger_accept_invalid_certs(config.insecure_skip_verify);

        if config.insecure_skip_verify {
            tracing::warn!("proxy TLS verification disabled");
        }

        if let Some(path) = &config.ca_cert {
            let pem = std::fs::read(path).map_err(|e| {
                tracing::error!(path = %path.display(), error = %e, "cannot read proxy CA certificate");
                AppError::Internal
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                tracing::error!(error = %e, "invalid proxy CA certificate");
                AppError::Internal
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder.build().map_err(|e| {
            tracing::error!(error = %e, "failed to build proxy client");
            AppError::Internal
        })?;

        Ok(Self { client, target })
    }

    /// Target URL: backend origin (plus any base path) + the inbound path and query.
    fn upstream_url(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.target.clone();
        let base = self.target.path().trim_end_matches('/');
        url.set_path(&format!("{base}{path}"));
        url.set_query(query);
        url
    }

    pub async fn forward(
        &self,
        req: Request<Body>,
        credential: &Credential,
    ) -> Result<Response<Body>, AppError> {
        let (parts, body) = req.into_parts();
        let url = self.upstream_url(parts.uri.path(), parts.uri.query());

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        let auth = HeaderValue::from_str(&credential.authorization_header()).map_err(|_| {
            tracing::error!("credential does not form a valid header value");
            AppError::Internal
        })?;
        headers.insert(header::AUTHORIZATION, auth);

        tracing::debug!(method = %parts.method, %url, username = credential.username(), "forwarding");

        let upstream = self
            .client
            .request(parts.method, url)
            .headers(headers)
            .body(reqwest::Body::wrap_stream(body.into_data_stream()))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    tracing::warn!(error = %e, "backend request timed out");
                    AppError::GatewayTimeout
                } else {
                    tracing::warn!(error = %e, "backend request failed");
                    AppError::BackendUnavailable(e.to_string())
                }
            })?;

        let status = upstream.status();
        metrics::counter!("elastauth_proxy_requests_total", "status" => status.as_u16().to_string())
            .increment(1);

        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);
        for name in STRIPPED_RESPONSE {
            headers.remove(*name);
        }

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Removes hop-by-hop headers, including any listed in `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}
