//! Identity from headers set by a trusted forward-auth hop (Authelia style).
//!
//! No verification happens here: the ingress in front of the gateway must drop
//! client-supplied copies of these headers.
use axum::http::{HeaderMap, HeaderName};

use crate::config::{ConfigError, HeaderNames};
use crate::error::AppError;
use crate::services::identity::principal::Principal;

#[derive(Debug, Clone)]
pub struct HeaderExtractor {
    username: HeaderName,
    groups: HeaderName,
    email: HeaderName,
    full_name: HeaderName,
}

impl HeaderExtractor {
    pub fn new(names: &HeaderNames) -> Result<Self, ConfigError> {
        let parse = |name: &str, key: &'static str| {
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| ConfigError::Invalid(key))
        };
        Ok(Self {
            username: parse(&names.username, "HEADERS_USERNAME")?,
            groups: parse(&names.groups, "HEADERS_GROUPS")?,
            email: parse(&names.email, "HEADERS_EMAIL")?,
            full_name: parse(&names.full_name, "HEADERS_NAME")?,
        })
    }

    pub fn extract(&self, headers: &HeaderMap) -> Result<Principal, AppError> {
        let username = header_str(headers, &self.username)?
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                AppError::MissingPrincipal(format!("header {} is missing", self.username))
            })?;

        let groups_raw = header_text(headers, &self.groups)?.unwrap_or_default();
        let groups: Vec<&str> = groups_raw.split(',').collect();
        if groups_raw.trim().is_empty() {
            tracing::warn!(username, header = %self.groups, "no groups supplied");
        }

        Principal::new(
            username,
            header_text(headers, &self.email)?,
            header_text(headers, &self.full_name)?,
            groups,
        )
    }
}

/// Username: visible ASCII only, anything else is not a usable account name.
fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Result<Option<&'a str>, AppError> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map_err(|_| AppError::InvalidPrincipal(format!("header {name} is not valid text")))
        })
        .transpose()
}

/// Display values (email, name, groups) arrive as raw UTF-8 from forward-auth servers.
fn header_text<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Result<Option<&'a str>, AppError> {
    headers
        .get(name)
        .map(|v| {
            std::str::from_utf8(v.as_bytes())
                .map_err(|_| AppError::InvalidPrincipal(format!("header {name} is not valid UTF-8")))
        })
        .transpose()
}
