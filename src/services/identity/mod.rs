pub mod claims;
pub mod headers;
pub mod jwks;
pub mod principal;
pub mod token;

use std::collections::BTreeSet;

use axum::http::HeaderMap;

pub use headers::HeaderExtractor;
pub use principal::Principal;
pub use token::TokenExtractor;

use crate::config::AuthProviderConfig;
use crate::error::AppError;

/// Principal extraction strategy, chosen once at startup.
#[derive(Debug)]
enum Strategy {
    Headers(HeaderExtractor),
    Token(Box<TokenExtractor>),
}

#[derive(Debug)]
pub struct PrincipalExtractor {
    strategy: Strategy,
    group_whitelist: Option<BTreeSet<String>>,
}

impl PrincipalExtractor {
    pub fn from_config(
        config: &AuthProviderConfig,
        group_whitelist: Option<BTreeSet<String>>,
    ) -> Result<Self, AppError> {
        let strategy = match config {
            AuthProviderConfig::Authelia(names) => Strategy::Headers(HeaderExtractor::new(names)?),
            AuthProviderConfig::Oidc(oidc) => {
                Strategy::Token(Box::new(TokenExtractor::new(oidc.clone())?))
            }
        };
        Ok(Self {
            strategy,
            group_whitelist,
        })
    }

    pub fn name(&self) -> &'static str {
        match self.strategy {
            Strategy::Headers(_) => "authelia",
            Strategy::Token(_) => "oidc",
        }
    }

    pub async fn extract(&self, headers: &HeaderMap) -> Result<Principal, AppError> {
        let principal = match &self.strategy {
            Strategy::Headers(h) => h.extract(headers)?,
            Strategy::Token(t) => t.extract(headers).await?,
        };
        self.check_whitelist(&principal)?;
        Ok(principal)
    }

    fn check_whitelist(&self, principal: &Principal) -> Result<(), AppError> {
        let Some(allowed) = &self.group_whitelist else {
            return Ok(());
        };
        match principal.groups.iter().find(|g| !allowed.contains(*g)) {
            Some(group) => Err(AppError::InvalidPrincipal(format!(
                "group '{group}' is not in whitelist"
            ))),
            None => Ok(()),
        }
    }
}
