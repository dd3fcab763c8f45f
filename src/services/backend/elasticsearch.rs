use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::config::ElasticsearchConfig;
use crate::services::backend::account::BackendAccount;
use crate::services::backend::client::{BackendError, UserManager};

/// Elasticsearch `_security/user` client with ordered host failover.
#[derive(Clone)]
pub struct ElasticsearchUserManager {
    http: reqwest::Client,
    hosts: Vec<Url>,
    username: String,
    password: String,
    dry_run: bool,
}

impl std::fmt::Debug for ElasticsearchUserManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchUserManager")
            .field("hosts", &self.hosts.iter().map(Url::as_str).collect::<Vec<_>>())
            .field("username", &self.username)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl ElasticsearchUserManager {
    pub fn new(config: &ElasticsearchConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(5)))
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            hosts: config.hosts.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            dry_run: config.dry_run,
        })
    }

    fn user_url(host: &Url, username: &str) -> String {
        format!(
            "{}/_security/user/{}",
            host.as_str().trim_end_matches('/'),
            urlencoding::encode(username)
        )
    }

    async fn upsert_on(
        &self,
        host: &Url,
        username: &str,
        account: &BackendAccount,
    ) -> Result<(), BackendError> {
        let resp = self
            .http
            .post(Self::user_url(host, username))
            .basic_auth(&self.username, Some(&self.password))
            .json(account)
            .send()
            .await
            .map_err(map_transport)?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(BackendError::Rejected {
            status: status.as_u16(),
            body: truncate(body, 512),
        })
    }
}

#[async_trait]
impl UserManager for ElasticsearchUserManager {
    async fn upsert(&self, username: &str, account: &BackendAccount) -> Result<(), BackendError> {
        if self.dry_run {
            tracing::info!(username, roles = ?account.roles, "dry run: skipping backend upsert");
            return Ok(());
        }

        let mut last_err = BackendError::Transport("no backend hosts configured".to_string());
        for host in &self.hosts {
            match self.upsert_on(host, username, account).await {
                Ok(()) => {
                    tracing::debug!(username, host = %host, "backend user upserted");
                    return Ok(());
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(host = %host, error = %e, "backend host failed, trying next");
                    last_err = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }
}

fn map_transport(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Transport(e.to_string())
    }
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
    }
    s
}
