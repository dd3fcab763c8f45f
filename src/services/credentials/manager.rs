//! Credential lifecycle: cache lookup, generation, provisioning, refresh.
//!
//! Flow per call (no state of its own besides the keyed locks):
//! - hit: decrypt, schedule a TTL extension when the entry is close to expiry
//! - miss: per-username lock, re-check (slot, then store), generate, upsert (with
//!   retries), encrypt, store, leave the credential in the slot for queued callers
//!
//! Store failures never fail a request; they only make it a miss. A store
//! write happens only after the backend accepted the secret.
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::AppError;
use crate::services::backend::{AccountMetadata, BackendAccount, BackendError, UserManager};
use crate::services::cache::CredentialStore;
use crate::services::credentials::Credential;
use crate::services::credentials::locks::KeyedLocks;
use crate::services::credentials::secret::generate_secret;
use crate::services::crypto::SecretCipher;
use crate::services::identity::Principal;
use crate::services::roles::RoleMapper;

pub struct CredentialManager {
    store: Arc<dyn CredentialStore>,
    backend: Arc<dyn UserManager>,
    cipher: SecretCipher,
    roles: RoleMapper,
    locks: KeyedLocks<Credential>,
    key_prefix: String,
    refresh_threshold: f64,
    retry: RetryConfig,
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("store", &self.store.backend_name())
            .field("key_prefix", &self.key_prefix)
            .field("refresh_threshold", &self.refresh_threshold)
            .finish_non_exhaustive()
    }
}

impl CredentialManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        backend: Arc<dyn UserManager>,
        cipher: SecretCipher,
        roles: RoleMapper,
        key_prefix: impl Into<String>,
        refresh_threshold: f64,
        retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            backend,
            cipher,
            roles,
            locks: KeyedLocks::new(),
            key_prefix: key_prefix.into(),
            refresh_threshold,
            retry,
        }
    }

    pub fn cache_key(&self, username: &str) -> String {
        format!("{}:{}", self.key_prefix, username)
    }

    /// Usernames with a generate-and-upsert sequence in flight (or queued).
    pub fn in_flight(&self) -> usize {
        self.locks.len()
    }

    pub async fn resolve(&self, principal: &Principal) -> Result<Credential, AppError> {
        let username = principal.username.as_str();
        let key = self.cache_key(username);

        if let Some(secret) = self.cached_secret(&key).await {
            metrics::counter!("elastauth_cache_hits_total").increment(1);
            return Ok(Credential::new(username, secret));
        }
        metrics::counter!("elastauth_cache_misses_total").increment(1);

        let mut slot = self.locks.acquire(&key).await;

        // Whoever held the lock before us may have provisioned already. The slot
        // covers the case where that holder could not write the store.
        if let Some(credential) = slot.as_ref() {
            tracing::debug!(username, "credential handed over by concurrent request");
            return Ok(credential.clone());
        }
        if let Some(secret) = self.cached_secret(&key).await {
            tracing::debug!(username, "credential provisioned by concurrent request");
            return Ok(Credential::new(username, secret));
        }

        let secret = generate_secret();
        let account = BackendAccount {
            enabled: true,
            email: principal.email.clone(),
            password: secret.clone(),
            metadata: AccountMetadata {
                groups: principal.groups.clone(),
            },
            full_name: principal.full_name.clone(),
            roles: self.roles.resolve(&principal.groups),
        };

        self.upsert_with_retry(username, &account).await?;

        // The backend already holds the new secret, so a failed write only costs
        // a re-provision on the next request.
        match self.cipher.encrypt(&secret) {
            Ok(stored) => {
                if let Err(e) = self.store.set(&key, &stored).await {
                    tracing::warn!(username, error = %e, "failed to cache credential");
                }
            }
            Err(e) => tracing::error!(username, error = %e, "failed to encrypt credential"),
        }

        tracing::info!(username, roles = ?account.roles, "provisioned backend credential");
        let credential = Credential::new(username, secret);
        *slot = Some(credential.clone());
        Ok(credential)
    }

    async fn cached_secret(&self, key: &str) -> Option<String> {
        let stored = match self.store.get(key).await {
            Ok(Some(v)) => v,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(
                    backend = self.store.backend_name(),
                    error = %e,
                    "credential store read failed, treating as miss"
                );
                return None;
            }
        };

        match self.cipher.decrypt(&stored) {
            Ok(secret) => {
                self.schedule_refresh(key, stored);
                Some(secret)
            }
            Err(e) => {
                tracing::warn!(error = %e, "cached credential unreadable, regenerating");
                None
            }
        }
    }

    /// Extends the entry's TTL in the background once it drops under the threshold.
    fn schedule_refresh(&self, key: &str, stored: String) {
        let store = self.store.clone();
        let key = key.to_string();
        let threshold = store.ttl().mul_f64(self.refresh_threshold);

        tokio::spawn(async move {
            match store.get_ttl(&key).await {
                Ok(Some(remaining)) if remaining < threshold => {
                    if let Err(e) = store.extend_ttl(&key, &stored).await {
                        tracing::warn!(error = %e, "failed to extend credential ttl");
                    } else {
                        tracing::debug!(key = %key, "extended credential ttl");
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "failed to read credential ttl"),
            }
        });
    }

    async fn upsert_with_retry(
        &self,
        username: &str,
        account: &BackendAccount,
    ) -> Result<(), AppError> {
        let attempts = self.retry.attempts.max(1);
        let mut backoff = self.retry.backoff;

        for attempt in 1..=attempts {
            match self.backend.upsert(username, account).await {
                Ok(()) => {
                    metrics::counter!("elastauth_backend_upserts_total", "outcome" => "ok")
                        .increment(1);
                    return Ok(());
                }
                Err(e) => {
                    let last = attempt == attempts || !e.is_retryable();
                    tracing::warn!(username, attempt, error = %e, "backend upsert failed");
                    if last {
                        metrics::counter!("elastauth_backend_upserts_total", "outcome" => "error")
                            .increment(1);
                        return Err(terminal_error(e));
                    }
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2).min(Duration::from_secs(5));
                }
            }
        }
        Err(AppError::CredentialUnavailable)
    }
}

fn terminal_error(e: BackendError) -> AppError {
    tracing::error!(error = %e, "giving up on backend upsert");
    AppError::CredentialUnavailable
}
