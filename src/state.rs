/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - 暗号鍵・キャッシュ・backend client はここ経由で渡す (グローバルは持たない)
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 */
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::config::{Config, Mode};
use crate::error::AppError;
use crate::services::backend::UserManager;
use crate::services::cache::CredentialStore;
use crate::services::credentials::CredentialManager;
use crate::services::crypto::SecretCipher;
use crate::services::forward::Forwarder;
use crate::services::identity::PrincipalExtractor;
use crate::services::roles::RoleMapper;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub extractor: Arc<PrincipalExtractor>,
    pub credentials: Arc<CredentialManager>,
    pub store: Arc<dyn CredentialStore>,
    pub forwarder: Option<Arc<Forwarder>>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Wires the services around an already-built store and backend client.
    pub fn assemble(
        config: Config,
        store: Arc<dyn CredentialStore>,
        backend: Arc<dyn UserManager>,
        cipher: SecretCipher,
    ) -> Result<Self, AppError> {
        let extractor =
            PrincipalExtractor::from_config(&config.auth, config.group_whitelist.clone())?;

        let credentials = CredentialManager::new(
            store.clone(),
            backend,
            cipher,
            RoleMapper::new(&config.roles),
            config.cache.key_prefix.clone(),
            config.cache.refresh_threshold,
            config.retry.clone(),
        );

        let forwarder = match config.mode() {
            Mode::Proxy => Some(Arc::new(Forwarder::new(
                &config.proxy,
                config.proxy_target().clone(),
            )?)),
            Mode::AuthOnly => None,
        };

        Ok(Self {
            config: Arc::new(config),
            extractor: Arc::new(extractor),
            credentials: Arc::new(credentials),
            store,
            forwarder,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn mode(&self) -> Mode {
        self.config.mode()
    }
}
