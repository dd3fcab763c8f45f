/*
 * Responsibility
 * - Config 読み込み → tracing/panic hook → 依存生成 (AppState) → Router 組み立て
 * - Middleware の適用 (request-id / trace / limit / timeout)
 * - axum::serve() で起動、SIGTERM / Ctrl-C で graceful shutdown
 */
use std::{panic, process, sync::Arc, time::Duration};

use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::{Config, ConfigError, LogFormat};
use crate::error::AppError;
use crate::middleware::http::{self, HttpLimits};
use crate::services::backend::{ElasticsearchUserManager, UserManager};
use crate::services::cache;
use crate::services::crypto::{self, SecretCipher};
use crate::state::AppState;

fn init_tracing(config: &Config) {
    // Prefer RUST_LOG if set; otherwise ELASTAUTH_LOG_LEVEL.
    // Ex:
    // RUST_LOG=info,elastauth=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("{},tower_http=info", config.log_level))
    });

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn init_panic_hook(abort_on_panic: bool) {
    // Keep the default hook as a fallback (prints to stderr with location/payload).
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // Always surface panics via tracing so they don't get "lost".
        tracing::error!(?info, "panic");

        // Development: crash the whole process so we notice immediately.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config);
    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting elastauth in {:?}/{} mode on {} (provider: {}, cache: {})",
        config.app_env,
        config.mode().as_str(),
        config.addr,
        config.auth.name(),
        config.cache.kind.as_str(),
    );

    let addr = config.addr;
    let state = build_state(config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("elastauth stopped");
    Ok(())
}

/// Builds every process-level service once and injects them into [`AppState`].
pub async fn build_state(config: Config) -> Result<AppState, AppError> {
    let cipher = match config.secret_key.as_deref() {
        Some(key) => SecretCipher::from_hex(key).map_err(|e| {
            tracing::error!(error = %e, "ELASTAUTH_SECRET_KEY rejected");
            ConfigError::Invalid("SECRET_KEY")
        })?,
        None => {
            tracing::warn!(
                "ELASTAUTH_SECRET_KEY not set, generated an ephemeral key; cached credentials \
                 will not survive a restart or be readable by other instances"
            );
            SecretCipher::from_hex(&crypto::generate_key_hex()).map_err(|_| AppError::Internal)?
        }
    };

    let store = cache::build_store(&config.cache).await.map_err(|e| {
        tracing::error!(backend = config.cache.kind.as_str(), error = %e, "credential store unavailable");
        AppError::Internal
    })?;

    if config.elasticsearch.dry_run {
        tracing::warn!("ELASTICSEARCH_DRY_RUN enabled: backend users are not provisioned");
    }
    let backend: Arc<dyn UserManager> = Arc::new(
        ElasticsearchUserManager::new(&config.elasticsearch).map_err(|e| {
            tracing::error!(error = %e, "failed to build backend client");
            AppError::Internal
        })?,
    );

    let metrics_enabled = config.metrics_enabled;
    let mut state = AppState::assemble(config, store, backend, cipher)?;

    if metrics_enabled {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        // Only one recorder per process; a later state still serves the route.
        if let Err(e) = metrics::set_global_recorder(recorder) {
            tracing::warn!(error = %e, "metrics recorder already installed");
        }
        let upkeep = handle.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(5));
            loop {
                tick.tick().await;
                upkeep.run_upkeep();
            }
        });
        state = state.with_metrics(handle);
    }

    Ok(state)
}

pub fn build_router(state: AppState) -> Router {
    let limits = HttpLimits::from_config(&state.config);
    let router = api::routes(&state).with_state(state);

    http::apply(router, limits)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
