pub mod client;
pub mod file;
pub mod memory;
pub mod valkey;

use std::sync::Arc;
use std::time::Duration;

pub use client::{CacheError, CacheResult, CredentialStore};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use valkey::ValkeyStore;

use crate::config::{CacheConfig, CacheKind};

/// Builds the single credential store selected by configuration.
pub async fn build_store(config: &CacheConfig) -> Result<Arc<dyn CredentialStore>, CacheError> {
    let store: Arc<dyn CredentialStore> = match config.kind {
        CacheKind::Memory => {
            let store = MemoryStore::new(config.ttl);
            store.spawn_sweeper(sweep_interval(config.ttl));
            Arc::new(store)
        }
        CacheKind::Redis => Arc::new(ValkeyStore::new(&config.redis_url(), config.ttl).await?),
        CacheKind::File => Arc::new(FileStore::new(&config.file_dir, config.ttl).await?),
    };

    tracing::info!(
        backend = store.backend_name(),
        ttl_secs = config.ttl.as_secs(),
        "credential store ready"
    );
    Ok(store)
}

fn sweep_interval(ttl: Duration) -> Duration {
    ttl.clamp(Duration::from_secs(1), Duration::from_secs(600))
}
