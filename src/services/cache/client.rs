//! Credential store interface shared by every cache backend.
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-layer errors (transport/command/serialization).
///
/// Kept independent from `AppError`: the credential manager decides how a
/// failing store degrades (treat as a miss, never fail the request on it).
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    BackendConnection(String),
    #[error("cache command error: {0}")]
    BackendCommand(String),
    #[error("cache value error: {0}")]
    InvalidValue(String),
}

/// Keyed, TTL-bound string storage for encrypted credentials.
///
/// Contract:
/// - `set` always overwrites and resets the TTL to the nominal value.
/// - `extend_ttl` resets the TTL only while the stored value still equals
///   `value`. It never writes a value, so a vanished or rotated entry stays
///   as it is. Idempotent.
/// - Expired entries read as absent.
///
/// Exactly one implementation is active per process; it is shared as
/// `Arc<dyn CredentialStore>`.
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    // Returns the cache backend name (for logging/metrics).
    fn backend_name(&self) -> &'static str;

    // Nominal TTL applied by `set` and `extend_ttl`.
    fn ttl(&self) -> Duration;

    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> CacheResult<()>;

    // Remaining lifetime of an entry, `None` when absent or expired.
    async fn get_ttl(&self, key: &str) -> CacheResult<Option<Duration>>;

    async fn extend_ttl(&self, key: &str, value: &str) -> CacheResult<()>;

    async fn health_check(&self) -> CacheResult<()>;
}
