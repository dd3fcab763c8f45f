use async_trait::async_trait;
use std::time::Duration;

use crate::services::cache::client::{CacheError, CacheResult, CredentialStore};

const EXTEND_IF_UNCHANGED: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('EXPIRE', KEYS[1], ARGV[2])
end
return 0
";

/// Valkey/Redis-backed credential store.
///
/// The only backend that is safe to share between several gateway instances
/// (all of them must then use the same encryption key).
#[derive(Clone)]
pub struct ValkeyStore {
    manager: redis::aio::ConnectionManager,
    ttl: Duration,
}

impl std::fmt::Debug for ValkeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValkeyStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl ValkeyStore {
    // Create a store from a URL like `redis://localhost:6379/0`
    pub async fn new(url: &str, ttl: Duration) -> Result<Self, CacheError> {
        let client =
            redis::Client::open(url).map_err(|e| CacheError::BackendConnection(e.to_string()))?;

        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| CacheError::BackendConnection(e.to_string()))?;

        Ok(Self { manager, ttl })
    }

    // EX expects integer seconds. We clamp to at least 1 sec.
    fn ttl_seconds(&self) -> u64 {
        self.ttl.as_secs().max(1)
    }
}

#[async_trait]
impl CredentialStore for ValkeyStore {
    fn backend_name(&self) -> &'static str {
        "valkey"
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.manager.clone();

        let resp: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendCommand(e.to_string()))?;

        Ok(resp)
    }

    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        let mut conn = self.manager.clone();

        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(self.ttl_seconds())
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendCommand(e.to_string()))?;

        Ok(())
    }

    async fn get_ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let mut conn = self.manager.clone();

        // PTTL: -2 when the key does not exist, -1 when it has no expiry.
        let ms: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendCommand(e.to_string()))?;

        Ok(match ms {
            -1 => Some(self.ttl),
            ms if ms >= 0 => Some(Duration::from_millis(ms as u64)),
            _ => None,
        })
    }

    async fn extend_ttl(&self, key: &str, value: &str) -> CacheResult<()> {
        let mut conn = self.manager.clone();

        // Only the entry the caller read gets extended; a rotated or vanished
        // key is left untouched.
        let _: i64 = redis::cmd("EVAL")
            .arg(EXTEND_IF_UNCHANGED)
            .arg(1)
            .arg(key)
            .arg(value)
            .arg(self.ttl_seconds())
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendCommand(e.to_string()))?;

        Ok(())
    }

    async fn health_check(&self) -> CacheResult<()> {
        let mut conn = self.manager.clone();

        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendConnection(e.to_string()))?;

        if pong != "PONG" {
            return Err(CacheError::InvalidValue(pong));
        }
        Ok(())
    }
}
