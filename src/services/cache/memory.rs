//! In-process credential store. Single instance only.
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::services::cache::client::{CacheResult, CredentialStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
    ttl: Duration,
}

impl MemoryStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Periodically purges expired entries. The task exits once the store is dropped.
    pub fn spawn_sweeper(&self, every: Duration) {
        let entries: Weak<DashMap<String, Entry>> = Arc::downgrade(&self.entries);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.tick().await;
            loop {
                tick.tick().await;
                let Some(entries) = entries.upgrade() else {
                    break;
                };
                let now = Instant::now();
                entries.retain(|_, e| !e.is_expired(now));
            }
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn live_entry(&self, key: &str) -> Option<Entry> {
        let now = Instant::now();
        let entry = self.entries.get(key).map(|e| e.clone())?;
        if entry.is_expired(now) {
            self.entries.remove_if(key, |_, e| e.is_expired(now));
            return None;
        }
        Some(entry)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.live_entry(key).map(|e| e.value))
    }

    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(())
    }

    async fn get_ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        Ok(self
            .live_entry(key)
            .map(|e| e.expires_at.saturating_duration_since(Instant::now())))
    }

    async fn extend_ttl(&self, key: &str, value: &str) -> CacheResult<()> {
        let now = Instant::now();
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.value == value && entry.expires_at > now {
                entry.expires_at = now + self.ttl;
            }
        }
        Ok(())
    }

    async fn health_check(&self) -> CacheResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get() {
        let store = MemoryStore::new(Duration::from_secs(60));
        store.set("elastauth:alice", "cipher").await.unwrap();
        assert_eq!(
            store.get("elastauth:alice").await.unwrap().as_deref(),
            Some("cipher")
        );
        let ttl = store.get_ttl("elastauth:alice").await.unwrap().unwrap();
        assert!(ttl <= Duration::from_secs(60) && ttl > Duration::from_secs(58));
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let store = MemoryStore::new(Duration::from_millis(30));
        store.set("k", "v").await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.get_ttl("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn extend_ttl_keeps_value_and_is_idempotent() {
        let store = MemoryStore::new(Duration::from_millis(200));
        store.set("k", "original").await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        store.extend_ttl("k", "original").await.unwrap();
        store.extend_ttl("k", "original").await.unwrap();

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("original"));
        let ttl = store.get_ttl("k").await.unwrap().unwrap();
        assert!(ttl > Duration::from_millis(150));
    }

    #[tokio::test]
    async fn extend_ttl_never_recreates_missing_entry() {
        let store = MemoryStore::new(Duration::from_secs(5));
        store.extend_ttl("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn extend_ttl_leaves_replaced_entry_alone() {
        let store = MemoryStore::new(Duration::from_millis(200));
        store.set("k", "stale").await.unwrap();
        store.set("k", "rotated").await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        store.extend_ttl("k", "stale").await.unwrap();

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("rotated"));
        assert!(store.get_ttl("k").await.unwrap().unwrap() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn sweeper_purges_expired() {
        let store = MemoryStore::new(Duration::from_millis(10));
        store.spawn_sweeper(Duration::from_millis(20));
        store.set("a", "1").await.unwrap();
        store.set("b", "2").await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.len(), 0);
    }
}
