//! Per-key async mutexes that disappear once nobody holds or waits on them.
//!
//! Each key carries a slot that lives exactly as long as the entry: a holder can
//! leave a value for the callers queued behind it.
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slot<T> = Arc<Mutex<Option<T>>>;
type LockMap<T> = DashMap<String, Slot<T>>;

pub struct KeyedLocks<T = ()> {
    locks: Arc<LockMap<T>>,
}

impl<T> Clone for KeyedLocks<T> {
    fn clone(&self) -> Self {
        Self {
            locks: self.locks.clone(),
        }
    }
}

impl<T> Default for KeyedLocks<T> {
    fn default() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }
}

impl<T> std::fmt::Debug for KeyedLocks<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedLocks").field("keys", &self.locks.len()).finish()
    }
}

/// Keeps the per-key entry alive while held or awaited.
struct KeyRef<T> {
    key: String,
    locks: Arc<LockMap<T>>,
    slot: Slot<T>,
}

impl<T> Drop for KeyRef<T> {
    fn drop(&mut self) {
        // Map + this handle are the only references left: nobody else holds or waits.
        self.locks.remove_if(&self.key, |_, m| {
            Arc::ptr_eq(m, &self.slot) && Arc::strong_count(m) == 2
        });
    }
}

/// Exclusive access to one key and its slot. Field order matters: the mutex
/// is released before the entry is considered for eviction.
pub struct KeyedGuard<T = ()> {
    guard: OwnedMutexGuard<Option<T>>,
    _key: KeyRef<T>,
}

impl<T> Deref for KeyedGuard<T> {
    type Target = Option<T>;

    fn deref(&self) -> &Option<T> {
        &self.guard
    }
}

impl<T> DerefMut for KeyedGuard<T> {
    fn deref_mut(&mut self) -> &mut Option<T> {
        &mut self.guard
    }
}

impl<T> KeyedLocks<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &str) -> KeyedGuard<T> {
        let slot = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();
        let key_ref = KeyRef {
            key: key.to_string(),
            locks: self.locks.clone(),
            slot,
        };
        let guard = key_ref.slot.clone().lock_owned().await;

        KeyedGuard {
            guard,
            _key: key_ref,
        }
    }

    /// Number of keys currently locked or awaited.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn entries_are_evicted_after_release() {
        let locks: KeyedLocks = KeyedLocks::new();
        {
            let _g = locks.acquire("alice").await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks: KeyedLocks = KeyedLocks::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            tasks.push(tokio::spawn(async move {
                let _g = locks.acquire("alice").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks: KeyedLocks = KeyedLocks::new();
        let _a = locks.acquire("alice").await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire("bob")).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn cancelled_waiter_does_not_leak() {
        let locks: KeyedLocks = KeyedLocks::new();
        let held = locks.acquire("alice").await;
        let waited = tokio::time::timeout(Duration::from_millis(20), locks.acquire("alice")).await;
        assert!(waited.is_err());
        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn waiters_see_the_holders_value() {
        let locks: KeyedLocks<u32> = KeyedLocks::new();
        let mut held = locks.acquire("alice").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { *locks.acquire("alice").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        *held = Some(7);
        drop(held);

        assert_eq!(waiter.await.unwrap(), Some(7));
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn slot_does_not_outlive_the_entry() {
        let locks: KeyedLocks<u32> = KeyedLocks::new();
        *locks.acquire("alice").await = Some(1);
        assert_eq!(*locks.acquire("alice").await, None);
    }
}
