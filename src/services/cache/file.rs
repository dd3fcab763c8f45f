//! File-backed credential store: survives restarts, single instance only.
//!
//! One JSON document per key, named by the SHA-256 of the key so usernames
//! never reach the filesystem. Writes go through a temp file + rename.
//! Every mutation of an existing file happens under one write lock and
//! re-checks the contents first, so a concurrent `set` is never undone.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::services::cache::client::{CacheError, CacheResult, CredentialStore};

#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    value: String,
    expires_at_ms: i64,
}

impl FileEntry {
    fn is_live(&self) -> bool {
        self.expires_at_ms > Utc::now().timestamp_millis()
    }
}

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    ttl: Duration,
    write_lock: Arc<Mutex<()>>,
}

impl FileStore {
    pub async fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Result<Self, CacheError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| CacheError::BackendConnection(format!("{}: {e}", dir.display())))?;
        Ok(Self {
            dir,
            ttl,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }

    fn expiry_from_now(&self) -> i64 {
        Utc::now().timestamp_millis() + self.ttl.as_millis() as i64
    }

    async fn load(path: &Path) -> CacheResult<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::BackendCommand(e.to_string())),
        }
    }

    async fn read_entry(&self, key: &str) -> CacheResult<Option<FileEntry>> {
        let path = self.path_for(key);
        let Some(raw) = Self::load(&path).await? else {
            return Ok(None);
        };

        match serde_json::from_slice::<FileEntry>(&raw) {
            Ok(entry) if entry.is_live() => Ok(Some(entry)),
            Ok(_) => {
                self.discard(&path, &raw).await;
                Ok(None)
            }
            // A corrupt file is as good as a miss.
            Err(_) => {
                tracing::warn!(path = %path.display(), "discarding unreadable cache file");
                self.discard(&path, &raw).await;
                Ok(None)
            }
        }
    }

    /// Removes `path` unless another writer replaced it since it was read as `seen`.
    async fn discard(&self, path: &Path, seen: &[u8]) {
        let _guard = self.write_lock.lock().await;
        if let Ok(Some(current)) = Self::load(path).await {
            if current == seen {
                let _ = tokio::fs::remove_file(path).await;
            }
        }
    }

    async fn write_entry(&self, key: &str, entry: &FileEntry) -> CacheResult<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension(format!("tmp.{:016x}", rand::random::<u64>()));
        let body =
            serde_json::to_vec(entry).map_err(|e| CacheError::InvalidValue(e.to_string()))?;

        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| CacheError::BackendCommand(e.to_string()))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(CacheError::BackendCommand(e.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.read_entry(key).await?.map(|e| e.value))
    }

    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        let entry = FileEntry {
            value: value.to_string(),
            expires_at_ms: self.expiry_from_now(),
        };
        let _guard = self.write_lock.lock().await;
        self.write_entry(key, &entry).await
    }

    async fn get_ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        Ok(self.read_entry(key).await?.map(|e| {
            let left = e.expires_at_ms - Utc::now().timestamp_millis();
            Duration::from_millis(left.max(0) as u64)
        }))
    }

    async fn extend_ttl(&self, key: &str, value: &str) -> CacheResult<()> {
        let _guard = self.write_lock.lock().await;
        let Some(raw) = Self::load(&self.path_for(key)).await? else {
            return Ok(());
        };
        match serde_json::from_slice::<FileEntry>(&raw) {
            Ok(entry) if entry.is_live() && entry.value == value => {
                let entry = FileEntry {
                    value: entry.value,
                    expires_at_ms: self.expiry_from_now(),
                };
                self.write_entry(key, &entry).await
            }
            _ => Ok(()),
        }
    }

    async fn health_check(&self) -> CacheResult<()> {
        let meta = tokio::fs::metadata(&self.dir)
            .await
            .map_err(|e| CacheError::BackendConnection(e.to_string()))?;
        if !meta.is_dir() {
            return Err(CacheError::BackendConnection(format!(
                "{} is not a directory",
                self.dir.display()
            )));
        }
        Ok(())
    }
}
