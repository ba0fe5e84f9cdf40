//! Debounce locks recording that a "down" alert was already sent
//!
//! A lock older than the cooldown window counts as absent and is removed the
//! next time it is observed. The file store assumes a single watcher process:
//! nothing protects a marker from concurrent writers beyond the run lock.

use crate::clock::Clock;
use crate::errors::{Result, WatcherError};
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::debug;

/// Key/timestamp store with lazy TTL expiry
#[async_trait]
pub trait LockStore: Send + Sync {
    /// True while a lock younger than the cooldown exists. Stale locks are removed.
    async fn is_locked(&self, endpoint_id: &str) -> Result<bool>;

    /// Create or overwrite the lock with the current time
    async fn acquire(&self, endpoint_id: &str) -> Result<()>;

    /// Remove the lock, reporting whether one existed
    async fn release(&self, endpoint_id: &str) -> Result<bool>;
}

fn age(now: DateTime<Utc>, created_at: DateTime<Utc>) -> Duration {
    (now - created_at).to_std().unwrap_or(Duration::ZERO)
}

/// One marker file per endpoint; the file modification time is the lock timestamp
pub struct FileLockStore {
    dir: PathBuf,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
}

impl FileLockStore {
    /// Open the store, creating its directory when missing
    pub async fn open(dir: impl Into<PathBuf>, cooldown: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            WatcherError::LockStore(format!("cannot create {}: {}", dir.display(), e))
        })?;

        Ok(Self { dir, cooldown, clock })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock_path(&self, endpoint_id: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", endpoint_id))
    }

    fn store_error(&self, action: &str, path: &Path, err: std::io::Error) -> WatcherError {
        WatcherError::LockStore(format!("cannot {} {}: {}", action, path.display(), err))
    }
}

#[async_trait]
impl LockStore for FileLockStore {
    async fn is_locked(&self, endpoint_id: &str) -> Result<bool> {
        let path = self.lock_path(endpoint_id);

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(self.store_error("stat", &path, e)),
        };

        let modified = metadata
            .modified()
            .map_err(|e| self.store_error("read mtime of", &path, e))?;

        if age(self.clock.now(), DateTime::<Utc>::from(modified)) < self.cooldown {
            return Ok(true);
        }

        debug!("Removing stale lock {}", path.display());
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(false),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.store_error("remove", &path, e)),
        }
    }

    async fn acquire(&self, endpoint_id: &str) -> Result<()> {
        let path = self.lock_path(endpoint_id);
        let now = self.clock.now();
        let content = format!(
            "{} - {}",
            endpoint_id,
            now.with_timezone(&Local).format("%H:%M, %d/%m/%Y")
        );

        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| self.store_error("create", &path, e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| self.store_error("write", &path, e))?;
        file.flush()
            .await
            .map_err(|e| self.store_error("write", &path, e))?;

        let file = file.into_std().await;
        file.set_modified(SystemTime::from(now))
            .map_err(|e| self.store_error("stamp", &path, e))?;

        debug!("Acquired lock {}", path.display());
        Ok(())
    }

    async fn release(&self, endpoint_id: &str) -> Result<bool> {
        let path = self.lock_path(endpoint_id);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Released lock {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.store_error("remove", &path, e)),
        }
    }
}

/// In-process lock store, for tests and embedding
pub struct MemoryLockStore {
    locks: RwLock<HashMap<String, DateTime<Utc>>>,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
}

impl MemoryLockStore {
    pub fn new(cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            locks: RwLock::new(HashMap::new()),
            cooldown,
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.locks.read().await.len()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn is_locked(&self, endpoint_id: &str) -> Result<bool> {
        let mut locks = self.locks.write().await;

        match locks.get(endpoint_id) {
            None => Ok(false),
            Some(created_at) if age(self.clock.now(), *created_at) < self.cooldown => Ok(true),
            Some(_) => {
                locks.remove(endpoint_id);
                Ok(false)
            }
        }
    }

    async fn acquire(&self, endpoint_id: &str) -> Result<()> {
        let mut locks = self.locks.write().await;
        locks.insert(endpoint_id.to_string(), self.clock.now());
        Ok(())
    }

    async fn release(&self, endpoint_id: &str) -> Result<bool> {
        let mut locks = self.locks.write().await;
        Ok(locks.remove(endpoint_id).is_some())
    }
}
