//! Whole-run mutual exclusion so two watcher invocations never overlap

use crate::errors::{Result, WatcherError};
use chrono::Local;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

pub const RUN_LOCK_NAME: &str = ".watcher.lock";

/// Held for the duration of a run; the marker file is removed on drop
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Take the run lock in `dir`, or return `None` when another run holds it.
    ///
    /// A marker older than `stale_after` is treated as left behind by a
    /// crashed run and replaced.
    pub async fn acquire(dir: &Path, stale_after: Duration) -> Result<Option<Self>> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(RUN_LOCK_NAME);

        for attempt in 0..2 {
            match Self::create(&path).await {
                Ok(lock) => return Ok(Some(lock)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if attempt > 0 || !Self::is_stale(&path, stale_after).await? {
                        debug!("Run lock {} is held", path.display());
                        return Ok(None);
                    }

                    warn!("Removing abandoned run lock {}", path.display());
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(WatcherError::Io(e)),
                    }
                }
                Err(e) => return Err(WatcherError::Io(e)),
            }
        }

        Ok(None)
    }

    async fn create(path: &Path) -> std::io::Result<Self> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;

        let content = format!(
            "watcher - {} (pid {})",
            Local::now().format("%H:%M, %d/%m/%Y"),
            std::process::id()
        );
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    async fn is_stale(path: &Path, stale_after: Duration) -> Result<bool> {
        let modified = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata.modified()?,
            // Vanished between create and stat: free to retry
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(WatcherError::Io(e)),
        };

        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        Ok(age >= stale_after)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!("Failed to remove run lock {}: {}", self.path.display(), e);
            }
        }
    }
}
