//! Site registry: one file per endpoint, one phone number per line

use crate::errors::{Result, WatcherError};
use crate::models::Endpoint;
use crate::phone;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct SiteRegistry {
    dir: PathBuf,
    phone_prefix: String,
}

impl SiteRegistry {
    pub fn new(dir: impl Into<PathBuf>, phone_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            phone_prefix: phone_prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read every endpoint in the registry, sorted by id.
    ///
    /// Hidden files and anything that is not a regular file are skipped, as
    /// are files that cannot be read. Invalid UTF-8 is decoded lossily.
    /// Endpoints whose file holds no valid phone number are still returned,
    /// with an empty subscriber list.
    pub async fn load(&self) -> Result<Vec<Endpoint>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            WatcherError::Registry(format!("cannot read {}: {}", self.dir.display(), e))
        })?;

        let mut endpoints = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!("Skipping registry entry with non UTF-8 name: {:?}", raw);
                    continue;
                }
            };

            if name.starts_with('.') {
                continue;
            }

            let path = entry.path();
            let metadata = match tokio::fs::metadata(&path).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Skipping registry entry {}: {}", path.display(), e);
                    continue;
                }
            };

            if !metadata.is_file() {
                continue;
            }

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Skipping unreadable registry file {}: {}", path.display(), e);
                    continue;
                }
            };

            let content = String::from_utf8_lossy(&bytes);
            let subscribers = self.parse_subscribers(&name, &content);
            debug!("Loaded endpoint {} with {} subscribers", name, subscribers.len());

            endpoints.push(Endpoint::new(name, subscribers));
        }

        endpoints.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(endpoints)
    }

    fn parse_subscribers(&self, endpoint: &str, content: &str) -> Vec<String> {
        let mut subscribers: Vec<String> = Vec::new();

        for line in content.lines().map(str::trim).filter(|line| !line.is_empty()) {
            match phone::normalize(line, &self.phone_prefix) {
                Some(number) if !subscribers.contains(&number) => subscribers.push(number),
                Some(_) => {}
                None => warn!("Ignoring invalid phone number {:?} for {}", line, endpoint),
            }
        }

        subscribers
    }
}
