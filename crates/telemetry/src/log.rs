//! Usage log implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lily_core::error::StoreError;
use lily_core::usage::{UsageEntry, UsageLog};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

fn in_range(entries: &[UsageEntry], start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<UsageEntry> {
    entries
        .iter()
        .filter(|u| u.timestamp >= start && u.timestamp <= end)
        .cloned()
        .collect()
}

/// Usage kept for the life of the process.
#[derive(Default)]
pub struct InMemoryUsageLog {
    entries: RwLock<Vec<UsageEntry>>,
}

impl InMemoryUsageLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageLog for InMemoryUsageLog {
    async fn append(&self, entry: UsageEntry) -> Result<(), StoreError> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageEntry>, StoreError> {
        Ok(in_range(&self.entries.read().await, start, end))
    }

    async fn all(&self) -> Result<Vec<UsageEntry>, StoreError> {
        Ok(self.entries.read().await.clone())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.entries.write().await.clear();
        Ok(())
    }
}

/// Append-only JSONL usage log at `<data_dir>/usage.jsonl`.
///
/// Appends write a single line; reads scan the whole file.
pub struct FileUsageLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileUsageLog {
    pub fn open(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn default_path(data_dir: &Path) -> PathBuf {
        data_dir.join("usage.jsonl")
    }

    async fn read_all(&self) -> Result<Vec<UsageEntry>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<UsageEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted usage entry");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl UsageLog for FileUsageLog {
    async fn append(&self, entry: UsageEntry) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        debug!(kind = ?entry.kind, chars = entry.character_count, "Usage recorded");
        Ok(())
    }

    async fn query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageEntry>, StoreError> {
        Ok(in_range(&self.read_all().await?, start, end))
    }

    async fn all(&self) -> Result<Vec<UsageEntry>, StoreError> {
        self.read_all().await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
