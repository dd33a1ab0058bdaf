//! File-based similarity index: persistent JSON-lines storage.
//!
//! Each line is a JSON-encoded `MemoryEntry`, embedding included.
//! Storage location: `<data_dir>/memories.jsonl`
//!
//! Entries are loaded into memory on open. `add` appends one line; `delete`
//! and `clear` rewrite the file. The in-memory set changes only after the
//! file write succeeds.

use async_trait::async_trait;
use lily_core::error::MemoryError;
use lily_core::memory::{MemoryEntry, ScoredEntry, SimilarityIndex};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::jsonl;
use crate::vector::EntrySet;

pub struct FileIndex {
    path: PathBuf,
    entries: Arc<RwLock<EntrySet>>,
}

impl FileIndex {
    /// Open the index at `path`. A missing file starts empty and is created
    /// on first write.
    pub fn open(path: PathBuf) -> Self {
        let entries = EntrySet::from_entries(jsonl::load(&path));
        debug!(path = %path.display(), count = entries.len(), "File memory index loaded");
        Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// `<data_dir>/memories.jsonl`
    pub fn default_path(data_dir: &Path) -> PathBuf {
        data_dir.join("memories.jsonl")
    }

    async fn rewrite(&self, entries: &[MemoryEntry]) -> Result<(), MemoryError> {
        let content = jsonl::encode(entries)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize memory entry: {e}")))?;
        jsonl::write(&self.path, content)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to write memory file: {e}")))
    }
}

#[async_trait]
impl SimilarityIndex for FileIndex {
    fn name(&self) -> &str {
        "file"
    }

    async fn add(&self, entry: MemoryEntry) -> Result<(), MemoryError> {
        let mut entries = self.entries.write().await;
        entries.check(&entry)?;
        jsonl::append(&self.path, &entry)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to write memory file: {e}")))?;
        entries.push(entry)
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredEntry>, MemoryError> {
        self.entries.read().await.search(query, limit, threshold)
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let mut entries = self.entries.write().await;
        let remaining: Vec<MemoryEntry> = entries
            .entries()
            .iter()
            .filter(|e| e.id != id)
            .cloned()
            .collect();
        if remaining.len() == entries.len() {
            return Ok(false);
        }
        self.rewrite(&remaining).await?;
        Ok(entries.remove(id))
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        let mut entries = self.entries.write().await;
        self.rewrite(&[]).await?;
        entries.clear();
        Ok(())
    }

    async fn list(&self) -> Result<Vec<MemoryEntry>, MemoryError> {
        Ok(self.entries.read().await.entries().to_vec())
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.entries.read().await.len())
    }
}
