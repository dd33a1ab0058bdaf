//! In-memory similarity index: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use lily_core::error::MemoryError;
use lily_core::memory::{MemoryEntry, ScoredEntry, SimilarityIndex};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::vector::EntrySet;

/// An index that keeps memories in a Vec and forgets them on drop.
pub struct InMemoryIndex {
    entries: Arc<RwLock<EntrySet>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(EntrySet::default())),
        }
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SimilarityIndex for InMemoryIndex {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn add(&self, entry: MemoryEntry) -> Result<(), MemoryError> {
        self.entries.write().await.push(entry)
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
        Ok(self.entries.write().await.remove(id))
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        self.entries.write().await.clear();
        Ok(())
    }

    async fn list(&self) -> Result<Vec<MemoryEntry>, MemoryError> {
        Ok(self.entries.read().await.entries().to_vec())
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.entries.read().await.len())
    }
}
