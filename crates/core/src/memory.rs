//! Similarity index trait: long-term memory keyed by embedding vectors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::message::Role;

/// Chat ID recorded for memories created outside a persisted session.
pub const TEMP_CHAT_ID: &str = "temp";

/// One memorized message. Never mutated after it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    /// Same as the ID of the message it was created from
    pub id: String,

    pub content: String,

    pub role: Role,

    pub embedding: Vec<f32>,

    pub timestamp: DateTime<Utc>,

    pub chat_id: String,
}

/// A search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEntry {
    pub entry: MemoryEntry,

    /// Cosine similarity to the query
    pub score: f32,
}

/// Exhaustive-scan similarity search over stored memories.
///
/// Every stored embedding has the same length. `add` and `search` reject
/// vectors of any other length with [`MemoryError::DimensionMismatch`].
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// The backend name (e.g., "in_memory", "file").
    fn name(&self) -> &str;

    async fn add(&self, entry: MemoryEntry) -> Result<(), MemoryError>;

    /// Entries scoring at least `threshold`, best first, at most `limit`.
    /// Ties keep insertion order.
    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredEntry>, MemoryError>;

    /// Remove one entry. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool, MemoryError>;

    /// Remove everything. Idempotent.
    async fn clear(&self) -> Result<(), MemoryError>;

    async fn list(&self) -> Result<Vec<MemoryEntry>, MemoryError>;

    async fn count(&self) -> Result<usize, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_entry_serialization() {
        let entry = MemoryEntry {
            id: "1700000000000".into(),
            content: "The user prefers Rust over C++".into(),
            role: Role::User,
            embedding: vec![0.1, 0.2],
            timestamp: Utc::now(),
            chat_id: TEMP_CHAT_ID.into(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("Rust over C++"));
        assert!(json.contains("\"chatId\":\"temp\""));

        let back: MemoryEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
