//! Vector similarity and ranking.
//!
//! Pure-Rust exhaustive scan: every stored embedding is scored against the
//! query, so search cost is linear in the number of memories.

use lily_core::error::MemoryError;
use lily_core::memory::{MemoryEntry, ScoredEntry};
use tracing::warn;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector has zero norm, is empty, or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank entries by cosine similarity to a query embedding.
///
/// Keeps entries scoring at least `threshold`, sorted by descending score
/// (stable, so ties keep insertion order), truncated to `limit`. An entry
/// whose embedding length differs from the query is an error, never a
/// silent zero.
pub fn rank(
    entries: &[MemoryEntry],
    query: &[f32],
    limit: usize,
    threshold: f32,
) -> Result<Vec<ScoredEntry>, MemoryError> {
    let mut scored = Vec::new();
    for entry in entries {
        if entry.embedding.len() != query.len() {
            return Err(MemoryError::DimensionMismatch {
                expected: entry.embedding.len(),
                actual: query.len(),
            });
        }
        let score = cosine_similarity(&entry.embedding, query);
        if score >= threshold {
            scored.push(ScoredEntry {
                entry: entry.clone(),
                score,
            });
        }
    }

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    Ok(scored)
}

/// Entries plus the embedding length they share.
///
/// The dimension is fixed by the first stored entry and forgotten when the
/// set is cleared.
#[derive(Debug, Default)]
pub(crate) struct EntrySet {
    entries: Vec<MemoryEntry>,
    dimension: Option<usize>,
}

impl EntrySet {
    /// Rebuild from persisted entries, dropping any whose length disagrees
    /// with the first one.
    pub(crate) fn from_entries(loaded: Vec<MemoryEntry>) -> Self {
        let mut set = Self::default();
        for entry in loaded {
            let id = entry.id.clone();
            if let Err(e) = set.push(entry) {
                warn!(id = %id, error = %e, "Skipping memory entry with unexpected dimension");
            }
        }
        set
    }

    /// Whether `entry` could be pushed. Does not modify the set.
    pub(crate) fn check(&self, entry: &MemoryEntry) -> Result<(), MemoryError> {
        let len = entry.embedding.len();
        if len == 0 {
            return Err(MemoryError::EmbeddingFailed("empty embedding".into()));
        }
        match self.dimension {
            Some(expected) if expected != len => Err(MemoryError::DimensionMismatch {
                expected,
                actual: len,
            }),
            _ => Ok(()),
        }
    }

    pub(crate) fn push(&mut self, entry: MemoryEntry) -> Result<(), MemoryError> {
        self.check(&entry)?;
        self.dimension = Some(entry.embedding.len());
        self.entries.push(entry);
        Ok(())
    }

    pub(crate) fn search(
        &self,
        query: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredEntry>, MemoryError> {
        if let Some(expected) = self.dimension
            && expected != query.len()
        {
            return Err(MemoryError::DimensionMismatch {
                expected,
                actual: query.len(),
            });
        }
        rank(&self.entries, query, limit, threshold)
    }

    pub(crate) fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        if self.entries.is_empty() {
            self.dimension = None;
        }
        self.entries.len() != before
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.dimension = None;
    }

    pub(crate) fn entries(&self) -> &[MemoryEntry] {
        &self.entries
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
