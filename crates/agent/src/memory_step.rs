//! Memory augmentation: retrieve related memories for a user message and
//! memorize both sides of the conversation.
//!
//! Best effort throughout. Failures are reported through the progress log or
//! tracing and the turn goes on unaugmented.

use chrono::Utc;
use lily_config::MemoryConfig;
use lily_core::error::MemoryError;
use lily_core::memory::{MemoryEntry, ScoredEntry, SimilarityIndex};
use lily_core::message::Role;
use lily_core::provider::Embedder;
use std::sync::Arc;
use tracing::{debug, warn};

pub const LOG_EMBEDDING: &str = "Converting to embeddings...";
pub const LOG_SEARCHING: &str = "Searching local vector DB...";
pub const LOG_NO_MATCHES: &str = "No relevant memories found.";

#[derive(Clone)]
pub struct MemoryAugmenter {
    index: Arc<dyn SimilarityIndex>,
    embedder: Arc<dyn Embedder>,
    threshold: f32,
    limit: usize,
}

impl MemoryAugmenter {
    pub fn new(index: Arc<dyn SimilarityIndex>, embedder: Arc<dyn Embedder>) -> Self {
        let defaults = MemoryConfig::default();
        Self {
            index,
            embedder,
            threshold: defaults.similarity_threshold,
            limit: defaults.max_results,
        }
    }

    pub fn from_config(
        index: Arc<dyn SimilarityIndex>,
        embedder: Arc<dyn Embedder>,
        config: &MemoryConfig,
    ) -> Self {
        Self::new(index, embedder)
            .with_threshold(config.similarity_threshold)
            .with_limit(config.max_results)
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Run the user side of the step and return the content to send to the
    /// model. `log` receives each progress line as it happens.
    pub async fn augment_user<F>(
        &self,
        message_id: &str,
        content: &str,
        chat_id: &str,
        log: F,
    ) -> String
    where
        F: Fn(&str),
    {
        log(LOG_EMBEDDING);
        let embedding = match self.embedder.embed(content).await {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!(message_id, error = %e, "User message embedding failed");
                log(&format!("Failed to generate embedding ({e})"));
                return content.to_string();
            }
        };

        log(LOG_SEARCHING);
        let augmented = match self.index.search(&embedding, self.limit, self.threshold).await {
            Ok(matches) if !matches.is_empty() => {
                log(&format!("Found {} relevant memories.", matches.len()));
                format_context(&matches, content)
            }
            Ok(_) => {
                log(LOG_NO_MATCHES);
                content.to_string()
            }
            Err(e) => {
                warn!(message_id, error = %e, "Memory search failed");
                log(&format!("Memory search failed ({e})"));
                content.to_string()
            }
        };

        if let Err(e) = self
            .store(message_id, content, Role::User, embedding, chat_id)
            .await
        {
            log(&format!("Failed to save memory ({e})"));
        }
        augmented
    }

    /// Memorize a finalized assistant message. No retrieval.
    pub async fn memorize_assistant(&self, message_id: &str, content: &str, chat_id: &str) {
        match self.embedder.embed(content).await {
            Ok(embedding) => {
                // Already logged by `store`.
                let _ = self
                    .store(message_id, content, Role::Assistant, embedding, chat_id)
                    .await;
            }
            Err(e) => warn!(message_id, error = %e, "Assistant message embedding failed"),
        }
    }

    async fn store(
        &self,
        message_id: &str,
        content: &str,
        role: Role,
        embedding: Vec<f32>,
        chat_id: &str,
    ) -> Result<(), MemoryError> {
        let entry = MemoryEntry {
            id: message_id.to_string(),
            content: content.to_string(),
            role,
            embedding,
            timestamp: Utc::now(),
            chat_id: chat_id.to_string(),
        };
        match self.index.add(entry).await {
            Ok(()) => {
                debug!(message_id, role = %role, "Memorized message");
                Ok(())
            }
            Err(e) => {
                warn!(message_id, error = %e, "Failed to store memory");
                Err(e)
            }
        }
    }
}

/// Prefix the user query with retrieved memories.
pub fn format_context(matches: &[ScoredEntry], query: &str) -> String {
    let context = matches
        .iter()
        .map(|m| format!("[Memory]: {}", m.entry.content))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Context:\n{context}\n\nUser Query:\n{query}")
}
