//! Usage records: one per user message and one per assistant completion.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageKind {
    Message,
    Completion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEntry {
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "type")]
    pub kind: UsageKind,

    pub character_count: usize,
}

impl UsageEntry {
    pub fn now(kind: UsageKind, character_count: usize) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            character_count,
        }
    }
}

/// Append-only usage storage.
#[async_trait]
pub trait UsageLog: Send + Sync {
    async fn append(&self, entry: UsageEntry) -> Result<(), StoreError>;

    /// Entries with `start <= timestamp <= end`, in append order.
    async fn query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageEntry>, StoreError>;

    async fn all(&self) -> Result<Vec<UsageEntry>, StoreError>;

    /// Administrative wipe.
    async fn clear(&self) -> Result<(), StoreError>;
}
