//! Session persistence trait.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::ChatSession;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// All sessions, most recently used first.
    async fn list(&self) -> Result<Vec<ChatSession>, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<ChatSession>, StoreError>;

    /// Insert or replace by session ID.
    async fn put(&self, session: &ChatSession) -> Result<(), StoreError>;

    /// Returns whether the session existed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}
