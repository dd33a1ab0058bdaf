//! Chat session stores.
//!
//! Both stores upsert by session ID and list most recently used first. The
//! file store changes its in-memory copy only after the file write succeeds.

use async_trait::async_trait;
use lily_core::error::StoreError;
use lily_core::message::ChatSession;
use lily_core::session::SessionStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::jsonl;

fn upsert(sessions: &mut Vec<ChatSession>, session: &ChatSession) {
    match sessions.iter_mut().find(|s| s.id == session.id) {
        Some(existing) => *existing = session.clone(),
        None => sessions.push(session.clone()),
    }
}

fn by_recency(sessions: &[ChatSession]) -> Vec<ChatSession> {
    let mut sorted = sessions.to_vec();
    sorted.sort_by(|a, b| b.last_used.cmp(&a.last_used));
    sorted
}

/// Sessions kept for the life of the process.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<Vec<ChatSession>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn list(&self) -> Result<Vec<ChatSession>, StoreError> {
        Ok(by_recency(&self.sessions.read().await))
    }

    async fn get(&self, id: &str) -> Result<Option<ChatSession>, StoreError> {
        Ok(self.sessions.read().await.iter().find(|s| s.id == id).cloned())
    }

    async fn put(&self, session: &ChatSession) -> Result<(), StoreError> {
        upsert(&mut *self.sessions.write().await, session);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|s| s.id != id);
        Ok(sessions.len() != before)
    }
}

/// Sessions persisted as JSON lines at `<data_dir>/sessions.jsonl`.
pub struct FileSessionStore {
    path: PathBuf,
    sessions: Arc<RwLock<Vec<ChatSession>>>,
}

impl FileSessionStore {
    pub fn open(path: PathBuf) -> Self {
        let sessions: Vec<ChatSession> = jsonl::load(&path);
        debug!(path = %path.display(), count = sessions.len(), "Session store loaded");
        Self {
            path,
            sessions: Arc::new(RwLock::new(sessions)),
        }
    }

    pub fn default_path(data_dir: &Path) -> PathBuf {
        data_dir.join("sessions.jsonl")
    }

    async fn flush(&self, sessions: &[ChatSession]) -> Result<(), StoreError> {
        let content = jsonl::encode(sessions)?;
        jsonl::write(&self.path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn list(&self) -> Result<Vec<ChatSession>, StoreError> {
        Ok(by_recency(&self.sessions.read().await))
    }

    async fn get(&self, id: &str) -> Result<Option<ChatSession>, StoreError> {
        Ok(self.sessions.read().await.iter().find(|s| s.id == id).cloned())
    }

    async fn put(&self, session: &ChatSession) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let mut updated = sessions.clone();
        upsert(&mut updated, session);
        self.flush(&updated).await?;
        *sessions = updated;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.write().await;
        let remaining: Vec<ChatSession> =
            sessions.iter().filter(|s| s.id != id).cloned().collect();
        if remaining.len() == sessions.len() {
            return Ok(false);
        }
        self.flush(&remaining).await?;
        *sessions = remaining;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use lily_core::message::Message;

    fn session_at(offset_secs: i64) -> ChatSession {
        let mut session = ChatSession::new("m");
        session.last_used = Utc::now() + Duration::seconds(offset_secs);
        session
    }

    #[tokio::test]
    async fn list_orders_by_last_used() {
        let store = InMemorySessionStore::new();
        let old = session_at(-60);
        let new = session_at(0);
        store.put(&old).await.unwrap();
        store.put(&new).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed[0].id, new.id);
        assert_eq!(listed[1].id, old.id);
    }

    #[tokio::test]
    async fn put_replaces_existing() {
        let store = InMemorySessionStore::new();
        let mut session = session_at(0);
        store.put(&session).await.unwrap();
        session.push(Message::user("1", "hello"));
        store.put(&session).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].messages.len(), 1);
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let store = InMemorySessionStore::new();
        let session = session_at(0);
        store.put(&session).await.unwrap();
        assert!(store.delete(&session.id).await.unwrap());
        assert!(!store.delete(&session.id).await.unwrap());
        assert!(store.get(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_round_trips_messages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = FileSessionStore::default_path(dir.path());

        let mut session = session_at(0);
        session.push(Message::user("1", "first"));
        session.push(Message::assistant("2", "second"));
        session.push(Message::user("3", "third"));

        FileSessionStore::open(path.clone()).put(&session).await.unwrap();

        let loaded = FileSessionStore::open(path)
            .get(&session.id)
            .await
            .unwrap()
            .unwrap();
        let contents: Vec<_> = loaded.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn file_store_write_failure_is_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the write fail.
        let path = dir.path().join("sessions.jsonl");
        std::fs::create_dir(&path).unwrap();

        let store = FileSessionStore::open(path);
        let session = session_at(0);
        assert!(store.put(&session).await.is_err());
        assert!(store.get(&session.id).await.unwrap().is_none());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_update_and_delete_keep_saved_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = FileSessionStore::default_path(dir.path());
        let store = FileSessionStore::open(path.clone());
        let mut session = session_at(0);
        store.put(&session).await.unwrap();

        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        session.push(Message::user("1", "unsaved"));
        assert!(store.put(&session).await.is_err());
        assert!(store.delete(&session.id).await.is_err());

        let kept = store.get(&session.id).await.unwrap().unwrap();
        assert!(kept.messages.is_empty());
    }
}
