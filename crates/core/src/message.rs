//! Message and chat session domain types.
//!
//! A [`ChatSession`] owns an ordered list of [`Message`]s. Append order is
//! chronological order; nothing reorders messages once they are in a session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

/// Title every new session starts with until one is derived.
pub const DEFAULT_TITLE: &str = "New Chat";

/// Number of characters of the first user message used as a derived title.
const TITLE_CHARS: usize = 30;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user (also carries tool output shown to the user)
    User,
    /// The model
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message in a session.
///
/// Immutable once appended, except `memory_log`, which the memory step
/// appends to while the turn that created the message is in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Attached image references, in attachment order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,

    /// Trace of the memory augmentation step for this message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memory_log: Vec<String>,
}

impl Message {
    /// Create a new user message.
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            content: content.into(),
            images: Vec::new(),
            memory_log: Vec::new(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: content.into(),
            images: Vec::new(),
            memory_log: Vec::new(),
        }
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }
}

/// A persisted conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    /// Unique session ID
    pub id: String,

    /// Display title, [`DEFAULT_TITLE`] until derived
    pub title: String,

    /// Updated on every persisted mutation; listings sort on it
    pub last_used: DateTime<Utc>,

    /// Ordered messages
    pub messages: Vec<Message>,

    /// The model this session talks to
    pub model_id: String,

    /// Optional document directory attached to the session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_dir: Option<String>,
}

impl ChatSession {
    /// Create a new empty session bound to a model.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: DEFAULT_TITLE.to_string(),
            last_used: Utc::now(),
            messages: Vec::new(),
            model_id: model_id.into(),
            rag_dir: None,
        }
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Find a message by ID for in-place `memory_log` updates.
    pub fn message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// Stamp the session before it is written: refresh `last_used` and derive
    /// a title from the first user message while the title is still the
    /// placeholder. A title that was already set is never overwritten.
    pub fn prepare_for_save(&mut self, now: DateTime<Utc>) {
        self.last_used = now;
        if self.title != DEFAULT_TITLE {
            return;
        }
        if let Some(first) = self.messages.iter().find(|m| m.role == Role::User) {
            self.title = derive_title(&first.content);
        }
    }
}

fn derive_title(content: &str) -> String {
    let mut title: String = content.chars().take(TITLE_CHARS).collect();
    if content.chars().count() > TITLE_CHARS {
        title.push_str("...");
    }
    title
}

/// Generates message IDs from the wall clock in milliseconds.
///
/// IDs minted within the same millisecond (or after the clock stepped back)
/// get a `-<n>` suffix so they stay unique within the process.
#[derive(Debug, Default)]
pub struct MessageIdGenerator {
    last: Mutex<(i64, u32)>,
}

impl MessageIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next ID based on the current time.
    pub fn next_id(&self) -> String {
        self.next_at(Utc::now().timestamp_millis())
    }

    /// Next ID for a given millisecond timestamp.
    pub fn next_at(&self, millis: i64) -> String {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if millis > last.0 {
            *last = (millis, 0);
            millis.to_string()
        } else {
            last.1 += 1;
            format!("{}-{}", last.0, last.1)
        }
    }
}
