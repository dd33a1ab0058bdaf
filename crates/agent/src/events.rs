//! Turn events.
//!
//! `TurnEvent`s let a front end follow a turn live: each message appended to
//! the session, memory-step progress, streamed text and tool activity.

use lily_core::message::Message;
use lily_core::tool::{ToolCall, ToolResult};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 1024;

/// Events emitted while a turn runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// A message was appended to the session.
    MessageAppended { message: Message },

    /// A memory-step line was added to a message's `memory_log`.
    MemoryLog { message_id: String, line: String },

    /// Streamed assistant text so far (accumulated, not the fragment).
    Delta { text: String },

    /// A tool is about to run.
    ToolCall { call: ToolCall },

    /// A tool finished.
    ToolResult { name: String, result: ToolResult },

    /// Writing the session failed; the turn continues.
    PersistFailed { reason: String },

    /// The turn aborted on a transport failure.
    Error { message: String },

    /// The turn completed. `message` is the final assistant message, if any
    /// text was produced.
    Finalized { message: Option<Message> },

    /// The turn was cancelled ("generation stopped").
    Stopped,
}

impl TurnEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MessageAppended { .. } => "message_appended",
            Self::MemoryLog { .. } => "memory_log",
            Self::Delta { .. } => "delta",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::PersistFailed { .. } => "persist_failed",
            Self::Error { .. } => "error",
            Self::Finalized { .. } => "finalized",
            Self::Stopped => "stopped",
        }
    }

    /// Whether this event ends a turn.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized { .. } | Self::Error { .. } | Self::Stopped)
    }
}

/// Broadcast bus for one session's turn events.
///
/// Slow subscribers may lag; `Delta` carries the accumulated text so a
/// skipped delta loses nothing.
#[derive(Clone)]
pub struct TurnEvents {
    sender: broadcast::Sender<Arc<TurnEvent>>,
}

impl TurnEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: TurnEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<TurnEvent>> {
        self.sender.subscribe()
    }
}

impl Default for TurnEvents {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
