//! # Lily Core
//!
//! Domain types, collaborator traits, and error definitions for the Lily
//! conversational client. This crate has **no I/O of its own**: it defines the
//! model that the transport, memory, tool and orchestration crates implement
//! against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (model runtime, embedder, similarity index,
//! session store, usage log, tool) is a trait here. Implementations live in
//! their respective crates, so:
//! - Implementations are swapped via configuration
//! - Tests run against scripted stubs
//! - All crates depend inward on core

pub mod error;
pub mod memory;
pub mod message;
pub mod provider;
pub mod session;
pub mod tool;
pub mod usage;

// Re-export key types at crate root for ergonomics
pub use error::{MemoryError, ProviderError, StoreError, ToolError};
pub use memory::{MemoryEntry, ScoredEntry, SimilarityIndex};
pub use message::{ChatSession, DEFAULT_TITLE, Message, MessageIdGenerator, Role};
pub use provider::{
    Capabilities, Completion, CompletionRequest, ContextMessage, Embedder, FinishedGeneration,
    Generation, ModelDescriptor, ModelRuntime, ProgressiveBuffer,
};
pub use session::SessionStore;
pub use tool::{Tool, ToolCall, ToolDefinition, ToolResult};
pub use usage::{UsageEntry, UsageKind, UsageLog};
