//! Model runtime traits: the abstraction over local and remote LLM backends.
//!
//! The orchestrator never inspects a model identifier to decide how to talk
//! to it: a [`ModelDescriptor`] carries the route (local or cloud) and the
//! resolved [`Capabilities`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Role;
use crate::tool::{ToolCall, ToolDefinition};

/// What a model can do, resolved once when the model list is loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub supports_vision: bool,
    pub supports_tools: bool,
}

impl Capabilities {
    /// Capabilities of a hosted model, judged from its catalog ID.
    /// Hosted models are assumed to accept tool definitions.
    pub fn for_cloud_model(id: &str) -> Self {
        let id = id.to_lowercase();
        Self {
            supports_vision: ["vision", "4o", "claude-3"].iter().any(|m| id.contains(m)),
            supports_tools: true,
        }
    }
}

/// Which runtime a session talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ModelDescriptor {
    /// A model executed on this device
    Local { id: String, capabilities: Capabilities },
    /// A model behind the remote streaming endpoint
    Cloud { id: String, capabilities: Capabilities },
}

impl ModelDescriptor {
    /// Describe a hosted model, resolving its capabilities from the ID.
    pub fn cloud(id: impl Into<String>) -> Self {
        let id = id.into();
        let capabilities = Capabilities::for_cloud_model(&id);
        Self::Cloud { id, capabilities }
    }

    pub fn local(id: impl Into<String>, capabilities: Capabilities) -> Self {
        Self::Local {
            id: id.into(),
            capabilities,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Local { id, .. } | Self::Cloud { id, .. } => id,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            Self::Local { capabilities, .. } | Self::Cloud { capabilities, .. } => *capabilities,
        }
    }
}

/// One entry of the context sent to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,

    /// Local image paths (URI scheme already stripped)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl ContextMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images: Vec::new(),
        }
    }
}

/// A request to produce the next assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use
    pub model: String,

    /// The working context, oldest first
    pub messages: Vec<ContextMessage>,

    /// Tools the model may call; empty when tool use is off
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Document directory attached to the session. Local runtimes search it;
    /// the cloud request body leaves it out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_dir: Option<String>,
}

/// A finished model response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub response_text: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub function_calls: Vec<ToolCall>,
}

/// A response that grows while the model is generating.
///
/// Readers must call [`is_generating`](Self::is_generating) *before*
/// [`text`](Self::text): once a reader has seen `false`, the text it reads
/// afterwards is complete.
pub trait ProgressiveBuffer: Send + Sync {
    /// Everything produced so far.
    fn text(&self) -> String;

    fn is_generating(&self) -> bool;

    /// Set when generation stopped because of an error.
    fn failure(&self) -> Option<ProviderError>;

    /// Stop generating and release resources. Idempotent.
    fn abort(&self);
}

/// An in-flight local generation.
pub trait Generation: ProgressiveBuffer {
    /// Function calls the model requested; complete once generation ended.
    fn function_calls(&self) -> Vec<ToolCall>;
}

/// A generation that is already complete.
pub struct FinishedGeneration {
    completion: Completion,
}

impl FinishedGeneration {
    pub fn new(completion: Completion) -> Self {
        Self { completion }
    }
}

impl ProgressiveBuffer for FinishedGeneration {
    fn text(&self) -> String {
        self.completion.response_text.clone()
    }

    fn is_generating(&self) -> bool {
        false
    }

    fn failure(&self) -> Option<ProviderError> {
        None
    }

    fn abort(&self) {}
}

impl Generation for FinishedGeneration {
    fn function_calls(&self) -> Vec<ToolCall> {
        self.completion.function_calls.clone()
    }
}

/// The local model runtime.
///
/// Implementations that can report progress override [`start`](Self::start);
/// the default awaits [`complete`](Self::complete) and hands back a finished
/// generation.
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    /// A human-readable name for this runtime.
    fn name(&self) -> &str;

    /// Run a completion to the end.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError>;

    /// Begin a completion whose text can be polled while it grows.
    async fn start(&self, request: CompletionRequest) -> Result<Box<dyn Generation>, ProviderError> {
        let completion = self.complete(request).await?;
        Ok(Box::new(FinishedGeneration::new(completion)))
    }
}

/// Turns text into an embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// The embedding model in use; its output length is fixed.
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}
