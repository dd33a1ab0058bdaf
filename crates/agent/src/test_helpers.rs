//! Shared test doubles for orchestrator and memory-step tests.

use async_trait::async_trait;
use lily_core::error::{ProviderError, StoreError, ToolError};
use lily_core::message::ChatSession;
use lily_core::provider::{
    Completion, CompletionRequest, Embedder, Generation, ModelRuntime, ProgressiveBuffer,
};
use lily_core::session::SessionStore;
use lily_core::tool::{Tool, ToolCall, ToolResult};
use lily_providers::stream::{ChunkedSource, DeltaSource, StreamingClient};
use lily_tools::ToolGateway;
use serde_json::{Map, Value, json};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// A runtime that returns scripted completions in order and records every
/// request it receives.
pub struct ScriptedRuntime {
    responses: Mutex<VecDeque<Completion>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedRuntime {
    pub fn new(responses: Vec<Completion>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelRuntime for ScriptedRuntime {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.responses.lock().unwrap().pop_front().ok_or_else(|| {
            ProviderError::GenerationFailed("scripted runtime ran out of responses".into())
        })
    }
}

pub fn text_completion(text: &str) -> Completion {
    Completion {
        response_text: text.into(),
        function_calls: Vec::new(),
    }
}

pub fn tool_completion(text: &str, calls: Vec<ToolCall>) -> Completion {
    Completion {
        response_text: text.into(),
        function_calls: calls,
    }
}

/// A runtime whose every request fails at the transport.
pub struct FailingRuntime;

#[async_trait]
impl ModelRuntime for FailingRuntime {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<Completion, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }
}

/// A runtime whose generation never finishes until aborted.
#[derive(Default)]
pub struct HangingRuntime {
    pub aborted: Arc<AtomicBool>,
}

struct HangingGeneration {
    aborted: Arc<AtomicBool>,
}

impl ProgressiveBuffer for HangingGeneration {
    fn text(&self) -> String {
        String::new()
    }

    fn is_generating(&self) -> bool {
        !self.aborted.load(Ordering::SeqCst)
    }

    fn failure(&self) -> Option<ProviderError> {
        None
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }
}

impl Generation for HangingGeneration {
    fn function_calls(&self) -> Vec<ToolCall> {
        Vec::new()
    }
}

#[async_trait]
impl ModelRuntime for HangingRuntime {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<Completion, ProviderError> {
        Err(ProviderError::GenerationFailed("use start()".into()))
    }

    async fn start(&self, _request: CompletionRequest) -> Result<Box<dyn Generation>, ProviderError> {
        Ok(Box::new(HangingGeneration {
            aborted: self.aborted.clone(),
        }))
    }
}

/// A cloud client that serves scripted SSE bodies through a chunked reader.
pub struct ScriptedCloud {
    bodies: Mutex<VecDeque<String>>,
}

impl ScriptedCloud {
    pub fn new(bodies: Vec<String>) -> Self {
        Self {
            bodies: Mutex::new(bodies.into()),
        }
    }
}

#[async_trait]
impl StreamingClient for ScriptedCloud {
    async fn open_stream(
        &self,
        _request: &CompletionRequest,
    ) -> Result<Box<dyn DeltaSource>, ProviderError> {
        let body = self
            .bodies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 500,
                message: "no scripted body".into(),
            })?;
        // Small chunks so lines span reads.
        let chunks: Vec<Result<Vec<u8>, String>> =
            body.as_bytes().chunks(7).map(|c| Ok(c.to_vec())).collect();
        Ok(Box::new(ChunkedSource::new(futures::stream::iter(chunks))))
    }
}

/// An SSE body with one content delta per piece.
pub fn sse_body(pieces: &[&str]) -> String {
    let mut body = String::from(": keep-alive\n\n");
    for piece in pieces {
        let payload = json!({"choices": [{"delta": {"content": piece}}]});
        body.push_str(&format!("data: {payload}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

/// A session store whose writes always fail.
pub struct BrokenSessionStore;

#[async_trait]
impl SessionStore for BrokenSessionStore {
    async fn list(&self) -> Result<Vec<ChatSession>, StoreError> {
        Ok(Vec::new())
    }

    async fn get(&self, _id: &str) -> Result<Option<ChatSession>, StoreError> {
        Ok(None)
    }

    async fn put(&self, _session: &ChatSession) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::other("disk full")))
    }

    async fn delete(&self, _id: &str) -> Result<bool, StoreError> {
        Ok(false)
    }
}

/// Embeds text as counts over a tiny fixed vocabulary.
pub struct KeywordEmbedder;

const VOCABULARY: [&str; 8] = ["my", "cat", "called", "miso", "dog", "weather", "rust", "purr"];

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model(&self) -> &str {
        "keyword"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        Ok(VOCABULARY
            .iter()
            .map(|v| words.iter().filter(|w| w.as_str() == *v).count() as f32)
            .collect())
    }
}

/// An embedder that is never available.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model(&self) -> &str {
        "unavailable"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
        Err(ProviderError::NotConfigured("Model not loaded".into()))
    }
}

/// Echoes its `text` argument.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the text argument"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::ok(
            arguments.get("text").and_then(Value::as_str).unwrap_or_default(),
        ))
    }
}

/// Fails every call.
pub struct AlwaysFailsTool;

#[async_trait]
impl Tool for AlwaysFailsTool {
    fn name(&self) -> &str {
        "always_fails"
    }

    fn description(&self) -> &str {
        "Fails"
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _arguments: &Map<String, Value>) -> Result<ToolResult, ToolError> {
        Err(ToolError::Unavailable("no vibration motor".into()))
    }
}

pub fn test_gateway() -> ToolGateway {
    let mut gateway = ToolGateway::new();
    gateway.register(Box::new(EchoTool));
    gateway.register(Box::new(AlwaysFailsTool));
    gateway
}
