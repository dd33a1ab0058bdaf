//! The turn orchestrator.
//!
//! One call to [`TurnOrchestrator::send`] runs a whole turn:
//!
//! 1. **Append** the user message and record usage
//! 2. **Augment** the query with retrieved memories (when enabled)
//! 3. **Stream** the model response through a [`DeltaSource`]
//! 4. **If tool calls**: run them in order, show each call and its output,
//!    and go back to the model only when a call failed
//! 5. **Finalize**: append the assistant text, record usage, memorize it
//!
//! Every session mutation is persisted as it happens. The turn can be
//! stopped at any model read or tool execution via [`SessionHandle::cancel`].

use lily_config::AppConfig;
use lily_core::error::{ProviderError, StoreError};
use lily_core::memory::TEMP_CHAT_ID;
use lily_core::message::{Message, MessageIdGenerator, Role};
use lily_core::provider::{CompletionRequest, ContextMessage, ModelDescriptor, ModelRuntime};
use lily_core::session::SessionStore;
use lily_core::tool::{ToolCall, ToolDefinition, ToolResult};
use lily_core::usage::UsageKind;
use lily_providers::stream::{DeltaSource, PollingSource, StreamEvent, StreamingClient};
use lily_telemetry::UsageTracker;
use lily_tools::ToolGateway;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::TurnEvent;
use crate::memory_step::MemoryAugmenter;
use crate::state::{SessionHandle, TurnState};

const IMAGE_ONLY_CONTENT: &str = "(Image)";

/// Why a send was refused or a turn aborted.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Nothing to send")]
    EmptyInput,

    #[error("A response is already being generated for this chat")]
    Busy,

    #[error("Model '{model}' does not accept images")]
    VisionUnsupported { model: String },

    #[error("No {route} runtime is configured")]
    NoRuntime { route: &'static str },

    #[error(transparent)]
    Transport(#[from] ProviderError),
}

/// How a turn that was not refused ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Completed {
        /// The final assistant message, when the model produced text.
        message: Option<Message>,
        /// Model round trips made.
        model_rounds: usize,
        persisted: bool,
    },
    /// Cancelled by the user. Messages appended before the stop are kept.
    Stopped { persisted: bool },
}

impl TurnOutcome {
    /// Whether every session write of the turn succeeded.
    pub fn persisted(&self) -> bool {
        match self {
            Self::Completed { persisted, .. } | Self::Stopped { persisted } => *persisted,
        }
    }
}

/// What the user submitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserInput {
    pub text: String,
    /// An image reference, e.g. `file:///path/to/photo.jpg`
    pub image: Option<String>,
}

impl UserInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }
}

/// Drives turns for any number of sessions.
pub struct TurnOrchestrator {
    local: Option<Arc<dyn ModelRuntime>>,
    cloud: Option<Arc<dyn StreamingClient>>,
    tools: Arc<ToolGateway>,
    tools_enabled: bool,
    max_tool_rounds: usize,
    memory: Option<MemoryAugmenter>,
    sessions: Arc<dyn SessionStore>,
    usage: Option<UsageTracker>,
    ids: MessageIdGenerator,
    poll_interval: Duration,
}

impl TurnOrchestrator {
    pub fn new(sessions: Arc<dyn SessionStore>, tools: Arc<ToolGateway>) -> Self {
        Self {
            local: None,
            cloud: None,
            tools,
            tools_enabled: true,
            max_tool_rounds: 5,
            memory: None,
            sessions,
            usage: None,
            ids: MessageIdGenerator::new(),
            poll_interval: Duration::from_millis(50),
        }
    }

    /// Apply the `tools` and `cloud.poll_interval_ms` settings.
    pub fn with_config(mut self, config: &AppConfig) -> Self {
        self.tools_enabled = config.tools.enabled;
        self.max_tool_rounds = config.tools.max_rounds as usize;
        self.poll_interval = config.cloud.poll_interval();
        self
    }

    pub fn with_local_runtime(mut self, runtime: Arc<dyn ModelRuntime>) -> Self {
        self.local = Some(runtime);
        self
    }

    pub fn with_cloud(mut self, client: Arc<dyn StreamingClient>) -> Self {
        self.cloud = Some(client);
        self
    }

    pub fn with_memory(mut self, memory: MemoryAugmenter) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_usage(mut self, usage: UsageTracker) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_tools_enabled(mut self, enabled: bool) -> Self {
        self.tools_enabled = enabled;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run one turn for `handle`.
    ///
    /// Refusals (`EmptyInput`, `Busy`, `VisionUnsupported`) leave the session
    /// untouched. A transport failure aborts the turn with
    /// [`TurnError::Transport`]; cancellation is [`TurnOutcome::Stopped`].
    pub async fn send(
        &self,
        handle: &SessionHandle,
        input: UserInput,
    ) -> Result<TurnOutcome, TurnError> {
        let text = input.text.trim();
        if text.is_empty() && input.image.is_none() {
            return Err(TurnError::EmptyInput);
        }

        let model = handle.model();
        if input.image.is_some() && !model.capabilities().supports_vision {
            return Err(TurnError::VisionUnsupported {
                model: model.id().to_string(),
            });
        }
        self.check_route(&model)?;

        let content = if text.is_empty() { IMAGE_ONLY_CONTENT } else { text };
        let user_message =
            Message::user(self.ids.next_id(), content).with_images(input.image.into_iter().collect());
        let user_id = user_message.id.clone();

        let token = handle.begin(user_message.clone())?;

        info!(
            session_id = %handle.id(),
            model = %model.id(),
            chars = content.len(),
            "Turn started"
        );

        let mut turn = Turn {
            handle,
            token,
            persisted: true,
        };
        turn.emit(TurnEvent::MessageAppended {
            message: user_message.clone(),
        });
        turn.persist(&*self.sessions).await;
        self.record_usage(UsageKind::Message, content).await;

        let query = self.augment(&mut turn, &user_id, content).await;

        // History before this turn plus the (possibly augmented) query.
        let snapshot = handle.snapshot();
        let history = &snapshot.messages[..snapshot.messages.len().saturating_sub(1)];
        let mut context: Vec<ContextMessage> = history.iter().map(to_context).collect();
        context.push(ContextMessage {
            role: Role::User,
            content: query,
            images: local_paths(&user_message.images),
        });

        let tools = if self.tools_enabled && model.capabilities().supports_tools {
            self.tools.list_tools()
        } else {
            Vec::new()
        };

        let corpus_dir = snapshot.rag_dir.clone();
        self.run_loop(&mut turn, &model, context, tools, corpus_dir)
            .await
    }

    async fn augment(&self, turn: &mut Turn<'_>, user_id: &str, content: &str) -> String {
        let Some(memory) = &self.memory else {
            return content.to_string();
        };

        let handle = turn.handle;
        let chat_id = if handle.is_ephemeral() {
            TEMP_CHAT_ID.to_string()
        } else {
            handle.id()
        };
        let query = memory
            .augment_user(user_id, content, &chat_id, |line| {
                handle.append_memory_log(user_id, line);
                handle.events().publish(TurnEvent::MemoryLog {
                    message_id: user_id.to_string(),
                    line: line.to_string(),
                });
            })
            .await;

        turn.persist(&*self.sessions).await;
        query
    }

    async fn run_loop(
        &self,
        turn: &mut Turn<'_>,
        model: &ModelDescriptor,
        mut context: Vec<ContextMessage>,
        tools: Vec<ToolDefinition>,
        corpus_dir: Option<String>,
    ) -> Result<TurnOutcome, TurnError> {
        let mut model_rounds = 0;
        let mut tool_rounds = 0;

        loop {
            model_rounds += 1;
            turn.handle.set_state(TurnState::AwaitingModel);
            debug!(round = model_rounds, messages = context.len(), "Requesting model");

            let request = CompletionRequest {
                model: model.id().to_string(),
                messages: context.clone(),
                tools: tools.clone(),
                corpus_dir: corpus_dir.clone(),
            };

            let opened = tokio::select! {
                biased;
                _ = turn.token.cancelled() => None,
                opened = self.open_source(model, request) => Some(opened),
            };
            let mut source = match opened {
                None => return Ok(self.stop(turn).await),
                Some(Ok(source)) => source,
                Some(Err(e)) => return Err(self.abort(turn, e).await),
            };

            let text = match self.read_response(turn, source.as_mut()).await {
                Response::Complete(text) => text,
                Response::Cancelled => return Ok(self.stop(turn).await),
                Response::Failed(e) => return Err(self.abort(turn, e).await),
            };
            let calls = source.function_calls();
            source.release();

            if calls.is_empty() {
                return Ok(self.finalize(turn, text, model_rounds).await);
            }

            // The accompanying text stays in the working context, even if empty.
            turn.handle.set_state(TurnState::ToolRequested);
            context.push(ContextMessage::new(Role::Assistant, text.clone()));

            turn.handle.set_state(TurnState::ExecutingTools);
            let Some(failed) = self.execute_tools(turn, &calls, &mut context).await else {
                return Ok(self.stop(turn).await);
            };
            tool_rounds += 1;

            if failed == 0 {
                return Ok(self.finalize(turn, text, model_rounds).await);
            }
            if tool_rounds >= self.max_tool_rounds {
                warn!(
                    rounds = tool_rounds,
                    failed, "Tool round limit reached, finalizing"
                );
                return Ok(self.finalize(turn, text, model_rounds).await);
            }
            debug!(failed, "Tool calls failed, asking the model again");
        }
    }

    fn check_route(&self, model: &ModelDescriptor) -> Result<(), TurnError> {
        match model {
            ModelDescriptor::Local { .. } if self.local.is_none() => {
                Err(TurnError::NoRuntime { route: "local" })
            }
            ModelDescriptor::Cloud { .. } if self.cloud.is_none() => {
                Err(TurnError::NoRuntime { route: "cloud" })
            }
            _ => Ok(()),
        }
    }

    async fn open_source(
        &self,
        model: &ModelDescriptor,
        request: CompletionRequest,
    ) -> Result<Box<dyn DeltaSource>, TurnError> {
        match model {
            ModelDescriptor::Local { .. } => {
                let runtime = self.local.as_ref().ok_or(TurnError::NoRuntime { route: "local" })?;
                let generation = runtime.start(request).await?;
                Ok(Box::new(PollingSource::raw(generation, self.poll_interval)))
            }
            ModelDescriptor::Cloud { .. } => {
                let client = self.cloud.as_ref().ok_or(TurnError::NoRuntime { route: "cloud" })?;
                Ok(client.open_stream(&request).await?)
            }
        }
    }

    /// Accumulate the streamed text. The accumulator is the only source of
    /// the assistant text.
    async fn read_response(&self, turn: &Turn<'_>, source: &mut dyn DeltaSource) -> Response {
        let mut text = String::new();
        loop {
            let event = tokio::select! {
                biased;
                _ = turn.token.cancelled() => None,
                event = source.next_event() => Some(event),
            };
            match event {
                None => {
                    source.release();
                    return Response::Cancelled;
                }
                Some(StreamEvent::Delta(fragment)) => {
                    text.push_str(&fragment);
                    turn.emit(TurnEvent::Delta { text: text.clone() });
                }
                Some(StreamEvent::Done) => return Response::Complete(text),
                Some(StreamEvent::Error(e)) => {
                    source.release();
                    return Response::Failed(e);
                }
            }
        }
    }

    /// Run calls in model order. Returns the number of failed calls, or
    /// `None` when the turn was cancelled.
    async fn execute_tools(
        &self,
        turn: &mut Turn<'_>,
        calls: &[ToolCall],
        context: &mut Vec<ContextMessage>,
    ) -> Option<usize> {
        let mut failed = 0;
        for call in calls {
            if turn.token.is_cancelled() {
                return None;
            }

            let call_message = Message::assistant(
                format!("{}_call", self.ids.next_id()),
                tool_call_content(call),
            );
            turn.append(call_message);
            turn.emit(TurnEvent::ToolCall { call: call.clone() });
            turn.persist(&*self.sessions).await;

            let result = tokio::select! {
                biased;
                _ = turn.token.cancelled() => None,
                result = self.tools.execute(call) => Some(result),
            };
            let cancelled = result.is_none();
            let result = result.unwrap_or_else(|| ToolResult::failure("cancelled"));

            let output_message = Message::user(
                format!("{}_result", self.ids.next_id()),
                format!("[Tool Output]: {}", result.output),
            );
            turn.append(output_message);
            turn.emit(TurnEvent::ToolResult {
                name: call.name.clone(),
                result: result.clone(),
            });
            turn.persist(&*self.sessions).await;

            if cancelled {
                return None;
            }
            if !result.success {
                failed += 1;
                context.push(ContextMessage::new(
                    Role::User,
                    format!("Tool '{}' error: {}", call.name, result.output),
                ));
            }
        }
        Some(failed)
    }

    async fn finalize(&self, turn: &mut Turn<'_>, text: String, model_rounds: usize) -> TurnOutcome {
        let message = if text.is_empty() {
            None
        } else {
            let message = Message::assistant(self.ids.next_id(), text);
            turn.append(message.clone());
            Some(message)
        };
        turn.handle.set_state(TurnState::Finalized);
        turn.persist(&*self.sessions).await;

        if let Some(message) = &message {
            self.record_usage(UsageKind::Completion, &message.content).await;
            if let Some(memory) = &self.memory {
                let chat_id = if turn.handle.is_ephemeral() {
                    TEMP_CHAT_ID.to_string()
                } else {
                    turn.handle.id()
                };
                memory
                    .memorize_assistant(&message.id, &message.content, &chat_id)
                    .await;
            }
        }

        info!(
            session_id = %turn.handle.id(),
            model_rounds,
            persisted = turn.persisted,
            "Turn finalized"
        );
        turn.emit(TurnEvent::Finalized {
            message: message.clone(),
        });
        TurnOutcome::Completed {
            message,
            model_rounds,
            persisted: turn.persisted,
        }
    }

    async fn stop(&self, turn: &mut Turn<'_>) -> TurnOutcome {
        turn.handle.set_state(TurnState::Aborted);
        turn.persist(&*self.sessions).await;
        info!(session_id = %turn.handle.id(), "Generation stopped");
        turn.emit(TurnEvent::Stopped);
        TurnOutcome::Stopped {
            persisted: turn.persisted,
        }
    }

    async fn abort(&self, turn: &mut Turn<'_>, error: impl Into<TurnError>) -> TurnError {
        let error = error.into();
        turn.handle.set_state(TurnState::Aborted);
        turn.persist(&*self.sessions).await;
        warn!(session_id = %turn.handle.id(), error = %error, "Turn aborted");
        turn.emit(TurnEvent::Error {
            message: error.to_string(),
        });
        error
    }

    async fn record_usage(&self, kind: UsageKind, content: &str) {
        if let Some(usage) = &self.usage
            && let Err(e) = usage.record(kind, content.chars().count()).await
        {
            warn!(error = %e, "Failed to record usage");
        }
    }
}

enum Response {
    Complete(String),
    Cancelled,
    Failed(ProviderError),
}

/// Book-keeping for one running turn.
struct Turn<'a> {
    handle: &'a SessionHandle,
    token: CancellationToken,
    persisted: bool,
}

impl Turn<'_> {
    fn emit(&self, event: TurnEvent) {
        self.handle.events().publish(event);
    }

    fn append(&self, message: Message) {
        self.handle.append(message.clone());
        self.emit(TurnEvent::MessageAppended { message });
    }

    /// Write the session. Failures are reported and remembered, never fatal.
    async fn persist(&mut self, sessions: &dyn SessionStore) {
        if self.handle.is_ephemeral() {
            self.persisted = false;
            return;
        }
        let session = self.handle.prepare_for_save();
        if let Err(e) = sessions.put(&session).await {
            self.report_persist_failure(&session.id, e);
        }
    }

    fn report_persist_failure(&mut self, session_id: &str, error: StoreError) {
        warn!(session_id, error = %error, "Failed to save session");
        self.persisted = false;
        self.emit(TurnEvent::PersistFailed {
            reason: error.to_string(),
        });
    }
}

fn to_context(message: &Message) -> ContextMessage {
    ContextMessage {
        role: message.role,
        content: message.content.clone(),
        images: local_paths(&message.images),
    }
}

/// `file://` URIs become plain paths for the model runtime.
fn local_paths(images: &[String]) -> Vec<String> {
    images
        .iter()
        .map(|img| img.strip_prefix("file://").unwrap_or(img).to_string())
        .collect()
}

/// The visible message for a tool call: python code is shown as code,
/// anything else as pretty-printed JSON arguments.
pub fn tool_call_content(call: &ToolCall) -> String {
    let mut content = format!("**Tool Call:** `{}`\n", call.name);
    match call.arguments.get("code").and_then(|c| c.as_str()) {
        Some(code) if call.name == "python_interpreter" => {
            content.push_str(&format!("```python\n{code}\n```"));
        }
        _ => {
            let args = serde_json::to_string_pretty(&call.arguments).unwrap_or_default();
            content.push_str(&format!("```json\n{args}\n```"));
        }
    }
    content
}
