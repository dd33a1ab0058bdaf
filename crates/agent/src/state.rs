//! Per-session turn state.

use lily_core::message::{ChatSession, Message};
use lily_core::provider::ModelDescriptor;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::events::{TurnEvent, TurnEvents};
use crate::orchestrator::TurnError;

/// Where a session's current turn is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingModel,
    ToolRequested,
    ExecutingTools,
    Finalized,
    Aborted,
}

impl TurnState {
    /// Whether a turn is running. Only idle and finished sessions accept a
    /// new send.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            TurnState::AwaitingModel | TurnState::ToolRequested | TurnState::ExecutingTools
        )
    }
}

struct Inner {
    session: ChatSession,
    model: ModelDescriptor,
    state: TurnState,
    cancel: CancellationToken,
    ephemeral: bool,
}

/// A chat session together with its turn state.
///
/// Cloning yields another handle to the same session. The lock is held only
/// for short synchronous sections, never across an await.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<Inner>>,
    events: TurnEvents,
}

impl SessionHandle {
    pub fn new(session: ChatSession, model: ModelDescriptor) -> Self {
        Self::build(session, model, false)
    }

    /// A session that is never written to the session store.
    pub fn ephemeral(model: ModelDescriptor) -> Self {
        Self::build(ChatSession::new(model.id()), model, true)
    }

    fn build(mut session: ChatSession, model: ModelDescriptor, ephemeral: bool) -> Self {
        session.model_id = model.id().to_string();
        Self {
            inner: Arc::new(Mutex::new(Inner {
                session,
                model,
                state: TurnState::Idle,
                cancel: CancellationToken::new(),
                ephemeral,
            })),
            events: TurnEvents::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> String {
        self.lock().session.id.clone()
    }

    /// A copy of the session as it is now.
    pub fn snapshot(&self) -> ChatSession {
        self.lock().session.clone()
    }

    pub fn state(&self) -> TurnState {
        self.lock().state
    }

    pub fn model(&self) -> ModelDescriptor {
        self.lock().model.clone()
    }

    pub fn is_ephemeral(&self) -> bool {
        self.lock().ephemeral
    }

    /// Switch models. Rejected while a turn is running.
    pub fn set_model(&self, model: ModelDescriptor) -> Result<(), TurnError> {
        let mut inner = self.lock();
        if inner.state.is_in_flight() {
            return Err(TurnError::Busy);
        }
        inner.session.model_id = model.id().to_string();
        inner.model = model;
        Ok(())
    }

    /// Attach a document directory. Every later model request carries it.
    pub fn set_rag_dir(&self, dir: impl Into<String>) {
        self.lock().session.rag_dir = Some(dir.into());
    }

    /// Stop the running turn, if any.
    pub fn cancel(&self) {
        self.lock().cancel.cancel();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<TurnEvent>> {
        self.events.subscribe()
    }

    pub(crate) fn events(&self) -> &TurnEvents {
        &self.events
    }

    /// Start a turn: append the user message and enter `AwaitingModel`,
    /// unless a turn is already running. Check and append happen under one
    /// lock so a rejected send leaves the history untouched.
    pub(crate) fn begin(&self, user_message: Message) -> Result<CancellationToken, TurnError> {
        let mut inner = self.lock();
        if inner.state.is_in_flight() {
            return Err(TurnError::Busy);
        }
        inner.session.push(user_message);
        inner.state = TurnState::AwaitingModel;
        inner.cancel = CancellationToken::new();
        Ok(inner.cancel.clone())
    }

    pub(crate) fn set_state(&self, state: TurnState) {
        self.lock().state = state;
    }

    pub(crate) fn append(&self, message: Message) {
        self.lock().session.push(message);
    }

    pub(crate) fn append_memory_log(&self, message_id: &str, line: &str) {
        if let Some(message) = self.lock().session.message_mut(message_id) {
            message.memory_log.push(line.to_string());
        }
    }

    /// Stamp the session for saving and return the copy to write.
    pub(crate) fn prepare_for_save(&self) -> ChatSession {
        let mut inner = self.lock();
        inner.session.prepare_for_save(chrono::Utc::now());
        inner.session.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lily_core::provider::Capabilities;

    fn handle() -> SessionHandle {
        SessionHandle::new(
            ChatSession::new("placeholder"),
            ModelDescriptor::local("qwen3-1.7b", Capabilities::default()),
        )
    }

    #[test]
    fn new_handle_is_idle_and_adopts_model_id() {
        let handle = handle();
        assert_eq!(handle.state(), TurnState::Idle);
        assert_eq!(handle.snapshot().model_id, "qwen3-1.7b");
    }

    #[test]
    fn rag_dir_lands_on_the_session() {
        let handle = handle();
        handle.set_rag_dir("/srv/docs");
        assert_eq!(handle.snapshot().rag_dir.as_deref(), Some("/srv/docs"));
    }

    #[test]
    fn begin_rejects_second_turn_without_mutation() {
        let handle = handle();
        handle.begin(Message::user("1", "first")).unwrap();
        let err = handle.begin(Message::user("2", "second")).unwrap_err();
        assert!(matches!(err, TurnError::Busy));
        assert_eq!(handle.snapshot().messages.len(), 1);
    }

    #[test]
    fn finished_states_accept_new_turn() {
        let handle = handle();
        for done in [TurnState::Finalized, TurnState::Aborted] {
            handle.set_state(done);
            assert!(handle.begin(Message::user("x", "again")).is_ok());
        }
    }

    #[test]
    fn cancel_trips_current_token_only() {
        let handle = handle();
        let first = handle.begin(Message::user("1", "a")).unwrap();
        handle.cancel();
        assert!(first.is_cancelled());

        handle.set_state(TurnState::Aborted);
        let second = handle.begin(Message::user("2", "b")).unwrap();
        assert!(!second.is_cancelled());
    }

    #[test]
    fn memory_log_appends_in_place() {
        let handle = handle();
        handle.append(Message::user("m1", "hello"));
        handle.append_memory_log("m1", "Converting to embeddings...");
        handle.append_memory_log("missing", "ignored");
        assert_eq!(
            handle.snapshot().messages[0].memory_log,
            vec!["Converting to embeddings..."]
        );
    }

    #[test]
    fn set_model_blocked_while_in_flight() {
        let handle = handle();
        handle.begin(Message::user("1", "a")).unwrap();
        assert!(handle.set_model(ModelDescriptor::cloud("openai/gpt-4o")).is_err());
        handle.set_state(TurnState::Finalized);
        handle.set_model(ModelDescriptor::cloud("openai/gpt-4o")).unwrap();
        assert_eq!(handle.snapshot().model_id, "openai/gpt-4o");
    }

    #[test]
    fn prepare_for_save_derives_title() {
        let handle = handle();
        handle.append(Message::user("1", "What is the capital of France?"));
        assert_eq!(handle.prepare_for_save().title, "What is the capital of France?");
    }
}
