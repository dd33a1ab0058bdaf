//! Transport stream adapter.
//!
//! Model output reaches the client in one of two shapes:
//! - a **pull-based** byte stream, read chunk by chunk ([`ChunkedSource`])
//! - a **poll-based** progressive buffer whose full text grows over time
//!   ([`PollingSource`])
//!
//! Both normalize to the same lazy, finite sequence of [`StreamEvent`]s behind
//! the [`DeltaSource`] trait. Fragments are emitted in exact byte order and
//! nothing is ever replayed.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use lily_core::error::ProviderError;
use lily_core::provider::{CompletionRequest, Generation};
use lily_core::tool::ToolCall;
use serde::Deserialize;
use std::collections::{BTreeMap, VecDeque};
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// One step of a streamed model response.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// The next text fragment
    Delta(String),
    /// The response is complete
    Done,
    /// The transport failed; no further events follow
    Error(ProviderError),
}

impl StreamEvent {
    fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error(_))
    }
}

/// A streamed model response, independent of how it is transported.
///
/// After `Done` or `Error` has been returned, `next_event` keeps returning
/// `Done`. The sequence cannot be restarted.
#[async_trait]
pub trait DeltaSource: Send {
    /// Wait for the next event. "No data yet" is never an event: the call
    /// simply does not complete until there is something to report.
    async fn next_event(&mut self) -> StreamEvent;

    /// Function calls requested by the model, complete once `Done` was seen.
    fn function_calls(&self) -> Vec<ToolCall>;

    /// Release the underlying reader. Idempotent.
    fn release(&mut self);
}

/// Opens a streamed response for a completion request.
#[async_trait]
pub trait StreamingClient: Send + Sync {
    async fn open_stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<Box<dyn DeltaSource>, ProviderError>;
}

// --- SSE line parser ---

/// Incremental parser for `data: {...}` server-sent event lines.
///
/// Input may be split anywhere, including inside a line or inside a UTF-8
/// sequence: bytes are buffered until a newline arrives and each complete
/// line is decoded on its own.
#[derive(Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    done: bool,
    tool_calls: BTreeMap<u32, ToolCallAccumulator>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns events for every complete line.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        if self.done {
            return out;
        }
        self.buffer.extend_from_slice(bytes);

        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            self.handle_line(&line, &mut out);
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        out
    }

    /// End of input: parse a trailing unterminated line, then report `Done`
    /// unless the stream already ended.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        if self.done {
            return out;
        }
        let rest = std::mem::take(&mut self.buffer);
        if !rest.is_empty() {
            self.handle_line(&rest, &mut out);
        }
        if !self.done {
            self.done = true;
            out.push(StreamEvent::Done);
        }
        out
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Function calls assembled from tool-call deltas, in index order.
    pub fn function_calls(&self) -> Vec<ToolCall> {
        self.tool_calls.values().map(|acc| acc.to_tool_call()).collect()
    }

    fn handle_line(&mut self, raw: &[u8], out: &mut Vec<StreamEvent>) {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();

        // Skip empty lines and SSE comments
        if line.is_empty() || line.starts_with(':') {
            return;
        }

        // Only "data:" lines carry payloads; "event:", "id:" etc. are ignored
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();

        if data == "[DONE]" {
            self.done = true;
            out.push(StreamEvent::Done);
            return;
        }

        let chunk = match serde_json::from_str::<StreamResponse>(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
                return;
            }
        };

        if let Some(err) = chunk.error {
            self.done = true;
            out.push(StreamEvent::Error(ProviderError::ApiError {
                status_code: err.code.unwrap_or(200),
                message: err.message,
            }));
            return;
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return;
        };

        for tc_delta in choice.delta.tool_calls.unwrap_or_default() {
            let acc = self.tool_calls.entry(tc_delta.index).or_default();
            if let Some(func) = tc_delta.function {
                if let Some(name) = func.name {
                    acc.name = name;
                }
                if let Some(args) = func.arguments {
                    acc.arguments.push_str(&args);
                }
            }
        }

        if let Some(content) = choice.delta.content
            && !content.is_empty()
        {
            out.push(StreamEvent::Delta(content));
        }
    }
}

/// Accumulates incremental tool call deltas into a complete call.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    /// Arguments that do not parse as a JSON object yield a malformed call,
    /// never one with defaulted arguments.
    fn to_tool_call(&self) -> ToolCall {
        if self.arguments.trim().is_empty() {
            return ToolCall::new(self.name.clone(), serde_json::Value::Object(Default::default()));
        }
        match serde_json::from_str::<serde_json::Value>(&self.arguments) {
            Ok(arguments) => ToolCall::new(self.name.clone(), arguments),
            Err(e) => {
                warn!(tool = %self.name, error = %e, "Tool call arguments are not valid JSON");
                ToolCall::malformed(
                    self.name.clone(),
                    format!("arguments are not valid JSON ({e})"),
                )
            }
        }
    }
}

// --- Streaming SSE payload types ---

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta: arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
    #[serde(default)]
    code: Option<u16>,
}

// --- Pull-based transport ---

/// Reads raw byte chunks from a stream and parses them as SSE lines.
///
/// The stream is dropped as soon as the response completes, fails, or the
/// source is released.
pub struct ChunkedSource<S> {
    stream: Option<S>,
    parser: SseParser,
    pending: VecDeque<StreamEvent>,
    finished: bool,
}

impl<S> ChunkedSource<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
            parser: SseParser::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Whether the underlying stream has been dropped.
    pub fn is_released(&self) -> bool {
        self.stream.is_none()
    }
}

#[async_trait]
impl<S, B, E> DeltaSource for ChunkedSource<S>
where
    S: Stream<Item = Result<B, E>> + Send + Unpin,
    B: AsRef<[u8]> + Send,
    E: Display + Send,
{
    async fn next_event(&mut self) -> StreamEvent {
        loop {
            if let Some(event) = self.pending.pop_front() {
                if event.is_terminal() {
                    self.finished = true;
                    self.release();
                }
                return event;
            }
            if self.finished {
                return StreamEvent::Done;
            }

            let Some(stream) = self.stream.as_mut() else {
                self.finished = true;
                return StreamEvent::Done;
            };

            match stream.next().await {
                Some(Ok(bytes)) => self.pending.extend(self.parser.feed(bytes.as_ref())),
                Some(Err(e)) => {
                    warn!(error = %e, "Stream read failed");
                    self.pending
                        .push_back(StreamEvent::Error(ProviderError::StreamInterrupted(e.to_string())));
                }
                None => self.pending.extend(self.parser.finish()),
            }
        }
    }

    fn function_calls(&self) -> Vec<ToolCall> {
        self.parser.function_calls()
    }

    fn release(&mut self) {
        self.finished = true;
        self.pending.clear();
        if self.stream.take().is_some() {
            debug!("Chunked stream released");
        }
    }
}

// --- Poll-based transport ---

/// How the text of a progressive buffer is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// The buffer holds an SSE response body
    Sse,
    /// The buffer holds the completion text itself
    Raw,
}

/// Polls a growing buffer and emits only what was appended since the last
/// poll, tracked by a length cursor (content is never diffed).
pub struct PollingSource {
    buffer: Box<dyn Generation>,
    framing: Framing,
    parser: SseParser,
    seen: usize,
    interval: Duration,
    pending: VecDeque<StreamEvent>,
    finished: bool,
    released: bool,
}

impl PollingSource {
    pub fn new(buffer: Box<dyn Generation>, framing: Framing, interval: Duration) -> Self {
        Self {
            buffer,
            framing,
            parser: SseParser::new(),
            seen: 0,
            interval,
            pending: VecDeque::new(),
            finished: false,
            released: false,
        }
    }

    /// A local generation whose text is the completion itself.
    pub fn raw(buffer: Box<dyn Generation>, interval: Duration) -> Self {
        Self::new(buffer, Framing::Raw, interval)
    }

    /// A buffered SSE response body.
    pub fn sse(buffer: Box<dyn Generation>, interval: Duration) -> Self {
        Self::new(buffer, Framing::Sse, interval)
    }

    /// Whether the buffer has been aborted.
    pub fn is_released(&self) -> bool {
        self.released
    }

    fn poll_once(&mut self) {
        // Read the flag before the text: once generation is seen as over,
        // the text read afterwards is final.
        let generating = self.buffer.is_generating();
        let text = self.buffer.text();

        if text.len() < self.seen {
            self.pending.push_back(StreamEvent::Error(ProviderError::StreamInterrupted(
                format!("response buffer shrank from {} to {} bytes", self.seen, text.len()),
            )));
            return;
        }
        let Some(fresh) = text.get(self.seen..) else {
            self.pending.push_back(StreamEvent::Error(ProviderError::StreamInterrupted(
                "response buffer cursor is not on a character boundary".into(),
            )));
            return;
        };

        if !fresh.is_empty() {
            match self.framing {
                Framing::Raw => self.pending.push_back(StreamEvent::Delta(fresh.to_string())),
                Framing::Sse => self.pending.extend(self.parser.feed(fresh.as_bytes())),
            }
            self.seen = text.len();
        }

        if generating || self.pending.back().is_some_and(StreamEvent::is_terminal) {
            return;
        }

        if let Some(err) = self.buffer.failure() {
            self.pending.push_back(StreamEvent::Error(err));
            return;
        }
        match self.framing {
            Framing::Raw => self.pending.push_back(StreamEvent::Done),
            Framing::Sse => self.pending.extend(self.parser.finish()),
        }
    }
}

#[async_trait]
impl DeltaSource for PollingSource {
    async fn next_event(&mut self) -> StreamEvent {
        loop {
            if let Some(event) = self.pending.pop_front() {
                if event.is_terminal() {
                    self.finished = true;
                    self.release();
                }
                return event;
            }
            if self.finished {
                return StreamEvent::Done;
            }

            self.poll_once();
            if self.pending.is_empty() {
                tokio::time::sleep(self.interval).await;
            }
        }
    }

    fn function_calls(&self) -> Vec<ToolCall> {
        match self.framing {
            Framing::Sse => self.parser.function_calls(),
            Framing::Raw => self.buffer.function_calls(),
        }
    }

    fn release(&mut self) {
        self.finished = true;
        self.pending.clear();
        if !self.released {
            self.released = true;
            self.buffer.abort();
            debug!("Progressive buffer released");
        }
    }
}

/// Drain a source into its full text. Stops at the first error.
pub async fn collect_text(source: &mut dyn DeltaSource) -> Result<String, ProviderError> {
    let mut text = String::new();
    loop {
        match source.next_event().await {
            StreamEvent::Delta(fragment) => text.push_str(&fragment),
            StreamEvent::Done => return Ok(text),
            StreamEvent::Error(e) => return Err(e),
        }
    }
}
