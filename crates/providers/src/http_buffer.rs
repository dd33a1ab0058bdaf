//! A live HTTP response exposed as a growing text buffer.
//!
//! A background task drains the body into shared state; readers poll it the
//! way a browser-style request object exposes `responseText`.

use futures::{Stream, StreamExt};
use lily_core::error::ProviderError;
use lily_core::provider::{Generation, ProgressiveBuffer};
use lily_core::tool::ToolCall;
use std::fmt::Display;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Default)]
struct BufferState {
    text: String,
    /// Trailing bytes of an incomplete UTF-8 sequence
    carry: Vec<u8>,
    generating: bool,
    failure: Option<ProviderError>,
}

impl BufferState {
    fn push_bytes(&mut self, bytes: &[u8]) {
        self.carry.extend_from_slice(bytes);
        match std::str::from_utf8(&self.carry) {
            Ok(s) => {
                self.text.push_str(s);
                self.carry.clear();
            }
            Err(e) if e.error_len().is_none() => {
                // Incomplete sequence at the end: keep it for the next chunk.
                let valid = e.valid_up_to();
                self.text
                    .push_str(&String::from_utf8_lossy(&self.carry[..valid]));
                self.carry.drain(..valid);
            }
            Err(_) => {
                self.text.push_str(&String::from_utf8_lossy(&self.carry));
                self.carry.clear();
            }
        }
    }
}

pub struct HttpProgressiveBuffer {
    state: Arc<Mutex<BufferState>>,
    task: JoinHandle<()>,
}

impl HttpProgressiveBuffer {
    /// Start draining `body` in the background.
    pub fn spawn<S, B, E>(body: S) -> Self
    where
        S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: Display + Send + 'static,
    {
        let state = Arc::new(Mutex::new(BufferState {
            generating: true,
            ..Default::default()
        }));

        let shared = state.clone();
        let task = tokio::spawn(async move {
            let mut body = body;
            while let Some(chunk) = body.next().await {
                let mut state = lock(&shared);
                match chunk {
                    Ok(bytes) => state.push_bytes(bytes.as_ref()),
                    Err(e) => {
                        state.failure = Some(ProviderError::StreamInterrupted(e.to_string()));
                        break;
                    }
                }
            }
            let mut state = lock(&shared);
            if !state.carry.is_empty() {
                let tail = std::mem::take(&mut state.carry);
                state.text.push_str(&String::from_utf8_lossy(&tail));
            }
            state.generating = false;
            debug!(bytes = state.text.len(), "Response body drained");
        });

        Self { state, task }
    }
}

fn lock(state: &Mutex<BufferState>) -> MutexGuard<'_, BufferState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl ProgressiveBuffer for HttpProgressiveBuffer {
    fn text(&self) -> String {
        lock(&self.state).text.clone()
    }

    fn is_generating(&self) -> bool {
        lock(&self.state).generating
    }

    fn failure(&self) -> Option<ProviderError> {
        lock(&self.state).failure.clone()
    }

    fn abort(&self) {
        self.task.abort();
        lock(&self.state).generating = false;
    }
}

impl Generation for HttpProgressiveBuffer {
    /// Tool calls arrive inside the SSE body and are assembled by the reader.
    fn function_calls(&self) -> Vec<ToolCall> {
        Vec::new()
    }
}

impl Drop for HttpProgressiveBuffer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{PollingSource, collect_text};
    use std::time::Duration;

    async fn drained(buffer: &HttpProgressiveBuffer) {
        while buffer.is_generating() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn split_utf8_is_reassembled() {
        let text = "naïve café";
        let bytes = text.as_bytes();
        // Split inside the two-byte 'ï'
        let split = text.find('ï').unwrap() + 1;
        let chunks: Vec<Result<Vec<u8>, String>> =
            vec![Ok(bytes[..split].to_vec()), Ok(bytes[split..].to_vec())];

        let buffer = HttpProgressiveBuffer::spawn(futures::stream::iter(chunks));
        drained(&buffer).await;
        assert_eq!(buffer.text(), text);
        assert!(buffer.failure().is_none());
    }

    #[tokio::test]
    async fn body_error_recorded() {
        let chunks: Vec<Result<Vec<u8>, String>> =
            vec![Ok(b"data: partial".to_vec()), Err("reset by peer".into())];
        let buffer = HttpProgressiveBuffer::spawn(futures::stream::iter(chunks));
        drained(&buffer).await;
        assert_eq!(buffer.text(), "data: partial");
        assert!(buffer.failure().unwrap().to_string().contains("reset by peer"));
    }

    #[tokio::test]
    async fn polling_an_sse_body() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"po\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"lled\"}}]}\n\ndata: [DONE]\n\n";
        let chunks: Vec<Result<Vec<u8>, String>> = body
            .as_bytes()
            .chunks(9)
            .map(|c| Ok(c.to_vec()))
            .collect();

        let buffer = HttpProgressiveBuffer::spawn(futures::stream::iter(chunks));
        let mut source = PollingSource::sse(Box::new(buffer), Duration::from_millis(1));
        assert_eq!(collect_text(&mut source).await.unwrap(), "polled");
    }
}
