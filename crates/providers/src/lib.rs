//! Model transport for Lily.
//!
//! [`stream`] normalizes pull-based and poll-based responses into one event
//! sequence; [`openai_compat`] talks to the remote endpoint.

pub mod http_buffer;
pub mod openai_compat;
pub mod stream;

pub use http_buffer::HttpProgressiveBuffer;
pub use openai_compat::{CloudClient, CloudEmbedder, CloudModel, ModelPricing};
pub use stream::{
    ChunkedSource, DeltaSource, Framing, PollingSource, SseParser, StreamEvent, StreamingClient,
    collect_text,
};
