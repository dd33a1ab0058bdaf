//! The conversation engine.
//!
//! A turn moves through an explicit state machine held per session:
//!
//! ```text
//! Idle → AwaitingModel → (ToolRequested → ExecutingTools → AwaitingModel)* → Finalized
//!                      ↘ Aborted (transport failure or cancellation)
//! ```
//!
//! [`TurnOrchestrator`] drives it; [`MemoryAugmenter`] enriches user
//! messages with retrieved memories; [`TurnEvent`]s report progress live.

pub mod events;
pub mod memory_step;
pub mod orchestrator;
pub mod state;

#[cfg(test)]
mod test_helpers;

pub use events::{TurnEvent, TurnEvents};
pub use memory_step::MemoryAugmenter;
pub use orchestrator::{TurnError, TurnOrchestrator, TurnOutcome, UserInput, tool_call_content};
pub use state::{SessionHandle, TurnState};
