//! Usage tracking for Lily.
//!
//! Every user message and every assistant completion is recorded as a
//! [`UsageEntry`](lily_core::usage::UsageEntry). This crate stores those
//! entries and aggregates them into totals and time-bucketed histograms.

pub mod engine;
pub mod log;
pub mod model;

pub use engine::UsageTracker;
pub use log::{FileUsageLog, InMemoryUsageLog};
pub use model::{TimeRange, UsageHistogram, UsageStats};
