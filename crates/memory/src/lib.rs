//! Similarity index and session store implementations for Lily.

pub mod file_backend;
pub mod in_memory;
pub mod jsonl;
pub mod sessions;
pub mod vector;

pub use file_backend::FileIndex;
pub use in_memory::InMemoryIndex;
pub use sessions::{FileSessionStore, InMemorySessionStore};
pub use vector::{cosine_similarity, rank};
