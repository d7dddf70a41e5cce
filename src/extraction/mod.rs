//! Streaming event extraction.
//!
//! A source file is read line by line. Consecutive statements that share a
//! graph form a window; when the graph changes (or the window reaches its
//! statement cap) the window is closed, every Event subject in it is rebuilt
//! with its nested location and organizer, and the buckets are dropped. Memory
//! is bounded by the largest window, not by the file.

pub mod arena;
pub mod reconstruct;
pub mod stream;
pub mod vocabulary;

pub use arena::GraphWindow;
pub use reconstruct::Reconstructor;
pub use stream::{EventBudget, EventStream, ExtractionStats, Extractor, StopReason, StreamOutcome};
