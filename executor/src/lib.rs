//! The work-stealing worker pool shared by graph execution and the async façade.
//!
//! This crate knows nothing about graphs, nodes, or dependencies; it runs values of a
//! caller-supplied [`Job`] type on a fixed pool of OS threads, stealing work between them when a
//! worker runs dry. `taskflow` builds its scheduler on top by making its `WorkItem` enum (node
//! activations and async closures alike) implement `Job`, so there is exactly one queue, one
//! steal loop, and one notifier for both kinds of work rather than two competing schedulers.

mod buzzer;
mod pool;

pub use buzzer::Notifier;
pub use pool::{Job, Pool, WorkerContext};
