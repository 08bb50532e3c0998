//! A fast, in-process parallel task-graph execution engine.
//!
//! A program describes computation as a [`Taskflow`] (a directed graph of [`Task`]s) and hands
//! it to an [`Executor`], a fixed-width pool of worker threads that runs it with work-stealing,
//! dynamic subgraph expansion ([`Subflow`]), data-driven branching (condition tasks), module
//! composition (`composed_of`), and admission control ([`Semaphore`]/[`CriticalSection`]).
//!
//! The crate is split the way the scheduler itself is layered: [`taskflow_executor`] owns the
//! worker pool and work-stealing deques and knows nothing about graphs; this crate builds the
//! graph data model, the topology/scheduler protocol, and the public API on top of it.

mod error;
mod executor;
mod future;
mod graph;
mod helpers;
mod observer;
mod semaphore;
mod subflow;
mod topology;
mod work_item;

pub use error::TaskflowError;
pub use executor::{Executor, ExecutorConfig};
pub use future::{Future, FutureStatus};
pub use graph::{Task, Taskflow};
pub use observer::{Observer, ObserverEvent, Phase};
pub use semaphore::{CriticalSection, Semaphore};
pub use subflow::Subflow;

/// The four shapes a node's body may take, plus the placeholder state before one is assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// `emplace`d with no body yet; behaves as a no-op STATIC task if ever activated.
    Placeholder,
    /// `fn() -> ()`.
    Static,
    /// `fn(&mut Subflow) -> ()`.
    Dynamic,
    /// `fn() -> i32`, selecting one successor by index.
    Condition,
    /// References another [`Taskflow`], executed inline via `composed_of`.
    Module,
}
