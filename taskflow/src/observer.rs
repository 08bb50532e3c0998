//! The per-node begin/end event fed to observers installed with `Executor::make_observer`.
//!
//! This is deliberately thin: the event carries just enough to let an observer reconstruct
//! per-worker timelines (`worker`, `node`, `kind`, `phase`) and relies entirely on
//! `taskflow_logging::Registry`/`Logger` for batching, timestamping, and delivery; there is no
//! bespoke observer trait here, matching the teacher's own preference for routing diagnostics
//! through its logging registry rather than a parallel callback mechanism.

use crate::TaskKind;

/// A logger bound to the node-execution event stream, returned by `Executor::make_observer`.
pub type Observer = taskflow_logging::Logger<ObserverEvent>;

/// Which half of a node's execution this event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Entry,
    Exit,
}

/// One node execution's begin or end, as seen by an installed observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverEvent {
    pub worker: usize,
    pub node: usize,
    pub kind: TaskKind,
    pub phase: Phase,
}
