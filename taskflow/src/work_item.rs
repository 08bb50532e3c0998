//! The sum type carried by the shared work-stealing deque.
//!
//! Per the design note on avoiding a second scheduler for the async façade: node activations and
//! free-standing async closures are both just a `WorkItem`, so `async`/`silent_async` ride the same
//! deque, the same steal loop, and the same notifier as ordinary graph execution instead of needing
//! their own pool.

use crate::future::SharedState;
use crate::topology::{self, TopologyInner};
use crate::TaskflowError;
use std::sync::Arc;
use taskflow_executor::{Job, WorkerContext};

pub(crate) enum WorkItem {
    /// A node has become runnable (its join counter reached zero, or it is an initial source).
    Activate { topology: Arc<TopologyInner>, node: usize },
    /// A node's semaphores have all been acquired; run its body.
    RunBody { topology: Arc<TopologyInner>, node: usize },
    /// A free-standing async closure.
    Async(Box<dyn FnOnce(&WorkerContext<WorkItem>) + Send>),
}

pub(crate) fn async_job<T: Send + 'static>(
    f: impl FnOnce() -> T + Send + 'static,
    result: Arc<SharedState<T>>,
) -> WorkItem {
    WorkItem::Async(Box::new(move |_ctx| {
        let outcome = crate::error::catch_unwind(f);
        result.fulfill(outcome);
    }))
}

pub(crate) fn silent_async_job(f: impl FnOnce() + Send + 'static) -> WorkItem {
    WorkItem::Async(Box::new(move |_ctx| {
        if let Err(TaskflowError::TaskPanicked(msg)) = crate::error::catch_unwind(f) {
            log::warn!("silent_async task panicked: {msg}");
        }
    }))
}

impl Job for WorkItem {
    fn run(self, ctx: &WorkerContext<WorkItem>) {
        match self {
            WorkItem::Activate { topology, node } => topology::activate(ctx, &topology, node),
            WorkItem::RunBody { topology, node } => topology::run_body(ctx, &topology, node),
            WorkItem::Async(job) => job(ctx),
        }
    }
}
