//! The handle a DYNAMIC task uses to grow and dispose of a child graph.
//!
//! Ownership is the subtle part: a joined subflow's nodes must finish before the parent node's
//! own completion is reported upstream, while a detached subflow's nodes outlive the parent node
//! but must still finish before the enclosing topology's epilogue fires. Both are modeled as a
//! nested [`crate::topology::TopologyInner`] run over the subflow's own graph: joined subflows
//! wait on it cooperatively, detached ones are adopted by the parent topology, which tracks them
//! until they finish.

use crate::future::{Future, SharedState};
use crate::graph::Taskflow;
use crate::topology::{self, TopologyInner};
use crate::{Task, TaskflowError};
use std::sync::{Arc, Mutex};
use taskflow_executor::{Pool, WorkerContext};

use crate::work_item::WorkItem;

/// A per-invocation handle given to a DYNAMIC task's closure.
pub struct Subflow<'a> {
    children: Taskflow,
    parent: Arc<TopologyInner>,
    pool: Arc<Pool<WorkItem>>,
    ctx: &'a WorkerContext<WorkItem>,
    joinable: bool,
    error: Option<TaskflowError>,
}

impl<'a> Subflow<'a> {
    pub(crate) fn new(parent: Arc<TopologyInner>, pool: Arc<Pool<WorkItem>>, ctx: &'a WorkerContext<WorkItem>) -> Self {
        Subflow { children: Taskflow::new(), parent, pool, ctx, joinable: true, error: None }
    }

    pub fn joinable(&self) -> bool {
        self.joinable
    }

    /// Returns `Err(SubflowNotJoinable)` instead of touching `self.children` once `join()` or
    /// `detach()` has already run: the child graph may by then be scheduled (detach) or torn down
    /// (join), so mutating it afterward is rejected rather than left to race the scheduler.
    fn check_joinable(&self) -> Result<(), TaskflowError> {
        if self.joinable {
            Ok(())
        } else {
            Err(TaskflowError::SubflowNotJoinable)
        }
    }

    pub fn emplace(&self, f: impl Fn() + Send + Sync + 'static) -> Result<Task, TaskflowError> {
        self.check_joinable()?;
        Ok(self.children.emplace(f))
    }

    pub fn emplace_condition(&self, f: impl Fn() -> i32 + Send + Sync + 'static) -> Result<Task, TaskflowError> {
        self.check_joinable()?;
        Ok(self.children.emplace_condition(f))
    }

    pub fn emplace_dynamic(
        &self,
        f: impl for<'s> Fn(&mut Subflow<'s>) + Send + Sync + 'static,
    ) -> Result<Task, TaskflowError> {
        self.check_joinable()?;
        Ok(self.children.emplace_dynamic(f))
    }

    pub fn placeholder(&self) -> Result<Task, TaskflowError> {
        self.check_joinable()?;
        Ok(self.children.placeholder())
    }

    pub fn composed_of(&self, other: &Taskflow) -> Result<Task, TaskflowError> {
        self.check_joinable()?;
        self.children.composed_of(other)
    }

    pub fn linearize(&self, tasks: &[Task]) -> Result<(), TaskflowError> {
        self.check_joinable()?;
        self.children.linearize(tasks);
        Ok(())
    }

    pub fn num_tasks(&self) -> usize {
        self.children.num_tasks()
    }

    /// Enqueues `f` as a node of this subflow's child graph, tracked by `join()`/`detach()` just
    /// like any other child node: async work launched from a subflow rides the same graph
    /// machinery rather than a parallel bookkeeping path, so it is automatically accounted for
    /// wherever this subflow ends up (joined synchronously, or detached to the topology).
    pub fn spawn<F, T>(&self, f: F) -> Result<Future<T>, TaskflowError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.check_joinable()?;
        let state = SharedState::pending();
        let result = state.clone();
        let slot = Mutex::new(Some(f));
        self.children.emplace(move || {
            if let Some(f) = slot.lock().unwrap().take() {
                result.fulfill(crate::error::catch_unwind(f));
            }
        });
        Ok(Future::new(state))
    }

    /// Like [`Subflow::spawn`] but without tracking a result.
    pub fn spawn_silent<F>(&self, f: F) -> Result<(), TaskflowError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.check_joinable()?;
        let slot = Mutex::new(Some(f));
        self.children.emplace(move || {
            if let Some(f) = slot.lock().unwrap().take() {
                if let Err(TaskflowError::TaskPanicked(msg)) = crate::error::catch_unwind(f) {
                    log::warn!("subflow spawn_silent task panicked: {msg}");
                }
            }
        });
        Ok(())
    }

    /// Runs the child graph to completion on the current worker (cooperatively draining other
    /// queued work while waiting, so this never deadlocks even at `W == 1`), then marks this
    /// subflow no longer joinable.
    pub fn join(&mut self) -> Result<(), TaskflowError> {
        if !self.joinable {
            return Err(TaskflowError::SubflowNotJoinable);
        }
        self.joinable = false;
        self.join_now();
        Ok(())
    }

    pub(crate) fn join_now(&mut self) {
        let mini = TopologyInner::new_child(self.children.inner.clone(), self.pool.clone(), self.parent.observer_handle());
        mini.kickoff_on(self.ctx);
        topology::wait_cooperatively(self.ctx, &mini);
        self.error = mini.error();
    }

    pub(crate) fn take_error(&mut self) -> Option<TaskflowError> {
        self.error.take()
    }

    /// Transfers ownership of the child graph to the enclosing topology: it runs concurrently
    /// with whatever follows this node, but is guaranteed to finish before the topology's final
    /// epilogue fires.
    pub fn detach(&mut self) -> Result<(), TaskflowError> {
        if !self.joinable {
            return Err(TaskflowError::SubflowNotJoinable);
        }
        self.joinable = false;
        self.parent.adopt_detached_child(self.children.inner.clone(), self.pool.clone(), self.ctx);
        Ok(())
    }
}
