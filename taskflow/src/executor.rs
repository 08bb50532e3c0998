//! The fixed-width worker pool that runs `Taskflow`s, plus the async façade sharing it.
//!
//! `Executor` is a thin user-facing layer over [`taskflow_executor::Pool`]: submitting a graph
//! constructs a [`TopologyInner`] and kicks off its source nodes; `spawn`/`spawn_silent` push a
//! bare closure onto the same pool as a [`WorkItem::Async`]. One pool, one steal loop, one
//! notifier serve both, the design note against building a second scheduler for the async
//! sub-API.

use crate::future::SharedState;
use crate::graph::Taskflow;
use crate::observer::{Observer, ObserverEvent};
use crate::topology::{RunMode, TopologyInner};
use crate::work_item::{self, WorkItem};
use crate::Future;
use std::sync::Arc;
use std::time::Duration;
use taskflow_executor::Pool;
use taskflow_logging::Registry;

/// Builder for an [`Executor`], analogous to the teacher's `Configuration` enum
/// (`executor/src/initialize.rs`): either an explicit worker count or the host's available
/// parallelism, plus a thread-name prefix that shows up in panics and `log` output.
pub struct ExecutorConfig {
    workers: usize,
    name_prefix: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        ExecutorConfig { workers, name_prefix: "taskflow-".to_string() }
    }
}

impl ExecutorConfig {
    /// Starts from an explicit worker count (`width == 0` is not allowed; see [`Pool::new`]).
    pub fn with_workers(workers: usize) -> Self {
        ExecutorConfig { workers, ..Default::default() }
    }

    /// Overrides the worker thread name prefix used for diagnostics.
    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn build(self) -> Executor {
        Executor::with_config(self)
    }
}

/// A fixed pool of `W` worker threads that runs [`Taskflow`]s and free-standing closures.
pub struct Executor {
    pool: Arc<Pool<WorkItem>>,
    logging: Arc<Registry>,
}

impl Executor {
    /// Shorthand for `ExecutorConfig::with_workers(workers).build()`.
    pub fn new(workers: usize) -> Self {
        ExecutorConfig::with_workers(workers).build()
    }

    fn with_config(config: ExecutorConfig) -> Self {
        log::debug!("starting taskflow executor with {} workers", config.workers);
        Executor {
            pool: Arc::new(Pool::new(config.workers, &config.name_prefix)),
            logging: Arc::new(Registry::new(std::time::Instant::now())),
        }
    }

    /// The number of worker threads in this pool.
    pub fn width(&self) -> usize {
        self.pool.width()
    }

    /// `0..width` if called from one of this executor's own workers, `None` otherwise,
    /// including when called from a worker belonging to a *different* executor.
    pub fn this_worker_id(&self) -> Option<usize> {
        self.pool.this_worker_id()
    }

    /// Submits `graph` for one iteration.
    pub fn run(&self, graph: &Taskflow) -> Future<()> {
        self.submit(graph, RunMode::Count(1), None)
    }

    /// Like [`Executor::run`], invoking `epilogue` once after the iteration completes and before
    /// the returned future is fulfilled.
    pub fn run_with_epilogue(&self, graph: &Taskflow, epilogue: impl FnOnce() + Send + 'static) -> Future<()> {
        self.submit(graph, RunMode::Count(1), Some(Box::new(epilogue)))
    }

    /// Submits `graph` for `n` iterations.
    pub fn run_n(&self, graph: &Taskflow, n: usize) -> Future<()> {
        self.submit(graph, RunMode::Count(n), None)
    }

    /// Like [`Executor::run_n`], with a completion epilogue.
    pub fn run_n_with_epilogue(
        &self,
        graph: &Taskflow,
        n: usize,
        epilogue: impl FnOnce() + Send + 'static,
    ) -> Future<()> {
        self.submit(graph, RunMode::Count(n), Some(Box::new(epilogue)))
    }

    /// Submits `graph` for as many iterations as it takes for `predicate` to return `true`,
    /// tested once each iteration completes.
    pub fn run_until(&self, graph: &Taskflow, predicate: impl Fn() -> bool + Send + Sync + 'static) -> Future<()> {
        self.submit(graph, RunMode::Predicate(Box::new(predicate)), None)
    }

    /// Like [`Executor::run_until`], with a completion epilogue.
    pub fn run_until_with_epilogue(
        &self,
        graph: &Taskflow,
        predicate: impl Fn() -> bool + Send + Sync + 'static,
        epilogue: impl FnOnce() + Send + 'static,
    ) -> Future<()> {
        self.submit(graph, RunMode::Predicate(Box::new(predicate)), Some(Box::new(epilogue)))
    }

    fn submit(&self, graph: &Taskflow, mode: RunMode, epilogue: Option<Box<dyn FnOnce() + Send>>) -> Future<()> {
        graph.inner.mark_activated();
        let observer = self.active_observer();
        let topology = TopologyInner::new(graph.inner.clone(), self.pool.clone(), mode, epilogue, observer);
        let future = Future::new(topology.future_handle());
        topology.kickoff();
        future
    }

    /// Enqueues `f` on the pool; the returned future carries its return value (or the error if it
    /// panicked).
    pub fn spawn<F, T>(&self, f: F) -> Future<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let state = SharedState::pending();
        self.pool.submit(work_item::async_job(f, state.clone()));
        Future::new(state)
    }

    /// Enqueues `f` on the pool without tracking completion or its result.
    pub fn spawn_silent<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.submit(work_item::silent_async_job(f));
    }

    /// Blocks until every submitted topology and every spawned closure, including everything
    /// they transitively enqueued, has run to completion.
    pub fn wait_for_all(&self) {
        self.pool.wait_for_idle();
    }

    /// Installs (or replaces) the node-execution event observer: `action` receives batches of
    /// `(worker, node, kind, phase)` events as they accumulate. Returns the previously installed
    /// observer, if any.
    pub fn make_observer<F>(&self, action: F) -> Option<Observer>
    where
        F: Fn(&Duration, &[(Duration, ObserverEvent)]) + Send + Sync + 'static,
    {
        self.logging.insert("node-execution", action)
    }

    fn active_observer(&self) -> Option<Observer> {
        self.logging.get::<ObserverEvent>("node-execution")
    }

    /// Flushes the installed observer's buffered-but-undelivered events through its action.
    /// `Logger::log` only flushes automatically once its buffer fills, so a caller that needs the
    /// observer's count to exactly match "node executions since the last `clear()`" (rather than
    /// rounded down to a multiple of the buffer capacity) must call this once the work it cares
    /// about has quiesced (e.g. after `wait_for_all`).
    pub fn flush_observer(&self) {
        if let Some(observer) = self.active_observer() {
            observer.flush();
        }
    }
}

impl Drop for Executor {
    /// Drains every outstanding topology and spawned closure before the worker threads are asked
    /// to shut down and joined (`Pool::drop`), matching the teacher's `WorkerGuards` destructor.
    fn drop(&mut self) {
        self.pool.wait_for_idle();
    }
}
