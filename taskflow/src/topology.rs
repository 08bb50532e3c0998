//! The scheduler: one live execution (possibly many iterations) of a graph.
//!
//! This is the core protocol of §4.2 of the design: per-iteration join counters live here, not on
//! the `Node`, so the same `Taskflow` can be run concurrently without interference
//! (`taskflow/src/worker.rs::step_or_park`'s activate → schedule → release loop informs the
//! dispatch-by-kind shape below, generalized from "one dataflow operator" to "one of four task
//! kinds"). A `TopologyInner` is also reused, unparameterized by how it was created, as the
//! engine behind a joined subflow, a detached subflow, and a MODULE's inner graph: all three are
//! just "run this graph once (or detached, n times) and tell someone when it's done."

use crate::future::SharedState;
use crate::graph::{GraphInner, TaskBody};
use crate::observer::{Observer, ObserverEvent, Phase};
use crate::semaphore::acquire_all;
use crate::subflow::Subflow;
use crate::work_item::WorkItem;
use crate::TaskflowError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use taskflow_executor::{Pool, WorkerContext};

/// How a topology decides whether it has more iterations to run.
pub(crate) enum RunMode {
    /// Counts down; the topology stops once this reaches zero.
    Count(usize),
    /// Re-evaluated after every iteration completes; stops the first time it returns `true`.
    Predicate(Box<dyn Fn() -> bool + Send + Sync>),
}

impl RunMode {
    /// Accounts for the iteration that just finished, returning whether this was the last one.
    fn advance(&mut self) -> bool {
        match self {
            RunMode::Count(remaining) => {
                *remaining -= 1;
                *remaining == 0
            }
            RunMode::Predicate(pred) => pred(),
        }
    }
}

pub(crate) struct TopologyInner {
    graph: Arc<GraphInner>,
    pool: Arc<Pool<WorkItem>>,
    node_count: usize,
    base_counters: Vec<usize>,
    sources: Vec<usize>,
    join_counters: Vec<AtomicUsize>,
    /// Count of activations pushed but not yet completed in the current iteration. Incremented
    /// at every push site (source kickoff, a strong join reaching zero, a condition's direct
    /// successor push) and decremented when that activation's body finishes; the iteration is
    /// over exactly when this returns to zero. Not simply "`node_count` counting down to zero",
    /// a cyclic condition can push the same node many times within one iteration, so the count of
    /// activations can exceed `node_count`.
    pending: AtomicUsize,
    mode: Mutex<RunMode>,
    epilogue: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    future: Arc<SharedState<()>>,
    cancelled: AtomicBool,
    error: Mutex<Option<TaskflowError>>,
    outstanding_detached: AtomicUsize,
    iterations_done: AtomicBool,
    finished: AtomicBool,
    /// Set when this topology is a detached child: on finish, its error (if any) is folded into
    /// the parent's and the parent's `outstanding_detached` count is released.
    parent_link: Option<Arc<TopologyInner>>,
    observer: Option<Observer>,
}

impl TopologyInner {
    pub(crate) fn new(
        graph: Arc<GraphInner>,
        pool: Arc<Pool<WorkItem>>,
        mode: RunMode,
        epilogue: Option<Box<dyn FnOnce() + Send>>,
        observer: Option<Observer>,
    ) -> Arc<Self> {
        let base_counters = graph.init_join_counters();
        let sources = graph.sources();
        let node_count = base_counters.len();
        let join_counters = base_counters.iter().map(|&c| AtomicUsize::new(c)).collect();
        Arc::new(TopologyInner {
            graph,
            pool,
            node_count,
            base_counters,
            sources,
            join_counters,
            pending: AtomicUsize::new(0),
            mode: Mutex::new(mode),
            epilogue: Mutex::new(epilogue),
            future: SharedState::pending(),
            cancelled: AtomicBool::new(false),
            error: Mutex::new(None),
            outstanding_detached: AtomicUsize::new(0),
            iterations_done: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            parent_link: None,
            observer,
        })
    }

    /// A mini-topology for a joined subflow or a MODULE's inner graph: runs its sources once.
    pub(crate) fn new_child(graph: Arc<GraphInner>, pool: Arc<Pool<WorkItem>>, observer: Option<Observer>) -> Arc<Self> {
        Self::new(graph, pool, RunMode::Count(1), None, observer)
    }

    /// A mini-topology adopted by `parent` on detach: runs once, then feeds its outcome back.
    fn new_detached_child(
        graph: Arc<GraphInner>,
        pool: Arc<Pool<WorkItem>>,
        observer: Option<Observer>,
        parent: Arc<TopologyInner>,
    ) -> Arc<Self> {
        let mut inner = Self::new(graph, pool, RunMode::Count(1), None, observer);
        Arc::get_mut(&mut inner).expect("freshly constructed, uniquely owned").parent_link = Some(parent);
        inner
    }

    pub(crate) fn future_handle(&self) -> Arc<SharedState<()>> {
        self.future.clone()
    }

    pub(crate) fn observer_handle(&self) -> Option<Observer> {
        self.observer.clone()
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub(crate) fn record_error(&self, e: TaskflowError) {
        let mut guard = self.error.lock().unwrap();
        if guard.is_none() {
            *guard = Some(e);
        }
    }

    pub(crate) fn error(&self) -> Option<TaskflowError> {
        self.error.lock().unwrap().clone()
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.future.is_ready()
    }

    /// Registers this topology's detached children count with the parent, then starts it.
    pub(crate) fn adopt_detached_child(
        self: &Arc<Self>,
        child_graph: Arc<GraphInner>,
        pool: Arc<Pool<WorkItem>>,
        ctx: &WorkerContext<WorkItem>,
    ) {
        self.outstanding_detached.fetch_add(1, Ordering::AcqRel);
        let child = TopologyInner::new_detached_child(child_graph, pool, self.observer.clone(), self.clone());
        child.kickoff_on(ctx);
    }

    /// Submits from outside a worker (the external-thread path of `Executor::run`).
    pub(crate) fn kickoff(self: &Arc<Self>) {
        self.enqueue_sources(None);
    }

    /// Submits from inside a worker (joined subflow, detached subflow, MODULE inner graph):
    /// pushes onto `ctx`'s own deque so a thief can pick it up rather than contending on the
    /// shared injector.
    pub(crate) fn kickoff_on(self: &Arc<Self>, ctx: &WorkerContext<WorkItem>) {
        self.enqueue_sources(Some(ctx));
    }

    fn enqueue_sources(self: &Arc<Self>, ctx: Option<&WorkerContext<WorkItem>>) {
        if self.node_count == 0 {
            self.iterations_done.store(true, Ordering::Release);
            self.try_finish();
            return;
        }
        for &src in &self.sources {
            self.pending.fetch_add(1, Ordering::AcqRel);
            let item = WorkItem::Activate { topology: self.clone(), node: src };
            match ctx {
                Some(c) => c.push(item),
                None => self.pool.submit(item),
            }
        }
    }

    fn reset_for_next_iteration(&self) {
        for (counter, &base) in self.join_counters.iter().zip(self.base_counters.iter()) {
            counter.store(base, Ordering::Release);
        }
    }

    /// Called when this iteration's pending-node count reaches zero: either starts the next
    /// iteration or finalizes the topology.
    fn complete_or_continue(self: &Arc<Self>, ctx: Option<&WorkerContext<WorkItem>>) {
        let mut mode = self.mode.lock().unwrap();
        let stop = self.cancelled.load(Ordering::Acquire) || mode.advance();
        drop(mode);
        if stop {
            self.iterations_done.store(true, Ordering::Release);
            self.try_finish();
        } else {
            self.reset_for_next_iteration();
            self.enqueue_sources(ctx);
        }
    }

    /// Finalizes the topology if both its own iterations and any detached children it adopted
    /// have finished. Idempotent: only the call that observes both conditions true actually runs
    /// the epilogue and fulfills the future.
    fn try_finish(self: &Arc<Self>) {
        if !self.iterations_done.load(Ordering::Acquire) {
            return;
        }
        if self.outstanding_detached.load(Ordering::Acquire) != 0 {
            return;
        }
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(epilogue) = self.epilogue.lock().unwrap().take() {
            epilogue();
        }
        let err = self.error();
        self.future.fulfill(match err.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        });
        if let Some(parent) = &self.parent_link {
            if let Some(e) = err {
                parent.record_error(e);
            }
            parent.outstanding_detached.fetch_sub(1, Ordering::AcqRel);
            parent.try_finish();
        }
    }
}

/// Blocks the calling worker until `topology`'s future is ready, picking up any other pending
/// work it finds in the meantime rather than idling, the mechanism that keeps a synchronous
/// subflow join or MODULE invocation deadlock-free even when the executor has a single worker.
pub(crate) fn wait_cooperatively(ctx: &WorkerContext<WorkItem>, topology: &Arc<TopologyInner>) {
    while !topology.is_ready() {
        if !ctx.help_once() {
            std::thread::yield_now();
        }
    }
}

enum Chosen {
    All,
    One(usize),
    None,
}

/// A node has become runnable: acquires any semaphores it needs before running its body.
pub(crate) fn activate(ctx: &WorkerContext<WorkItem>, topology: &Arc<TopologyInner>, node: usize) {
    let acquires = topology.graph.acquire_list(node);
    if acquires.is_empty() {
        run_body(ctx, topology, node);
        return;
    }
    let topo = topology.clone();
    let pool = topology.pool.clone();
    acquire_all(
        Arc::new(acquires),
        0,
        Box::new(move || pool.submit(WorkItem::RunBody { topology: topo, node })),
    );
}

/// Runs one node's body, dispatching by kind, then releases successors and semaphores.
pub(crate) fn run_body(ctx: &WorkerContext<WorkItem>, topology: &Arc<TopologyInner>, node: usize) {
    let snapshot = topology.graph.node_snapshot(node);
    let kind = snapshot.body.kind();
    if let Some(obs) = &topology.observer {
        obs.log(ObserverEvent { worker: ctx.id(), node, kind, phase: Phase::Entry });
    }

    let chosen = match &snapshot.body {
        TaskBody::Empty => Chosen::All,
        TaskBody::Static(f) => {
            if let Err(e) = crate::error::catch_unwind(|| f()) {
                topology.record_error(e);
            }
            Chosen::All
        }
        TaskBody::Condition(f) => match crate::error::catch_unwind(|| f()) {
            Ok(r) if r >= 0 && (r as usize) < snapshot.successors.len() => Chosen::One(r as usize),
            Ok(_) => Chosen::None,
            Err(e) => {
                topology.record_error(e);
                Chosen::None
            }
        },
        TaskBody::Dynamic(f) => {
            let mut subflow = Subflow::new(topology.clone(), topology.pool.clone(), ctx);
            match crate::error::catch_unwind(|| f(&mut subflow)) {
                Ok(()) => {
                    if subflow.joinable() {
                        subflow.join_now();
                    }
                    if let Some(e) = subflow.take_error() {
                        topology.record_error(e);
                    }
                }
                Err(e) => topology.record_error(e),
            }
            Chosen::All
        }
        TaskBody::Module(inner) => {
            let mini = TopologyInner::new_child(inner.clone(), topology.pool.clone(), topology.observer_handle());
            mini.kickoff_on(ctx);
            wait_cooperatively(ctx, &mini);
            if let Some(e) = mini.error() {
                topology.record_error(e);
            }
            Chosen::All
        }
    };

    for sem in snapshot.release.iter().rev() {
        sem.release();
    }

    match chosen {
        Chosen::All => {
            for &succ in &snapshot.successors {
                release_successor(ctx, topology, succ);
            }
        }
        // A condition's chosen successor is reached over a weak edge: push it directly,
        // independent of its join counter, which only tracks strong predecessors and which this
        // successor may never see reach zero (e.g. a node whose only predecessors are
        // conditions). Routing this through `release_successor`'s decrement would both be wrong
        // (the successor's counter was never incremented for this edge) and, if its strong
        // in-degree is zero, underflow the counter.
        Chosen::One(i) => push_direct(ctx, topology, snapshot.successors[i]),
        Chosen::None => {}
    }

    if let Some(obs) = &topology.observer {
        obs.log(ObserverEvent { worker: ctx.id(), node, kind, phase: Phase::Exit });
    }

    if topology.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
        topology.complete_or_continue(Some(ctx));
    }
}

/// Releases a strong edge into `node`: decrements its join counter, pushing it once the last
/// strong predecessor has fired.
fn release_successor(ctx: &WorkerContext<WorkItem>, topology: &Arc<TopologyInner>, node: usize) {
    if topology.join_counters[node].fetch_sub(1, Ordering::AcqRel) == 1 {
        push_direct(ctx, topology, node);
    }
}

/// Pushes `node` unconditionally: used for a strong join reaching zero and for a condition's
/// direct (weak-edge) successor push alike. Every push increments `pending` first so the
/// iteration-completion check never observes a false zero while this activation is in flight.
fn push_direct(ctx: &WorkerContext<WorkItem>, topology: &Arc<TopologyInner>, node: usize) {
    topology.pending.fetch_add(1, Ordering::AcqRel);
    ctx.push(WorkItem::Activate { topology: topology.clone(), node });
}
