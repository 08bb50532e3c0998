//! The graph data model: nodes, edges, and the `Taskflow`/`Task` handles built on top of them.
//!
//! Nodes live in an arena (`Vec<Node>` behind a lock) keyed by plain index rather than by pointer,
//! so a `Task` handle stays valid for the life of its graph regardless of how the graph itself is
//! moved or shared, the arena pattern the teacher uses for its per-worker dataflow table
//! (`worker.rs`'s `HashMap<usize, Wrapper>`), specialized here to a `Vec` since node indices are
//! dense and assigned at `emplace` time.

use crate::semaphore::Semaphore;
use crate::subflow::Subflow;
use crate::{TaskflowError, TaskKind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Clone)]
pub(crate) enum TaskBody {
    Empty,
    Static(Arc<dyn Fn() + Send + Sync>),
    Dynamic(Arc<dyn for<'s> Fn(&mut Subflow<'s>) + Send + Sync>),
    Condition(Arc<dyn Fn() -> i32 + Send + Sync>),
    Module(Arc<GraphInner>),
}

impl TaskBody {
    pub(crate) fn kind(&self) -> TaskKind {
        match self {
            TaskBody::Empty => TaskKind::Placeholder,
            TaskBody::Static(_) => TaskKind::Static,
            TaskBody::Dynamic(_) => TaskKind::Dynamic,
            TaskBody::Condition(_) => TaskKind::Condition,
            TaskBody::Module(_) => TaskKind::Module,
        }
    }
}

pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) body: TaskBody,
    pub(crate) successors: Vec<usize>,
    pub(crate) dependents: Vec<usize>,
    pub(crate) acquire: Vec<Arc<Semaphore>>,
    pub(crate) release: Vec<Arc<Semaphore>>,
}

impl Node {
    fn new(name: String, body: TaskBody) -> Self {
        Node { name, body, successors: Vec::new(), dependents: Vec::new(), acquire: Vec::new(), release: Vec::new() }
    }
}

/// A snapshot of the parts of a node needed to dispatch one execution, taken under the node
/// lock and then released before any user code runs.
pub(crate) struct NodeSnapshot {
    pub(crate) body: TaskBody,
    pub(crate) successors: Vec<usize>,
    pub(crate) acquire: Vec<Arc<Semaphore>>,
    pub(crate) release: Vec<Arc<Semaphore>>,
}

pub(crate) struct GraphInner {
    pub(crate) id: u64,
    name: Mutex<String>,
    nodes: Mutex<Vec<Node>>,
    activated: AtomicBool,
}

impl GraphInner {
    fn new() -> Arc<Self> {
        Arc::new(GraphInner {
            id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            name: Mutex::new(String::new()),
            nodes: Mutex::new(Vec::new()),
            activated: AtomicBool::new(false),
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.lock().unwrap().len()
    }

    pub(crate) fn mark_activated(&self) {
        self.activated.store(true, Ordering::Release);
    }

    fn push_node(self: &Arc<Self>, name: String, body: TaskBody) -> usize {
        let mut nodes = self.nodes.lock().unwrap();
        let index = nodes.len();
        nodes.push(Node::new(name, body));
        index
    }

    fn set_body(&self, index: usize, body: TaskBody) -> Result<(), TaskflowError> {
        let mut nodes = self.nodes.lock().unwrap();
        let node = &mut nodes[index];
        if self.activated.load(Ordering::Acquire) && !matches!(node.body, TaskBody::Empty) {
            return Err(TaskflowError::KindAlreadyActivated);
        }
        node.body = body;
        Ok(())
    }

    fn add_edge(&self, from: usize, to: usize) {
        let mut nodes = self.nodes.lock().unwrap();
        nodes[from].successors.push(to);
        nodes[to].dependents.push(from);
    }

    /// Per-node initial join-counter values for a fresh iteration: the count of predecessors whose
    /// current kind is not CONDITION (strong edges only, see the scheduler's weak-edge rationale).
    pub(crate) fn init_join_counters(&self) -> Vec<usize> {
        let nodes = self.nodes.lock().unwrap();
        nodes
            .iter()
            .map(|node| {
                node.dependents
                    .iter()
                    .filter(|&&pred| !matches!(nodes[pred].body, TaskBody::Condition(_)))
                    .count()
            })
            .collect()
    }

    /// Indices of nodes with no inbound edges at all (neither strong nor weak): the nodes
    /// unconditionally (re-)enqueued at the start of every iteration.
    ///
    /// A node with zero *strong* dependents but at least one weak (condition) one is NOT a
    /// source: it only ever runs when a condition predecessor directly selects it (see
    /// `topology::run_body`'s weak-edge dispatch), never as part of iteration kickoff. This is
    /// narrower than the prose description of "strong_dependents == 0" might suggest; it matches
    /// the original engine's actual behavior (`LoopCond` in its unit tests has a node reachable
    /// only through a condition's weak edge, and that node must not run before the condition ever
    /// selects it; making it an unconditional per-iteration source would fire it prematurely).
    pub(crate) fn sources(&self) -> Vec<usize> {
        let nodes = self.nodes.lock().unwrap();
        (0..nodes.len()).filter(|&i| nodes[i].dependents.is_empty()).collect()
    }

    pub(crate) fn node_snapshot(&self, index: usize) -> NodeSnapshot {
        let nodes = self.nodes.lock().unwrap();
        let node = &nodes[index];
        NodeSnapshot {
            body: node.body.clone(),
            successors: node.successors.clone(),
            acquire: node.acquire.clone(),
            release: node.release.clone(),
        }
    }

    pub(crate) fn num_successors(&self, index: usize) -> usize {
        self.nodes.lock().unwrap()[index].successors.len()
    }

    /// The semaphores this node must acquire before its body runs, in order.
    pub(crate) fn acquire_list(&self, index: usize) -> Vec<Arc<Semaphore>> {
        self.nodes.lock().unwrap()[index].acquire.clone()
    }

    pub(crate) fn num_strong_dependents(&self, index: usize) -> usize {
        let nodes = self.nodes.lock().unwrap();
        nodes[index]
            .dependents
            .iter()
            .filter(|&&pred| !matches!(nodes[pred].body, TaskBody::Condition(_)))
            .count()
    }

    pub(crate) fn num_weak_dependents(&self, index: usize) -> usize {
        let nodes = self.nodes.lock().unwrap();
        nodes[index]
            .dependents
            .iter()
            .filter(|&&pred| matches!(nodes[pred].body, TaskBody::Condition(_)))
            .count()
    }
}

/// A mutable container of tasks and the dependencies between them.
///
/// Cloning a `Taskflow` clones the handle, not the graph: clones share identity, just like the
/// teacher's dataflow handles share the underlying scope.
#[derive(Clone)]
pub struct Taskflow {
    pub(crate) inner: Arc<GraphInner>,
}

impl Default for Taskflow {
    fn default() -> Self {
        Self::new()
    }
}

impl Taskflow {
    pub fn new() -> Self {
        Taskflow { inner: GraphInner::new() }
    }

    pub fn named(name: impl Into<String>) -> Self {
        let flow = Self::new();
        *flow.inner.name.lock().unwrap() = name.into();
        flow
    }

    /// Creates a STATIC task: a plain `fn() -> ()`.
    pub fn emplace(&self, f: impl Fn() + Send + Sync + 'static) -> Task {
        self.emplace_named(String::new(), TaskBody::Static(Arc::new(f)))
    }

    /// Creates several STATIC tasks at once, substituting for the original's variadic `emplace`
    /// (Rust has no overload resolution over distinct callable shapes, so kind-specific
    /// constructors stand in for it, see this module's rustdoc).
    pub fn emplace_many<F>(&self, bodies: impl IntoIterator<Item = F>) -> Vec<Task>
    where
        F: Fn() + Send + Sync + 'static,
    {
        bodies.into_iter().map(|f| self.emplace(f)).collect()
    }

    /// Creates a CONDITION task: returns the index of the successor to release.
    pub fn emplace_condition(&self, f: impl Fn() -> i32 + Send + Sync + 'static) -> Task {
        self.emplace_named(String::new(), TaskBody::Condition(Arc::new(f)))
    }

    /// Creates a DYNAMIC task: receives a `Subflow` it may grow before joining or detaching.
    pub fn emplace_dynamic(&self, f: impl for<'s> Fn(&mut Subflow<'s>) + Send + Sync + 'static) -> Task {
        self.emplace_named(String::new(), TaskBody::Dynamic(Arc::new(f)))
    }

    /// Creates a node with no body yet; set one later with `Task::work`/`work_condition`/`work_dynamic`.
    pub fn placeholder(&self) -> Task {
        self.emplace_named(String::new(), TaskBody::Empty)
    }

    /// Creates a MODULE task referencing another graph. Rejects composing a graph with itself.
    pub fn composed_of(&self, other: &Taskflow) -> Result<Task, TaskflowError> {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return Err(TaskflowError::SelfComposition);
        }
        Ok(self.emplace_named(String::new(), TaskBody::Module(other.inner.clone())))
    }

    /// Chains tasks in the order given: `tasks[0].precede(tasks[1])`, etc.
    pub fn linearize(&self, tasks: &[Task]) {
        for pair in tasks.windows(2) {
            pair[0].precede(&pair[1]);
        }
    }

    pub fn num_tasks(&self) -> usize {
        self.inner.len()
    }

    pub fn empty(&self) -> bool {
        self.num_tasks() == 0
    }

    pub fn clear(&self) {
        self.inner.nodes.lock().unwrap().clear();
        self.inner.activated.store(false, Ordering::Release);
    }

    fn emplace_named(&self, name: String, body: TaskBody) -> Task {
        let index = self.inner.push_node(name, body);
        Task { graph: self.inner.clone(), index }
    }
}

/// A handle to one node of a [`Taskflow`].
#[derive(Clone)]
pub struct Task {
    pub(crate) graph: Arc<GraphInner>,
    pub(crate) index: usize,
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.graph, &other.graph) && self.index == other.index
    }
}
impl Eq for Task {}

impl std::hash::Hash for Task {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.graph.id.hash(state);
        self.index.hash(state);
    }
}

impl Task {
    pub fn name(&self) -> String {
        self.graph.nodes.lock().unwrap()[self.index].name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) -> &Self {
        self.graph.nodes.lock().unwrap()[self.index].name = name.into();
        self
    }

    pub fn kind(&self) -> TaskKind {
        self.graph.nodes.lock().unwrap()[self.index].body.kind()
    }

    pub fn precede(&self, successor: &Task) -> &Self {
        assert!(Arc::ptr_eq(&self.graph, &successor.graph), "tasks belong to different graphs");
        self.graph.add_edge(self.index, successor.index);
        self
    }

    pub fn succeed(&self, predecessor: &Task) -> &Self {
        predecessor.precede(self);
        self
    }

    pub fn num_successors(&self) -> usize {
        self.graph.num_successors(self.index)
    }

    pub fn num_dependents(&self) -> usize {
        self.num_strong_dependents() + self.num_weak_dependents()
    }

    pub fn num_strong_dependents(&self) -> usize {
        self.graph.num_strong_dependents(self.index)
    }

    pub fn num_weak_dependents(&self) -> usize {
        self.graph.num_weak_dependents(self.index)
    }

    pub fn for_each_successor(&self, mut f: impl FnMut(usize)) {
        let snapshot = self.graph.node_snapshot(self.index);
        for s in snapshot.successors {
            f(s);
        }
    }

    pub fn for_each_dependent(&self, mut f: impl FnMut(usize)) {
        let nodes = self.graph.nodes.lock().unwrap();
        for &d in &nodes[self.index].dependents {
            f(d);
        }
    }

    pub fn work(&self, f: impl Fn() + Send + Sync + 'static) -> Result<(), TaskflowError> {
        self.graph.set_body(self.index, TaskBody::Static(Arc::new(f)))
    }

    pub fn work_condition(&self, f: impl Fn() -> i32 + Send + Sync + 'static) -> Result<(), TaskflowError> {
        self.graph.set_body(self.index, TaskBody::Condition(Arc::new(f)))
    }

    pub fn work_dynamic(
        &self,
        f: impl for<'s> Fn(&mut Subflow<'s>) + Send + Sync + 'static,
    ) -> Result<(), TaskflowError> {
        self.graph.set_body(self.index, TaskBody::Dynamic(Arc::new(f)))
    }

    /// Appends `sem` to this node's acquire list (acquired, in order, before the body runs).
    pub fn acquire(&self, sem: Arc<Semaphore>) -> &Self {
        self.graph.nodes.lock().unwrap()[self.index].acquire.push(sem);
        self
    }

    /// Appends `sem` to this node's release list (released, in reverse order, after the body runs).
    pub fn release(&self, sem: Arc<Semaphore>) -> &Self {
        self.graph.nodes.lock().unwrap()[self.index].release.push(sem);
        self
    }
}
