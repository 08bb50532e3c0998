//! A fixed-width work-stealing thread pool, generic over the unit of work it runs.
//!
//! This is the one piece of the teacher's worker-thread machinery that survives the transform
//! unchanged in spirit: a fixed number of OS threads, spawned once and joined on shutdown
//! (`executor/src/initialize.rs`'s `thread::Builder::spawn` + `WorkerGuards` pattern), each
//! looping between its own work and stealing from its neighbors
//! (`taskflow/src/worker.rs::step_or_park`). What used to be a per-thread dataflow `Wrapper` is
//! now a generic `Job`, so this crate has no notion of graphs, nodes, or tasks at all; the
//! `taskflow` crate supplies the job type (its `WorkItem` enum) and this crate only knows how to
//! run one to completion.

use crate::buzzer::Notifier;
use crossbeam_deque::{Injector, Steal, Stealer, Worker as Deque};
use rand::seq::SliceRandom;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// A unit of schedulable work executed by exactly one worker thread.
///
/// `run` receives a [`WorkerContext`] so a job can enqueue further work (a node's successors, a
/// nested async closure) onto the same pool without leaving the worker thread that produced it.
pub trait Job: Send + 'static {
    fn run(self, worker: &WorkerContext<Self>)
    where
        Self: Sized;
}

thread_local! {
    static CURRENT: Cell<Option<(usize, usize)>> = const { Cell::new(None) };
}

struct Shared<J: Job> {
    injector: Injector<J>,
    stealers: Vec<Stealer<J>>,
    notifier: Notifier,
    shutdown: AtomicBool,
    outstanding: AtomicUsize,
    idle: (Mutex<()>, Condvar),
    pool_id: usize,
}

/// A fixed-width pool of worker threads sharing one work-stealing arena.
pub struct Pool<J: Job> {
    shared: Arc<Shared<J>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

/// The view a running job has of the worker executing it.
pub struct WorkerContext<J: Job> {
    id: usize,
    local: Deque<J>,
    shared: Arc<Shared<J>>,
}

impl<J: Job> WorkerContext<J> {
    /// The index of the worker running this job, in `0..width`.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Enqueues more work onto this worker's own deque.
    ///
    /// Preferred over [`Pool::submit`] from inside a job: it keeps newly spawned work local
    /// (cache-friendly) and lets other idle workers steal it from this worker's far end rather
    /// than contending on the shared injector.
    pub fn push(&self, item: J) {
        self.shared.outstanding.fetch_add(1, Ordering::AcqRel);
        self.local.push(item);
        self.shared.notifier.notify_one();
    }

    /// Finds and runs one pending job (this worker's own, stolen, or from the injector) if any is
    /// immediately available, returning whether it found one.
    ///
    /// Lets a job that is blocked waiting on other work (a synchronous subflow join, a module
    /// invocation) make progress on its own worker instead of parking it outright, which is what
    /// keeps those waits deadlock-free at `width == 1`.
    pub fn help_once(&self) -> bool {
        match find_job(&self.local, &self.shared) {
            Some(job) => {
                job.run(self);
                if self.shared.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let (lock, cvar) = &self.shared.idle;
                    let _guard = lock.lock().unwrap();
                    cvar.notify_all();
                }
                true
            }
            None => false,
        }
    }
}

fn find_job<J: Job>(local: &Deque<J>, shared: &Shared<J>) -> Option<J> {
    if let Some(job) = local.pop() {
        return Some(job);
    }
    loop {
        match shared.injector.steal_batch_and_pop(local) {
            Steal::Success(job) => return Some(job),
            Steal::Empty => break,
            Steal::Retry => continue,
        }
    }
    let mut order: Vec<usize> = (0..shared.stealers.len()).collect();
    order.shuffle(&mut rand::thread_rng());
    for victim in order {
        loop {
            match shared.stealers[victim].steal_batch_and_pop(local) {
                Steal::Success(job) => return Some(job),
                Steal::Empty => break,
                Steal::Retry => continue,
            }
        }
    }
    None
}

fn drain_and_run<J: Job>(id: usize, local: Deque<J>, shared: Arc<Shared<J>>) {
    CURRENT.with(|cell| cell.set(Some((shared.pool_id, id))));
    shared.notifier.register();
    let ctx = WorkerContext { id, local, shared };
    loop {
        match find_job(&ctx.local, &ctx.shared) {
            Some(job) => {
                job.run(&ctx);
                if ctx.shared.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let (lock, cvar) = &ctx.shared.idle;
                    let _guard = lock.lock().unwrap();
                    cvar.notify_all();
                }
            }
            None => {
                if ctx.shared.shutdown.load(Ordering::Acquire) {
                    return;
                }
                ctx.shared.notifier.park();
            }
        }
    }
}

static NEXT_POOL_ID: AtomicUsize = AtomicUsize::new(0);

impl<J: Job> Pool<J> {
    /// Spawns `width` worker threads, each named `"{name_prefix}{index}"`.
    pub fn new(width: usize, name_prefix: &str) -> Self {
        assert!(width > 0, "a pool must have at least one worker");
        let pool_id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let deques: Vec<Deque<J>> = (0..width).map(|_| Deque::new_lifo()).collect();
        let stealers: Vec<Stealer<J>> = deques.iter().map(Deque::stealer).collect();
        let shared = Arc::new(Shared {
            injector: Injector::new(),
            stealers,
            notifier: Notifier::new(width),
            shutdown: AtomicBool::new(false),
            outstanding: AtomicUsize::new(0),
            idle: (Mutex::new(()), Condvar::new()),
            pool_id,
        });

        let threads = deques
            .into_iter()
            .enumerate()
            .map(|(id, local)| {
                let shared = shared.clone();
                std::thread::Builder::new()
                    .name(format!("{name_prefix}{id}"))
                    .spawn(move || drain_and_run(id, local, shared))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Pool { shared, threads: Mutex::new(threads) }
    }

    /// The number of worker threads in this pool.
    pub fn width(&self) -> usize {
        self.shared.stealers.len()
    }

    /// Submits `item` from outside the pool (or from a worker of a *different* pool) via the
    /// shared injector queue.
    pub fn submit(&self, item: J) {
        self.shared.outstanding.fetch_add(1, Ordering::AcqRel);
        self.shared.injector.push(item);
        self.shared.notifier.notify_one();
    }

    /// Returns `Some(id)` if the calling thread is one of this pool's own workers.
    pub fn this_worker_id(&self) -> Option<usize> {
        CURRENT.with(|cell| cell.get()).and_then(
            |(pool_id, id)| if pool_id == self.shared.pool_id { Some(id) } else { None },
        )
    }

    /// Blocks until every submitted job, and every job transitively pushed by them, has run to
    /// completion. Used by `Executor::wait_for_all`.
    pub fn wait_for_idle(&self) {
        let (lock, cvar) = &self.shared.idle;
        let mut guard = lock.lock().unwrap();
        while self.shared.outstanding.load(Ordering::Acquire) != 0 {
            guard = cvar.wait(guard).unwrap();
        }
        drop(guard);
    }
}

impl<J: Job> Drop for Pool<J> {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.notifier.notify_all();
        for handle in self.threads.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Increment(Arc<AtomicUsize>);

    impl Job for Increment {
        fn run(self, _ctx: &WorkerContext<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn submit_runs_on_some_worker() {
        let pool: Pool<Increment> = Pool::new(4, "pool-test-");
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..200 {
            pool.submit(Increment(count.clone()));
        }
        pool.wait_for_idle();
        assert_eq!(count.load(Ordering::SeqCst), 200);
    }

    struct Spawning {
        counter: Arc<AtomicUsize>,
        remaining: usize,
    }

    impl Job for Spawning {
        fn run(self, ctx: &WorkerContext<Self>) {
            self.counter.fetch_add(1, Ordering::SeqCst);
            if self.remaining > 0 {
                ctx.push(Spawning { counter: self.counter.clone(), remaining: self.remaining - 1 });
            }
        }
    }

    #[test]
    fn wait_for_idle_drains_chained_pushes() {
        let pool: Pool<Spawning> = Pool::new(2, "pool-test-");
        let count = Arc::new(AtomicUsize::new(0));
        pool.submit(Spawning { counter: count.clone(), remaining: 50 });
        pool.wait_for_idle();
        assert_eq!(count.load(Ordering::SeqCst), 51);
    }

    #[test]
    fn this_worker_id_is_none_outside_the_pool() {
        let pool: Pool<Increment> = Pool::new(2, "pool-test-");
        assert_eq!(pool.this_worker_id(), None);
    }

    #[test]
    fn width_matches_construction() {
        let pool: Pool<Increment> = Pool::new(3, "pool-test-");
        assert_eq!(pool.width(), 3);
    }
}
