//! Counting semaphore and critical-section sugar, used for admission control on node execution.
//!
//! Acquisition never blocks a worker thread: a node that cannot acquire immediately is registered
//! as a waiter and the worker goes back to stealing. `release` hands the freed permit straight to
//! the head of the FIFO waiter list rather than incrementing-then-letting-it-race, so the crate's
//! `available + outstanding == capacity` invariant holds at every instant, not just at quiescence.

use crate::TaskflowError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

struct State {
    available: usize,
    waiters: VecDeque<Box<dyn FnOnce() + Send>>,
}

pub struct Semaphore {
    capacity: usize,
    state: Mutex<State>,
}

impl Semaphore {
    pub fn new(capacity: usize) -> Result<Self, TaskflowError> {
        if capacity == 0 {
            return Err(TaskflowError::InvalidCapacity);
        }
        Ok(Semaphore { capacity, state: Mutex::new(State { available: capacity, waiters: VecDeque::new() }) })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of permits currently available (not the number of waiters).
    pub fn count(&self) -> usize {
        self.state.lock().unwrap().available
    }

    /// Attempts to take one permit immediately, without registering a waiter on failure.
    pub(crate) fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.available > 0 {
            state.available -= 1;
            true
        } else {
            false
        }
    }

    /// Registers `on_ready` to run (exactly once, possibly on a different thread and later in
    /// time) the moment a permit becomes available for it. Re-checks availability under the lock
    /// first so a permit freed between a failed `try_acquire` and this call isn't lost.
    pub(crate) fn register_waiter(&self, on_ready: Box<dyn FnOnce() + Send>) {
        let mut state = self.state.lock().unwrap();
        if state.available > 0 {
            state.available -= 1;
            drop(state);
            on_ready();
        } else {
            state.waiters.push_back(on_ready);
        }
    }

    pub(crate) fn release(&self) {
        let mut state = self.state.lock().unwrap();
        match state.waiters.pop_front() {
            Some(waiter) => {
                drop(state);
                waiter();
            }
            None => state.available += 1,
        }
    }
}

/// A `Semaphore` of capacity 1, with `add` sugar for wiring a task's acquire/release lists.
pub struct CriticalSection {
    sem: Arc<Semaphore>,
}

impl CriticalSection {
    pub fn new() -> Self {
        CriticalSection { sem: Arc::new(Semaphore::new(1).expect("capacity 1 is always valid")) }
    }

    /// Marks `task` to acquire this section before running and release it afterward.
    pub fn add(&self, task: &crate::graph::Task) -> &Self {
        task.acquire(self.sem.clone());
        task.release(self.sem.clone());
        self
    }

    pub fn semaphore(&self) -> Arc<Semaphore> {
        self.sem.clone()
    }
}

impl Default for CriticalSection {
    fn default() -> Self {
        Self::new()
    }
}

/// Acquires every semaphore in `sems`, in order, invoking `then` once all have been granted.
/// Non-blocking: falls back to a registered waiter per semaphore rather than parking the caller.
pub(crate) fn acquire_all(sems: Arc<Vec<Arc<Semaphore>>>, idx: usize, then: Box<dyn FnOnce() + Send>) {
    if idx == sems.len() {
        then();
        return;
    }
    if sems[idx].try_acquire() {
        acquire_all(sems, idx + 1, then);
    } else {
        let sems2 = sems.clone();
        sems[idx].register_waiter(Box::new(move || acquire_all(sems2, idx + 1, then)));
    }
}
