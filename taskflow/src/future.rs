//! The future returned by `run`/`run_n`/`run_until`/`async`.
//!
//! Generalizes the teacher's `WorkerGuards<T>` (one `Result<T, String>` joined per OS thread) from
//! "one value per thread" to "one value per scheduled unit of work", backed by the same
//! `Mutex`+`Condvar` pairing rather than an async runtime (the teacher depends on neither `tokio`
//! nor `futures`, and this crate follows suit).

use crate::TaskflowError;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

pub(crate) struct SharedState<T> {
    state: Mutex<Option<Result<T, TaskflowError>>>,
    cvar: Condvar,
}

impl<T> SharedState<T> {
    pub(crate) fn pending() -> Arc<Self> {
        Arc::new(SharedState { state: Mutex::new(None), cvar: Condvar::new() })
    }

    pub(crate) fn fulfill(self: &Arc<Self>, value: Result<T, TaskflowError>) {
        let mut state = self.state.lock().unwrap();
        if state.is_none() {
            *state = Some(value);
            drop(state);
            self.cvar.notify_all();
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.state.lock().unwrap().is_some()
    }
}

/// The status returned by a timed wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutureStatus {
    Ready,
    Timeout,
}

/// A handle to a value that becomes available once its associated work finishes.
///
/// For graph runs `T` is `()`; for `Executor::async`/`Subflow::async` it is the task's return
/// value. Errors (structural, or a task panic caught at its boundary) surface here instead of
/// being silently swallowed.
pub struct Future<T> {
    inner: Arc<SharedState<T>>,
}

impl<T> Future<T> {
    pub(crate) fn new(inner: Arc<SharedState<T>>) -> Self {
        Future { inner }
    }

    pub(crate) fn ready(value: T) -> Self {
        let inner = SharedState::pending();
        inner.fulfill(Ok(value));
        Future { inner }
    }

    /// Blocks until the value is available.
    pub fn wait(&self) {
        let mut state = self.inner.state.lock().unwrap();
        while state.is_none() {
            state = self.inner.cvar.wait(state).unwrap();
        }
    }

    /// Blocks for at most `timeout`, returning whether the value became available in time.
    pub fn wait_for(&self, timeout: Duration) -> FutureStatus {
        let state = self.inner.state.lock().unwrap();
        if state.is_some() {
            return FutureStatus::Ready;
        }
        let (_, result) = self.inner.cvar.wait_timeout_while(state, timeout, |s| s.is_none()).unwrap();
        if result.timed_out() {
            FutureStatus::Timeout
        } else {
            FutureStatus::Ready
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    /// Blocks until ready, then consumes the future and returns its result.
    pub fn get(self) -> Result<T, TaskflowError> {
        self.wait();
        self.inner.state.lock().unwrap().take().expect("future marked ready without a value")
    }

    /// Returns the result without blocking, if it is already available.
    pub fn try_get(self) -> Result<T, Self> {
        if self.is_ready() {
            Ok(self.get())
        } else {
            Err(self)
        }
    }
}
