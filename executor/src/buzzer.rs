//! Thread parking, adapted from the teacher's `Buzzer`.
//!
//! A `Buzzer` is a handle to one parked OS thread: `buzz()` is just `Thread::unpark()`, which is
//! race-free by construction (an unpark delivered before the matching park is not lost, it just
//! makes the next park return immediately). `Notifier` collects one `Buzzer` per worker and picks
//! whom to wake; which worker actually gets to look at a global injector queue doesn't matter, so
//! waking one arbitrary parked worker is enough to avoid a thundering herd on every push.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread::Thread;
use std::time::Duration;

/// A handle that can wake exactly the thread that created it.
#[derive(Clone)]
pub struct Buzzer {
    thread: Thread,
}

impl Default for Buzzer {
    fn default() -> Self {
        Buzzer { thread: std::thread::current() }
    }
}

impl Buzzer {
    /// Wakes the owning thread if it is currently parked, or arms its next park to return
    /// immediately if it is not.
    pub fn buzz(&self) {
        self.thread.unpark();
    }
}

/// A registry of per-worker `Buzzer`s used to wake parked workers without busy-spinning.
///
/// Workers register themselves once at startup, then call [`Notifier::park`] whenever they find
/// no work. Pushing new work calls [`Notifier::notify_one`]; completing a topology (when every
/// remaining worker might be waiting on it) calls [`Notifier::notify_all`].
pub struct Notifier {
    buzzers: Mutex<Vec<Buzzer>>,
    next: AtomicUsize,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        Notifier { buzzers: Mutex::new(Vec::with_capacity(capacity)), next: AtomicUsize::new(0) }
    }

    /// Registers the calling thread so it can be woken by `notify_one`/`notify_all`. Must be
    /// called from the worker thread itself (a `Buzzer` only wakes its own creator).
    pub fn register(&self) {
        self.buzzers.lock().unwrap().push(Buzzer::default());
    }

    /// Wakes at most one parked worker, chosen round-robin.
    pub fn notify_one(&self) {
        let buzzers = self.buzzers.lock().unwrap();
        if buzzers.is_empty() {
            return;
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) % buzzers.len();
        buzzers[i].buzz();
    }

    /// Wakes every registered worker.
    pub fn notify_all(&self) {
        for buzzer in self.buzzers.lock().unwrap().iter() {
            buzzer.buzz();
        }
    }

    /// Parks the calling thread for a short, bounded interval.
    ///
    /// A bounded park rather than an unbounded one: `notify_one` wakes an arbitrary registered
    /// worker, not necessarily the one whose next steal would succeed, so a worker that finds
    /// nothing to do must periodically re-check rather than risk sleeping through a wakeup aimed
    /// at someone else.
    pub fn park(&self) {
        std::thread::park_timeout(Duration::from_millis(1));
    }
}
