//! A small, dependency-free registry of named, typed loggers.
//!
//! This crate backs `Executor::make_observer`: installing an observer is binding a name to an
//! action that consumes batches of timestamped events. It has no opinion about what the events
//! are; `taskflow` uses it for `ObserverEvent` (node begin/end), but the registry itself is
//! generic so the executor could grow other named streams without touching this crate.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A name-keyed table of typed loggers.
///
/// Binding a name to a type more than once simply replaces the destination that *new* clones of
/// the logger observe; loggers already handed out keep writing to their original destination
/// until dropped.
pub struct Registry {
    time: Instant,
    map: Mutex<HashMap<String, Box<dyn Any + Send + Sync>>>,
}

impl Registry {
    /// Creates a new registry, with all subsequent event timestamps measured from `time`.
    pub fn new(time: Instant) -> Self {
        Registry { time, map: Mutex::new(HashMap::new()) }
    }

    /// Binds `name` to an action invoked on event batches.
    ///
    /// The action should expect a sequence of events with non-decreasing timestamps, plus a
    /// timestamp lower-bounding the next event it could see. The stream ends only when every
    /// clone of the returned logger (and the one installed here) has been dropped.
    pub fn insert<T: Send + Sync + 'static>(
        &self,
        name: impl Into<String>,
        action: impl Fn(&Duration, &[(Duration, T)]) + Send + Sync + 'static,
    ) -> Option<Logger<T>> {
        let logger = Logger::new(self.time, action);
        self.map
            .lock()
            .unwrap()
            .insert(name.into(), Box::new(logger))
            .and_then(|prev| prev.downcast::<Logger<T>>().ok().map(|b| *b))
    }

    /// Removes a previously bound logger, returning it if present.
    pub fn remove<T: Send + Sync + 'static>(&self, name: &str) -> Option<Logger<T>> {
        self.map
            .lock()
            .unwrap()
            .remove(name)
            .and_then(|prev| prev.downcast::<Logger<T>>().ok().map(|b| *b))
    }

    /// Retrieves a clone of a bound logger, if one of the matching type has been inserted.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Option<Logger<T>> {
        self.map
            .lock()
            .unwrap()
            .get(name)
            .and_then(|entry| entry.downcast_ref::<Logger<T>>())
            .cloned()
    }
}

/// A buffering, cloneable logger bound to a fixed action.
///
/// Cloning shares the underlying buffer and action; this is how the same logical stream is
/// handed to every worker thread without re-registering it per worker.
pub struct Logger<T> {
    time: Instant,
    action: Arc<dyn Fn(&Duration, &[(Duration, T)]) + Send + Sync>,
    buffer: Arc<Mutex<Vec<(Duration, T)>>>,
}

impl<T> Clone for Logger<T> {
    fn clone(&self) -> Self {
        Logger { time: self.time, action: self.action.clone(), buffer: self.buffer.clone() }
    }
}

impl<T: Send + Sync + 'static> Logger<T> {
    /// Allocates a new logger bound to `action`, with buffer capacity tuned for low-latency
    /// flushing rather than throughput (observer events are for diagnostics, not a hot data path).
    fn new(time: Instant, action: impl Fn(&Duration, &[(Duration, T)]) + Send + Sync + 'static) -> Self {
        Logger { time, action: Arc::new(action), buffer: Arc::new(Mutex::new(Vec::with_capacity(256))) }
    }

    /// Logs one event, flushing the buffer once it reaches capacity.
    pub fn log(&self, event: T) {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.push((self.time.elapsed(), event));
        if buffer.len() == buffer.capacity() {
            (self.action)(&self.time.elapsed(), &buffer[..]);
            buffer.clear();
        }
    }

    /// Flushes any buffered events through the bound action immediately.
    pub fn flush(&self) {
        let mut buffer = self.buffer.lock().unwrap();
        if !buffer.is_empty() {
            (self.action)(&self.time.elapsed(), &buffer[..]);
            buffer.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn logs_flush_to_action() {
        let registry = Registry::new(Instant::now());
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let logger = registry
            .insert::<u32>("events", move |_time, batch| {
                count2.fetch_add(batch.len(), Ordering::SeqCst);
            })
            .is_none();
        assert!(logger, "no logger was previously bound");

        let handle = registry.get::<u32>("events").expect("bound above");
        for i in 0..10 {
            handle.log(i);
        }
        handle.flush();
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn clone_shares_buffer_and_action() {
        let registry = Registry::new(Instant::now());
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        registry.insert::<u8>("dup", move |_t, batch| {
            count2.fetch_add(batch.len(), Ordering::SeqCst);
        });

        let a = registry.get::<u8>("dup").unwrap();
        let b = a.clone();
        a.log(1);
        b.log(2);
        b.flush();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
