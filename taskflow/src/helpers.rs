//! `for_each`/`for_each_index`/`reduce`: parallel-for and reduce helpers built entirely on top of
//! `Taskflow::emplace`/`Task::precede`, peripheral to the executor core, kept here as thin
//! callers of the public graph-construction API rather than anything the scheduler knows about.

use crate::graph::{Task, Taskflow};
use std::ops::Range;
use std::sync::{Arc, Mutex};

/// A reasonable number of chunks to split `n` items across: enough to keep every worker busy
/// without fragmenting into one task per element.
fn chunk_count(n: usize) -> usize {
    let parallelism = std::thread::available_parallelism().map(|p| p.get()).unwrap_or(1);
    n.min(parallelism.saturating_mul(2).max(1))
}

impl Taskflow {
    /// Emplaces one task per chunk of `items`, each invoking `f` once per element in its slice,
    /// fanning in to a join task (returned) that the caller may chain further work from.
    ///
    /// Mirrors the partitioning freedom of the original: which worker runs which element is
    /// unspecified, only that `f` runs exactly once per element.
    pub fn for_each<T, F>(&self, items: Arc<Vec<T>>, f: F) -> Task
    where
        T: Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.for_each_index(0..items.len(), move |i| f(&items[i]))
    }

    /// Emplaces one task per chunk of `range`, each invoking `f` once per index in its slice,
    /// fanning in to a join task (returned). An empty or ill-specified range (`start >= end`) is
    /// a no-op, not an error.
    pub fn for_each_index<F>(&self, range: Range<usize>, f: F) -> Task
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        if range.start >= range.end {
            return self.emplace(|| {});
        }
        let f = Arc::new(f);
        let n = range.end - range.start;
        let chunk_size = n.div_ceil(chunk_count(n));
        let join = self.placeholder();
        let mut chunk_start = range.start;
        while chunk_start < range.end {
            let chunk_end = (chunk_start + chunk_size).min(range.end);
            let f = f.clone();
            let task = self.emplace(move || {
                for i in chunk_start..chunk_end {
                    f(i);
                }
            });
            task.precede(&join);
            chunk_start = chunk_end;
        }
        join
    }

    /// Emplaces a chunked left-fold of `items` with `init` and `op`, writing the final result
    /// into the returned `Mutex` once the returned join task completes. Each chunk folds its own
    /// contiguous slice left-to-right; the join task then folds `init` with every chunk's partial
    /// result, in chunk order, so the overall result matches a sequential left-fold as long as
    /// `op` is associative (not enforced here).
    pub fn reduce<T, F>(&self, items: Arc<Vec<T>>, init: T, op: F) -> (Task, Arc<Mutex<T>>)
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(T, T) -> T + Send + Sync + 'static,
    {
        let result = Arc::new(Mutex::new(init));
        let n = items.len();
        if n == 0 {
            return (self.emplace(|| {}), result);
        }
        let op = Arc::new(op);
        let chunks = chunk_count(n);
        let chunk_size = n.div_ceil(chunks);
        let partials: Arc<Mutex<Vec<Option<T>>>> = Arc::new(Mutex::new(vec![None; chunks]));

        let mut tasks = Vec::with_capacity(chunks);
        let mut chunk_start = 0;
        let mut slot = 0;
        while chunk_start < n {
            let chunk_end = (chunk_start + chunk_size).min(n);
            let items = items.clone();
            let op = op.clone();
            let partials = partials.clone();
            tasks.push(self.emplace(move || {
                let mut acc = items[chunk_start].clone();
                for item in &items[chunk_start + 1..chunk_end] {
                    acc = op(acc, item.clone());
                }
                partials.lock().unwrap()[slot] = Some(acc);
            }));
            chunk_start = chunk_end;
            slot += 1;
        }

        let result_for_merge = result.clone();
        let op_for_merge = op.clone();
        let merge = self.emplace(move || {
            let mut acc = result_for_merge.lock().unwrap().clone();
            for partial in partials.lock().unwrap().drain(..).flatten() {
                acc = op_for_merge(acc, partial);
            }
            *result_for_merge.lock().unwrap() = acc;
        });
        for task in &tasks {
            task.precede(&merge);
        }
        (merge, result)
    }
}
