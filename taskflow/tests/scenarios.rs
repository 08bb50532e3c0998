//! End-to-end scenarios exercising the scheduler across task kinds, subflow join/detach,
//! semaphores, and the observer, the way the teacher's dataflow crate is exercised through
//! whole-pipeline integration tests rather than only unit tests of individual operators.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use taskflow::{CriticalSection, Executor, ObserverEvent, Phase, Subflow, Taskflow, TaskflowError};

#[test]
fn linear_chain_of_100_runs_in_order() {
    let flow = Taskflow::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let mut prev = None;
    for _ in 0..100 {
        let counter = counter.clone();
        let task = flow.emplace(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        if let Some(p) = prev {
            let p: taskflow::Task = p;
            p.precede(&task);
        }
        prev = Some(task);
    }

    let executor = Executor::new(4);
    executor.run(&flow).get().unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 100);
}

#[test]
fn alternating_chain_sums_to_zero() {
    let flow = Taskflow::new();
    let sum = Arc::new(AtomicUsize::new(1000)); // bias so subtraction never underflows a usize
    let mut prev = None;
    for i in 0..100 {
        let sum = sum.clone();
        let delta: isize = if i % 2 == 0 { 1 } else { -1 };
        let task = flow.emplace(move || {
            if delta > 0 {
                sum.fetch_add(delta as usize, Ordering::SeqCst);
            } else {
                sum.fetch_sub((-delta) as usize, Ordering::SeqCst);
            }
        });
        if let Some(p) = prev {
            let p: taskflow::Task = p;
            p.precede(&task);
        }
        prev = Some(task);
    }

    let executor = Executor::new(4);
    executor.run(&flow).get().unwrap();
    assert_eq!(sum.load(Ordering::SeqCst), 1000);
}

#[test]
fn kite_shape_sink_runs_once_after_every_middle() {
    let flow = Taskflow::new();
    let visits = Arc::new(AtomicUsize::new(0));
    let sink_ran = Arc::new(AtomicUsize::new(0));

    let visits2 = visits.clone();
    let source = flow.emplace(move || {
        visits2.fetch_add(1, Ordering::SeqCst);
    });

    let sink_ran2 = sink_ran.clone();
    let sink = flow.emplace(move || {
        sink_ran2.fetch_add(1, Ordering::SeqCst);
    });

    let mut prev = source.clone();
    for _ in 0..100 {
        let visits2 = visits.clone();
        let middle = flow.emplace(move || {
            visits2.fetch_add(1, Ordering::SeqCst);
        });
        prev.precede(&middle);
        middle.precede(&sink);
        prev = middle;
    }

    let executor = Executor::new(4);
    executor.run(&flow).get().unwrap();
    assert_eq!(visits.load(Ordering::SeqCst), 101); // source + 100 middles
    assert_eq!(sink_ran.load(Ordering::SeqCst), 1);
}

#[test]
fn self_looping_condition_runs_fixed_width_for_every_iteration() {
    let flow = Taskflow::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let state = Arc::new(AtomicUsize::new(0));
    let c_runs = Arc::new(AtomicUsize::new(0));

    let counter2 = counter.clone();
    let a = flow.emplace(move || counter2.store(0, Ordering::SeqCst));

    let counter3 = counter.clone();
    let state2 = state.clone();
    let b = flow.emplace_condition(move || {
        let c = counter3.fetch_add(1, Ordering::SeqCst) + 1;
        state2.fetch_add(1, Ordering::SeqCst);
        if c < 100 {
            0
        } else {
            1
        }
    });

    let counter4 = counter.clone();
    let c_runs2 = c_runs.clone();
    let c = flow.emplace(move || {
        assert_eq!(counter4.load(Ordering::SeqCst), 100);
        c_runs2.fetch_add(1, Ordering::SeqCst);
    });

    a.precede(&b);
    b.precede(&b); // self-loop: a weak edge, since b is a CONDITION
    b.precede(&c); // weak edge: c's only predecessor is a condition

    assert_eq!(b.num_strong_dependents(), 1);
    assert_eq!(b.num_weak_dependents(), 1);
    assert_eq!(c.num_strong_dependents(), 0);
    assert_eq!(c.num_weak_dependents(), 1);

    let executor = Executor::new(1); // also exercises the W == 1 cyclic-condition path
    executor.run_n(&flow, 15).get().unwrap();

    assert_eq!(state.load(Ordering::SeqCst), 1500);
    assert_eq!(c_runs.load(Ordering::SeqCst), 15);
}

#[test]
fn cyclic_branch_visits_every_leaf_exactly_once() {
    const LEAVES: usize = 1000;
    let flow = Taskflow::new();
    let round = Arc::new(AtomicUsize::new(0));
    let visited = Arc::new(Mutex::new(vec![false; LEAVES]));
    let terminal_ran = Arc::new(AtomicBool::new(false));

    let a = flow.emplace(|| {});

    let round2 = round.clone();
    let branch = flow.emplace_condition(move || round2.fetch_add(1, Ordering::SeqCst) as i32);

    let terminal_ran2 = terminal_ran.clone();
    let terminal = flow.emplace(move || terminal_ran2.store(true, Ordering::SeqCst));

    a.precede(&branch);
    for i in 0..LEAVES {
        let visited = visited.clone();
        let leaf = flow.emplace_condition(move || {
            let mut guard = visited.lock().unwrap();
            assert!(!guard[i], "leaf {i} visited twice");
            guard[i] = true;
            0
        });
        branch.precede(&leaf);
        leaf.precede(&branch);
    }
    branch.precede(&terminal); // appended last: successor index == LEAVES selects this

    let executor = Executor::new(4);
    executor.run(&flow).get().unwrap();

    assert!(visited.lock().unwrap().iter().all(|&v| v));
    assert!(terminal_ran.load(Ordering::SeqCst));
}

fn spawn_detached_tree(sf: &mut Subflow<'_>, remaining_levels: usize, counter: Arc<AtomicUsize>) {
    counter.fetch_add(1, Ordering::SeqCst);
    if remaining_levels == 0 {
        return;
    }
    let left = counter.clone();
    let right = counter.clone();
    sf.emplace_dynamic(move |child| spawn_detached_tree(child, remaining_levels - 1, left.clone())).unwrap();
    sf.emplace_dynamic(move |child| spawn_detached_tree(child, remaining_levels - 1, right.clone())).unwrap();
    sf.detach().unwrap();
}

#[test]
fn nested_detached_tree_visits_every_node() {
    const LEVELS: usize = 9; // 10 levels total, 2^10 - 1 nodes
    for width in 1..=4 {
        let flow = Taskflow::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = counter.clone();
        flow.emplace_dynamic(move |sf| spawn_detached_tree(sf, LEVELS, counter2.clone()));

        let executor = Executor::new(width);
        executor.run(&flow).get().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), (1usize << (LEVELS + 1)) - 1, "width {width}");
    }
}

fn fib_node(sf: &mut Subflow<'_>, n: u64, out: Arc<Mutex<u64>>) {
    if n < 2 {
        *out.lock().unwrap() = n;
        return;
    }
    let left = Arc::new(Mutex::new(0u64));
    let right = Arc::new(Mutex::new(0u64));
    let left2 = left.clone();
    let right2 = right.clone();
    sf.emplace_dynamic(move |child| fib_node(child, n - 1, left2.clone())).unwrap();
    sf.emplace_dynamic(move |child| fib_node(child, n - 2, right2.clone())).unwrap();
    sf.join().unwrap();
    *out.lock().unwrap() = *left.lock().unwrap() + *right.lock().unwrap();
}

#[test]
fn fibonacci_via_subflow_join() {
    for width in 1..=8 {
        let flow = Taskflow::new();
        let result = Arc::new(Mutex::new(0u64));
        let result2 = result.clone();
        flow.emplace_dynamic(move |sf| fib_node(sf, 20, result2.clone()));

        let executor = Executor::new(width);
        executor.run(&flow).get().unwrap();
        assert_eq!(*result.lock().unwrap(), 6765, "width {width}");
    }
}

#[test]
fn semaphore_serializes_1000_critical_sections() {
    let flow = Taskflow::new();
    let cs = CriticalSection::new();
    let busy = Arc::new(AtomicBool::new(false));
    let count = Arc::new(AtomicUsize::new(0));

    for _ in 0..1000 {
        let busy = busy.clone();
        let count = count.clone();
        let task = flow.emplace(move || {
            assert!(!busy.swap(true, Ordering::SeqCst), "critical section violated");
            count.fetch_add(1, Ordering::SeqCst);
            busy.store(false, Ordering::SeqCst);
        });
        cs.add(&task);
    }

    let executor = Executor::new(8);
    executor.run(&flow).get().unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1000);
    assert_eq!(cs.semaphore().count(), 1); // no permit leaked
}

#[test]
fn empty_graph_completes_immediately() {
    let flow = Taskflow::new();
    let executor = Executor::new(2);
    executor.run(&flow).get().unwrap();
}

#[test]
fn observer_sees_one_entry_and_exit_per_execution() {
    let flow = Taskflow::new();
    for _ in 0..50 {
        flow.emplace(|| {});
    }

    let executor = Executor::new(4);
    let events = Arc::new(Mutex::new(Vec::<ObserverEvent>::new()));
    let events2 = events.clone();
    executor.make_observer(move |_elapsed, batch| {
        let mut guard = events2.lock().unwrap();
        guard.extend(batch.iter().map(|(_ts, e)| *e));
    });

    executor.run(&flow).get().unwrap();
    executor.flush_observer();

    let events = events.lock().unwrap();
    let entries = events.iter().filter(|e| e.phase == Phase::Entry).count();
    let exits = events.iter().filter(|e| e.phase == Phase::Exit).count();
    assert_eq!(entries, 50);
    assert_eq!(exits, 50);
}

#[test]
fn panicking_task_surfaces_as_task_panicked_error() {
    let flow = Taskflow::new();
    flow.emplace(|| panic!("boom"));

    let executor = Executor::new(2);
    let result = executor.run(&flow).get();
    assert!(matches!(result, Err(TaskflowError::TaskPanicked(_))));
}

#[test]
fn module_successors_release_only_after_inner_sinks_complete() {
    let inner = Taskflow::new();
    let order = Arc::new(Mutex::new(Vec::<&'static str>::new()));

    let order2 = order.clone();
    let inner_a = inner.emplace(move || order2.lock().unwrap().push("inner-a"));
    let order3 = order.clone();
    let inner_b = inner.emplace(move || order3.lock().unwrap().push("inner-b"));
    inner_a.precede(&inner_b);

    let outer = Taskflow::new();
    let module = outer.composed_of(&inner).unwrap();
    let order4 = order.clone();
    let after = outer.emplace(move || order4.lock().unwrap().push("after"));
    module.precede(&after);

    let executor = Executor::new(2);
    executor.run(&outer).get().unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["inner-a", "inner-b", "after"]);
}

#[test]
fn composing_a_graph_with_itself_is_rejected() {
    let flow = Taskflow::new();
    flow.emplace(|| {});
    assert!(matches!(flow.composed_of(&flow), Err(TaskflowError::SelfComposition)));
}

#[test]
fn executor_async_returns_the_task_result() {
    let executor = Executor::new(2);
    let future = executor.spawn(|| 6 * 7);
    assert_eq!(future.get().unwrap(), 42);
}

#[test]
fn wait_for_all_drains_nested_async_tasks() {
    let executor = Executor::new(2);
    let counter = Arc::new(AtomicUsize::new(0));

    let c1 = counter.clone();
    executor.spawn_silent(move || {
        c1.fetch_add(1, Ordering::SeqCst);
    });
    let c2 = counter.clone();
    executor.spawn_silent(move || {
        c2.fetch_add(1, Ordering::SeqCst);
    });

    executor.wait_for_all();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn run_until_stops_as_soon_as_predicate_is_true() {
    let flow = Taskflow::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let counter2 = counter.clone();
    flow.emplace(move || {
        counter2.fetch_add(1, Ordering::SeqCst);
    });

    let executor = Executor::new(2);
    let predicate_counter = counter.clone();
    executor.run_until(&flow, move || predicate_counter.load(Ordering::SeqCst) >= 5).get().unwrap();

    assert_eq!(counter.load(Ordering::SeqCst), 5);
}

#[test]
fn this_worker_id_is_none_off_the_pool_and_some_on_it() {
    let executor = Arc::new(Executor::new(2));
    assert_eq!(executor.this_worker_id(), None);

    let flow = Taskflow::new();
    let observed = Arc::new(Mutex::new(None::<Option<usize>>));
    let observed2 = observed.clone();
    let executor2 = executor.clone();
    flow.emplace(move || {
        *observed2.lock().unwrap() = Some(executor2.this_worker_id());
    });
    executor.run(&flow).get().unwrap();

    let id = observed.lock().unwrap().expect("task ran");
    assert!(matches!(id, Some(w) if w < 2));
}

#[test]
fn semaphore_of_capacity_zero_is_rejected() {
    assert!(matches!(
        taskflow::Semaphore::new(0),
        Err(TaskflowError::InvalidCapacity)
    ));
}

#[test]
fn for_each_visits_every_element_exactly_once() {
    let flow = Taskflow::new();
    let items = Arc::new((0..2000).collect::<Vec<i64>>());
    let seen = Arc::new(Mutex::new(vec![0u8; items.len()]));

    let seen2 = seen.clone();
    flow.for_each(items.clone(), move |&i| {
        seen2.lock().unwrap()[i as usize] += 1;
    });

    let executor = Executor::new(4);
    executor.run(&flow).get().unwrap();

    assert!(seen.lock().unwrap().iter().all(|&count| count == 1));
}

#[test]
fn for_each_index_on_an_empty_range_is_a_no_op() {
    let flow = Taskflow::new();
    let ran = Arc::new(AtomicBool::new(false));
    let ran2 = ran.clone();
    flow.for_each_index(5..5, move |_| ran2.store(true, Ordering::SeqCst));

    let executor = Executor::new(2);
    executor.run(&flow).get().unwrap();
    assert!(!ran.load(Ordering::SeqCst));
}

#[test]
fn reduce_matches_a_sequential_left_fold() {
    let flow = Taskflow::new();
    let items = Arc::new((1..=5000i64).collect::<Vec<i64>>());
    let (_join, result) = flow.reduce(items.clone(), 0i64, |a, b| a + b);

    let executor = Executor::new(4);
    executor.run(&flow).get().unwrap();

    let expected: i64 = items.iter().fold(0, |a, &b| a + b);
    assert_eq!(*result.lock().unwrap(), expected);
}

#[test]
fn subflow_cannot_be_joined_or_detached_twice() {
    let flow = Taskflow::new();
    flow.emplace_dynamic(|sf| {
        sf.emplace(|| {}).unwrap();
        sf.join().unwrap();
        assert!(!sf.joinable());
        assert!(matches!(sf.join(), Err(TaskflowError::SubflowNotJoinable)));
        assert!(matches!(sf.detach(), Err(TaskflowError::SubflowNotJoinable)));
        assert!(matches!(sf.emplace(|| {}), Err(TaskflowError::SubflowNotJoinable)));
        assert!(matches!(sf.placeholder(), Err(TaskflowError::SubflowNotJoinable)));
    });

    let executor = Executor::new(2);
    executor.run(&flow).get().unwrap();
}
