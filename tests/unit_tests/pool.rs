use super::pool;
use pfem1d::partition::Partition;
use pfem1d::pool::{create_pool, destroy_pool, PoolConfig, Task, WorkerPhase, WorkerPool};
use pfem1d::{Error, OperationKind};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Each worker writes the sum of its block of `input` into its own slot.
fn block_sums(pool: &WorkerPool, input: &[u64]) -> Vec<u64> {
    let mut sums = vec![0; pool.num_workers()];
    let mut task = Task::new(OperationKind::Custom, pool.partition(input.len()));
    for (worker, sum) in sums.iter_mut().enumerate() {
        task.assign(worker, move |ctx| *sum = input[ctx.elements()].iter().sum());
    }
    pool.dispatch(task);
    sums
}

#[test]
fn pool_with_zero_workers_is_rejected() {
    let err = WorkerPool::new(0).unwrap_err();
    assert!(matches!(
        err,
        Error::PreconditionViolation {
            operation: OperationKind::PoolCreation,
            ..
        }
    ));
}

#[test]
fn failure_to_spawn_workers_reports_resource_exhaustion() {
    // No platform can provide a stack of this size
    let config = PoolConfig::with_num_workers(3).stack_size(usize::MAX);
    let err = WorkerPool::with_config(config).unwrap_err();
    assert!(matches!(
        err,
        Error::ResourceExhaustion {
            index: 0,
            requested: 3,
            ..
        }
    ));
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn create_and_destroy_pool() {
    let pool = create_pool(3).unwrap();
    assert_eq!(pool.num_workers(), 3);
    assert_eq!(pool.worker_phases(), vec![WorkerPhase::Idle; 3]);
    destroy_pool(pool);
}

#[test]
fn dispatch_runs_every_block_exactly_once() {
    let input: Vec<u64> = (0..10).collect();
    let pool = pool(4);
    assert_eq!(block_sums(&pool, &input), vec![3, 12, 13, 17]);
}

#[test]
fn workers_are_idle_after_dispatch() {
    let pool = pool(5);
    let input: Vec<u64> = (0..23).collect();
    block_sums(&pool, &input);
    assert_eq!(pool.worker_phases(), vec![WorkerPhase::Idle; 5]);
}

#[test]
fn workers_without_elements_still_complete() {
    let pool = pool(6);
    let input = vec![1, 2];
    assert_eq!(block_sums(&pool, &input), vec![1, 2, 0, 0, 0, 0]);

    // No job assigned at all
    pool.dispatch(Task::new(OperationKind::Custom, pool.partition(100)));
    assert_eq!(pool.worker_phases(), vec![WorkerPhase::Idle; 6]);
}

#[test]
fn every_worker_sees_its_own_block() {
    let pool = pool(3);
    let mut seen = vec![None; 3];
    let mut task = Task::new(OperationKind::Custom, Partition::even(8, 3));
    for (worker, slot) in seen.iter_mut().enumerate() {
        task.assign(worker, move |ctx| *slot = Some((ctx.index(), ctx.elements())));
    }
    pool.dispatch(task);
    assert_eq!(seen, vec![Some((0, 0..3)), Some((1, 3..6)), Some((2, 6..8))]);
}

#[test]
fn pool_is_reused_across_many_dispatches() {
    let pool = pool(4);
    let counter = AtomicUsize::new(0);
    for _ in 0..500 {
        let mut task = Task::new(OperationKind::Custom, pool.partition(17));
        for worker in 0..pool.num_workers() {
            let counter = &counter;
            task.assign(worker, move |ctx| {
                counter.fetch_add(ctx.elements().len(), Ordering::Relaxed);
            });
        }
        pool.dispatch(task);
    }
    assert_eq!(counter.load(Ordering::Relaxed), 500 * 17);
}

#[test]
fn panicking_job_is_propagated_and_pool_stays_usable() {
    let pool = pool(3);
    let completed = AtomicUsize::new(0);

    let mut task = Task::new(OperationKind::Custom, pool.partition(3));
    for worker in 0..3 {
        let completed = &completed;
        task.assign(worker, move |ctx| {
            if ctx.index() == 1 {
                panic!("job failure");
            }
            completed.fetch_add(1, Ordering::SeqCst);
        });
    }
    let result = catch_unwind(AssertUnwindSafe(|| pool.dispatch(task)));
    assert!(result.is_err());
    // The other jobs ran to completion before the panic was resumed
    assert_eq!(completed.load(Ordering::SeqCst), 2);
    assert_eq!(pool.worker_phases(), vec![WorkerPhase::Idle; 3]);

    let input: Vec<u64> = (1..=6).collect();
    assert_eq!(block_sums(&pool, &input), vec![3, 7, 11]);
}

#[test]
fn dispatch_rejects_mismatched_partition() {
    let pool = pool(2);
    let task = Task::new(OperationKind::Custom, Partition::even(4, 3));
    let result = catch_unwind(AssertUnwindSafe(|| pool.dispatch(task)));
    assert!(result.is_err());

    // Assertion failures happen before any worker is woken
    let input = vec![5, 6, 7];
    assert_eq!(block_sums(&pool, &input), vec![11, 7]);
}

#[test]
fn assigning_a_worker_twice_panics() {
    let mut task = Task::new(OperationKind::Custom, Partition::even(4, 2));
    task.assign(0, |_| {});
    let result = catch_unwind(AssertUnwindSafe(|| task.assign(0, |_| {})));
    assert!(result.is_err());
}

#[test]
fn worker_threads_are_named_after_config() {
    let config = PoolConfig::with_num_workers(3).thread_name_prefix("transform");
    let pool = WorkerPool::with_config(config).unwrap();
    assert_eq!(pool.config().thread_name_prefix, "transform");

    let mut names = vec![String::new(); 3];
    let mut task = Task::new(OperationKind::Custom, pool.partition(0));
    for (worker, name) in names.iter_mut().enumerate() {
        task.assign(worker, move |_| {
            *name = std::thread::current().name().unwrap_or_default().to_string();
        });
    }
    pool.dispatch(task);
    assert_eq!(names, vec!["transform-0", "transform-1", "transform-2"]);
}

#[test]
fn worker_workspace_persists_across_dispatches() {
    let pool = pool(2);
    for round in 1..=3 {
        let mut counts = vec![0; 2];
        let mut task = Task::new(OperationKind::Custom, pool.partition(2));
        for (worker, count) in counts.iter_mut().enumerate() {
            task.assign(worker, move |ctx| {
                let visits: &mut Vec<usize> = ctx.workspace().get_or_default();
                visits.push(round);
                *count = visits.len();
            });
        }
        pool.dispatch(task);
        assert_eq!(counts, vec![round, round]);
    }
}

#[test]
fn concurrent_dispatches_are_serialized() {
    let pool = pool(3);
    let input: Vec<u64> = (0..30).collect();
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..50 {
                    assert_eq!(block_sums(&pool, &input), vec![45, 145, 245]);
                }
            });
        }
    });
}

#[test]
fn dispatch_from_own_worker_panics_instead_of_deadlocking() {
    let pool = pool(2);
    let mut task = Task::new(OperationKind::Custom, pool.partition(2));
    {
        let pool = &pool;
        task.assign(0, move |_| pool.dispatch(Task::new(OperationKind::Custom, pool.partition(2))));
    }
    let result = catch_unwind(AssertUnwindSafe(|| pool.dispatch(task)));
    assert!(result.is_err());
    assert_eq!(pool.worker_phases(), vec![WorkerPhase::Idle; 2]);

    let input: Vec<u64> = (1..=4).collect();
    assert_eq!(block_sums(&pool, &input), vec![3, 7]);
}

#[test]
fn jobs_may_dispatch_to_another_pool() {
    let outer = pool(2);
    let inner = pool(3);
    let input: Vec<u64> = (0..9).collect();
    let mut inner_sums = vec![Vec::new(); outer.num_workers()];

    let mut task = Task::new(OperationKind::Custom, outer.partition(2));
    for (worker, sums) in inner_sums.iter_mut().enumerate() {
        let (inner, input) = (&inner, &input);
        task.assign(worker, move |_| *sums = block_sums(inner, input));
    }
    outer.dispatch(task);
    assert_eq!(inner_sums, vec![vec![3, 12, 21]; 2]);
}
