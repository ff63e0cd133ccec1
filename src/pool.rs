//! A persistent pool of worker threads with fork-join dispatch.
//!
//! A [`WorkerPool`] spawns its workers once and keeps them blocked on a condition variable
//! between calls. Work is submitted as a [`Task`]: one job per worker, each job owning the
//! worker's exclusive share of the output. [`WorkerPool::dispatch`] hands every worker its job,
//! wakes all workers and blocks the calling thread until every worker has reported back, so jobs
//! may freely borrow data from the caller's stack.
//!
//! ```rust
//! use pfem1d::partition::Partition;
//! use pfem1d::pool::{Task, WorkerPool};
//! use pfem1d::OperationKind;
//!
//! # fn main() -> pfem1d::Result<()> {
//! let pool = WorkerPool::new(4)?;
//! let input: Vec<u64> = (0..10).collect();
//! let mut block_sums = vec![0; pool.num_workers()];
//!
//! let partition = Partition::even(input.len(), pool.num_workers());
//! let mut task = Task::new(OperationKind::Custom, partition);
//! for (worker, sum) in block_sums.iter_mut().enumerate() {
//!     let input = &input;
//!     task.assign(worker, move |ctx| *sum = input[ctx.elements()].iter().sum());
//! }
//! pool.dispatch(task);
//!
//! assert_eq!(block_sums, vec![3, 12, 13, 17]);
//! # Ok(())
//! # }
//! ```
use crate::error::{Error, OperationKind, Result};
use crate::partition::Partition;
use crate::workspace::Workspace;
use itertools::izip;
use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::mem;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Configuration of a [`WorkerPool`].
///
/// Missing fields take their default values when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads. Defaults to the available parallelism of the machine.
    pub num_workers: usize,
    /// Worker `i` is named `"{thread_name_prefix}-{i}"`.
    pub thread_name_prefix: String,
    /// Stack size of every worker thread in bytes. Uses the platform default if `None`.
    pub stack_size: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            thread_name_prefix: String::from("pfem1d-worker"),
            stack_size: None,
        }
    }
}

impl PoolConfig {
    pub fn with_num_workers(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Self::default()
        }
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }
}

/// State of a single worker.
///
/// A worker cycles through `Idle -> Assigned -> Running -> Idle` once per dispatch. It only
/// enters `ShutDown` from `Idle`, when the pool is dropped.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum WorkerPhase {
    Idle,
    Assigned,
    Running,
    ShutDown,
}

/// Information available to a job while it runs on a worker.
pub struct WorkerContext<'a> {
    index: usize,
    elements: Range<usize>,
    workspace: &'a mut Workspace,
}

impl<'a> WorkerContext<'a> {
    /// Index of the worker running the job.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The block of elements assigned to this worker by the task's partition.
    pub fn elements(&self) -> Range<usize> {
        self.elements.clone()
    }

    /// Scratch storage owned by the worker, persisting across dispatches.
    pub fn workspace(&mut self) -> &mut Workspace {
        self.workspace
    }
}

impl<'a> fmt::Debug for WorkerContext<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("index", &self.index)
            .field("elements", &self.elements)
            .finish()
    }
}

type Job<'scope> = Box<dyn FnOnce(&mut WorkerContext<'_>) + Send + 'scope>;

/// A unit of fork-join work: a partition of the elements and at most one job per block.
///
/// Jobs may borrow anything that outlives `'scope`. Workers whose block has no job still take
/// part in the dispatch and report completion immediately.
pub struct Task<'scope> {
    kind: OperationKind,
    partition: Partition,
    jobs: Vec<Option<Job<'scope>>>,
}

impl<'scope> Task<'scope> {
    pub fn new(kind: OperationKind, partition: Partition) -> Self {
        let jobs = (0..partition.num_blocks()).map(|_| None).collect();
        Self { kind, partition, jobs }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Assigns the job for the given worker.
    ///
    /// # Panics
    ///
    /// Panics if the worker index is out of bounds or the worker already has a job.
    pub fn assign<F>(&mut self, worker: usize, job: F)
    where
        F: FnOnce(&mut WorkerContext<'_>) + Send + 'scope,
    {
        let slot = &mut self.jobs[worker];
        assert!(slot.is_none(), "Worker {worker} already has a job in this task");
        *slot = Some(Box::new(job));
    }
}

impl<'scope> fmt::Debug for Task<'scope> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let assigned: Vec<bool> = self.jobs.iter().map(Option::is_some).collect();
        f.debug_struct("Task")
            .field("kind", &self.kind)
            .field("partition", &self.partition)
            .field("assigned", &assigned)
            .finish()
    }
}

/// Persistent per-worker state, reused by every dispatch.
struct WorkerSlot {
    phase: WorkerPhase,
    elements: Range<usize>,
    job: Option<Job<'static>>,
}

#[derive(Default)]
struct PoolState {
    // Incremented once per dispatch. A worker runs whenever it observes a new generation.
    generation: u64,
    // Number of workers that have not yet completed the current generation
    remaining: usize,
    shutdown: bool,
    panic: Option<Box<dyn Any + Send>>,
}

struct Shared {
    slots: Vec<Mutex<WorkerSlot>>,
    state: Mutex<PoolState>,
    work_available: Condvar,
    work_done: Condvar,
}

/// A fixed-size set of long-lived worker threads.
///
/// Dropping the pool (or calling [`WorkerPool::shutdown`]) wakes all workers, lets them exit
/// and joins their threads. Since dispatch borrows the pool, the pool can never be torn down
/// while a dispatch is outstanding.
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
    // Serializes dispatches issued through shared references from several threads
    dispatch_lock: Mutex<()>,
    config: PoolConfig,
}

impl WorkerPool {
    /// Spawns a pool with the given number of workers and default settings otherwise.
    pub fn new(num_workers: usize) -> Result<Self> {
        Self::with_config(PoolConfig::with_num_workers(num_workers))
    }

    /// Spawns a pool according to the given configuration.
    ///
    /// If a worker fails to spawn, all workers spawned so far are shut down and joined before
    /// the error is returned.
    pub fn with_config(config: PoolConfig) -> Result<Self> {
        let num_workers = config.num_workers;
        if num_workers == 0 {
            return Err(Error::precondition(
                OperationKind::PoolCreation,
                "a worker pool needs at least one worker",
            ));
        }

        let slots = (0..num_workers)
            .map(|_| {
                Mutex::new(WorkerSlot {
                    phase: WorkerPhase::Idle,
                    elements: 0..0,
                    job: None,
                })
            })
            .collect();
        let shared = Arc::new(Shared {
            slots,
            state: Mutex::new(PoolState::default()),
            work_available: Condvar::new(),
            work_done: Condvar::new(),
        });
        let mut pool = Self {
            shared,
            handles: Vec::with_capacity(num_workers),
            dispatch_lock: Mutex::new(()),
            config,
        };

        debug!("Spawning {num_workers} worker threads");
        for index in 0..num_workers {
            let mut builder = thread::Builder::new().name(format!("{}-{index}", pool.config.thread_name_prefix));
            if let Some(stack_size) = pool.config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let shared = Arc::clone(&pool.shared);
            match builder.spawn(move || worker_loop(&shared, index)) {
                Ok(handle) => pool.handles.push(handle),
                Err(source) => {
                    warn!("Failed to spawn worker {index} of {num_workers}: {source}");
                    // Dropping the partially constructed pool shuts down the workers spawned so far
                    drop(pool);
                    return Err(Error::ResourceExhaustion {
                        index,
                        requested: num_workers,
                        source,
                    });
                }
            }
        }

        Ok(pool)
    }

    pub fn num_workers(&self) -> usize {
        self.shared.slots.len()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// The even partition of `num_elements` elements across the workers of this pool.
    pub fn partition(&self, num_elements: usize) -> Partition {
        Partition::even(num_elements, self.num_workers())
    }

    /// Current phase of every worker.
    pub fn worker_phases(&self) -> Vec<WorkerPhase> {
        self.shared.slots.iter().map(|slot| slot.lock().phase).collect()
    }

    /// Runs the task on all workers and blocks until every worker has completed.
    ///
    /// If a job panics, the remaining jobs still run to completion, after which the panic is
    /// resumed on the calling thread. The pool stays usable afterwards.
    ///
    /// A job must not dispatch to the pool it runs on: the outer dispatch only returns once the
    /// job has finished, so the nested one could never be served. Dispatching to a different pool
    /// from within a job is fine.
    ///
    /// # Panics
    ///
    /// Panics if the task's partition does not have exactly one block per worker, or if it is
    /// not a valid partition. Also panics if called from one of this pool's own workers.
    pub fn dispatch(&self, task: Task<'_>) {
        let on_own_worker = CURRENT_POOL.with(|current| ptr::eq(current.get(), Arc::as_ptr(&self.shared)));
        assert!(
            !on_own_worker,
            "Cannot dispatch to a worker pool from one of its own workers"
        );
        let _dispatch_guard = self.dispatch_lock.lock();

        let Task { kind, partition, jobs } = task;
        let num_workers = self.num_workers();
        assert_eq!(
            jobs.len(),
            num_workers,
            "Task must have exactly one block per worker"
        );
        assert!(
            partition.is_valid(),
            "Task partition must be contiguous, disjoint and exhaustive"
        );
        trace!(
            "Dispatching {kind} over {} elements to {num_workers} workers",
            partition.num_elements()
        );

        for (slot, job, block) in izip!(&self.shared.slots, jobs, partition.blocks()) {
            let mut slot = slot.lock();
            debug_assert_eq!(slot.phase, WorkerPhase::Idle);
            // SAFETY: Every assigned job is consumed by its worker before the worker decrements
            // `remaining`, and we do not return before `remaining` has reached zero. The job
            // therefore never outlives the borrows it was created with.
            slot.job = job.map(|job| unsafe { erase_job_lifetime(job) });
            slot.elements = block.clone();
            slot.phase = WorkerPhase::Assigned;
        }

        let mut state = self.shared.state.lock();
        state.remaining = num_workers;
        state.generation += 1;
        self.shared.work_available.notify_all();
        while state.remaining > 0 {
            self.shared.work_done.wait(&mut state);
        }
        let panic = state.panic.take();
        drop(state);

        if let Some(payload) = panic {
            panic::resume_unwind(payload);
        }
    }

    /// Shuts down all workers and joins their threads.
    pub fn shutdown(self) {
        drop(self)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.state.lock().shutdown = true;
        self.shared.work_available.notify_all();
        let num_spawned = self.handles.len();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("A worker thread terminated abnormally");
            }
        }
        debug!(
            "Worker pool shut down, joined {num_spawned} of {} worker threads",
            self.num_workers()
        );
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("running", &self.handles.len())
            .finish()
    }
}

/// Spawns a pool with `num_workers` workers.
pub fn create_pool(num_workers: usize) -> Result<WorkerPool> {
    WorkerPool::new(num_workers)
}

/// Shuts down the pool and joins all of its workers.
pub fn destroy_pool(pool: WorkerPool) {
    pool.shutdown()
}

/// # Safety
///
/// The caller must guarantee that the job is called or dropped before `'scope` ends.
unsafe fn erase_job_lifetime<'scope>(job: Job<'scope>) -> Job<'static> {
    mem::transmute::<Job<'scope>, Job<'static>>(job)
}

thread_local! {
    // The shared state of the pool that owns the current thread, null on non-worker threads
    static CURRENT_POOL: Cell<*const Shared> = const { Cell::new(ptr::null()) };
}

fn worker_loop(shared: &Shared, index: usize) {
    CURRENT_POOL.with(|current| current.set(shared));
    let mut workspace = Workspace::default();
    let mut seen_generation = 0;

    loop {
        {
            let mut state = shared.state.lock();
            while state.generation == seen_generation && !state.shutdown {
                shared.work_available.wait(&mut state);
            }
            if state.generation == seen_generation {
                // Woken for shutdown with no pending work
                break;
            }
            seen_generation = state.generation;
        }

        let (job, elements) = {
            let mut slot = shared.slots[index].lock();
            debug_assert_eq!(slot.phase, WorkerPhase::Assigned);
            slot.phase = WorkerPhase::Running;
            (slot.job.take(), slot.elements.clone())
        };

        let outcome = match job {
            Some(job) => {
                let mut context = WorkerContext {
                    index,
                    elements,
                    workspace: &mut workspace,
                };
                panic::catch_unwind(AssertUnwindSafe(move || job(&mut context)))
            }
            None => Ok(()),
        };
        shared.slots[index].lock().phase = WorkerPhase::Idle;

        let mut state = shared.state.lock();
        if let Err(payload) = outcome {
            state.panic.get_or_insert(payload);
        }
        state.remaining -= 1;
        if state.remaining == 0 {
            shared.work_done.notify_one();
        }
    }

    shared.slots[index].lock().phase = WorkerPhase::ShutDown;
    trace!("Worker {index} shut down");
}
