use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::builder::{BuildError, SchedulerBuilder};
use crate::constants::{QUEUE_SIZE_OFFLOAD_THRESHOLD, STEAL_ATTEMPTS};
use crate::global_queue::GlobalQueue;
use crate::hooks::Hooks;
use crate::macros::tracing_feat;
use crate::permits::CpuPermits;
use crate::retired::RetiredStack;
use crate::rng::Xorshift32;
use crate::task::{Runnable, Task, TaskMode};
use crate::worker::{self, WorkerCore, WorkerState};
use crate::JoinHandle;

/// The coordinating object: owns the workers array, the global queue, the
/// permits and the resizing logic; exposes `dispatch` and `close`.
#[derive(Clone)]
pub struct Scheduler(Arc<Inner>);

pub(crate) struct Inner {
    workers: Box<[OnceLock<Arc<WorkerCore>>]>,
    created_workers: AtomicUsize,
    blocking_workers: AtomicUsize,
    is_terminated: AtomicBool,
    global: GlobalQueue,
    permits: CpuPermits,
    retired: RetiredStack,
    hooks: Arc<Hooks>,
    core_pool_size: usize,
    max_pool_size: usize,
    stack_size: Option<usize>,
    /// Used only by `unparkAny`, which is invoked from arbitrary
    /// non-worker threads and therefore cannot reuse a per-worker RNG.
    dispatch_rng: Mutex<Xorshift32>,
    join_handles: Mutex<Vec<std::thread::JoinHandle<()>>>,
}

impl Scheduler {
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub(crate) fn new(core_pool_size: usize, max_pool_size: usize, stack_size: Option<usize>, hooks: Hooks) -> Self {
        let mut workers = Vec::with_capacity(max_pool_size);
        for _ in 0..max_pool_size {
            workers.push(OnceLock::new());
        }

        Scheduler(Arc::new(Inner {
            workers: workers.into_boxed_slice(),
            created_workers: AtomicUsize::new(0),
            blocking_workers: AtomicUsize::new(0),
            is_terminated: AtomicBool::new(false),
            global: GlobalQueue::new(),
            permits: CpuPermits::new(core_pool_size),
            retired: RetiredStack::new(),
            hooks: Arc::new(hooks),
            core_pool_size,
            max_pool_size,
            stack_size,
            dispatch_rng: Mutex::new(Xorshift32::for_worker(usize::MAX)),
            join_handles: Mutex::new(Vec::new()),
        }))
    }

    pub(crate) fn inner_arc(&self) -> Arc<Inner> {
        self.0.clone()
    }

    fn identity(&self) -> *const () {
        Arc::as_ptr(&self.0).cast()
    }

    /// Dispatches `runnable` as a `NonBlocking`, non-fair task.
    pub fn dispatch<F: Runnable>(&self, runnable: F) -> JoinHandle<F::Output> {
        self.dispatch_with(runnable, TaskMode::NonBlocking, false)
    }

    /// Dispatches `runnable` with an explicit mode and fairness request.
    pub fn dispatch_with<F: Runnable>(&self, runnable: F, mode: TaskMode, fair: bool) -> JoinHandle<F::Output> {
        let submitted_at = crate::clock::now_ns();
        let task = Task::new(runnable, submitted_at, mode, self.0.hooks.clone()).erase();
        let header = task.header;

        match self.try_local_submit(task, mode, fair) {
            SubmitOutcome::Added => {}
            SubmitOutcome::AddedRequiresHelp => self.request_cpu_worker(),
            SubmitOutcome::NotAdded(task) => {
                tracing_feat!(trace!("task submitted from outside a worker, injecting into global queue"));
                self.0.global.push(task);
                self.request_cpu_worker();
            }
        }

        JoinHandle::new(header)
    }

    fn try_local_submit(
        &self,
        task: crate::task::TypeErasedTask,
        mode: TaskMode,
        fair: bool,
    ) -> SubmitOutcome {
        let Some(ptr) = worker::current_worker(self.identity()) else {
            return SubmitOutcome::NotAdded(task);
        };
        // SAFETY: `ptr` is only handed back while the owning `run_worker`
        // frame is live on this very thread's stack.
        let core = unsafe { &*ptr };

        let mut requires_help = false;

        if mode == TaskMode::NonBlocking {
            if matches!(core.state(), WorkerState::Blocking) {
                requires_help = true;
            } else if !self.0.permits.try_acquire() {
                return SubmitOutcome::NotAdded(task);
            } else {
                // Admission probe only: this call never carries the permit
                // into the task's eventual execution (see dispatch algorithm
                // notes) — `findTask`'s own acquisition gates that later.
                self.0.permits.release();
            }
        }

        let inserted = if fair {
            core.queue.add_last(task, &self.0.global)
        } else {
            core.queue.add(task, &self.0.global)
        };

        if !inserted {
            requires_help = true;
        }

        if core.queue.size() >= QUEUE_SIZE_OFFLOAD_THRESHOLD {
            requires_help = true;
        }

        if requires_help {
            SubmitOutcome::AddedRequiresHelp
        } else {
            SubmitOutcome::Added
        }
    }

    fn request_cpu_worker(&self) {
        self.0.request_cpu_worker_for(self);
    }

    /// Marks termination and waits for all created workers to exit.
    /// Idempotent; intended for test teardown.
    pub fn close(&self) {
        if self.0.is_terminated.swap(true, Ordering::AcqRel) {
            return;
        }

        let created = self.0.created_workers.load(Ordering::Acquire);
        for i in 0..created {
            if let Some(w) = self.0.workers[i].get() {
                if let Some(t) = w.thread() {
                    t.unpark();
                }
            }
        }

        let mut handles = self.0.join_handles.lock().unwrap_or_else(|e| e.into_inner());
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
    }
}

enum SubmitOutcome {
    Added,
    AddedRequiresHelp,
    NotAdded(crate::task::TypeErasedTask),
}

impl Inner {
    pub(crate) fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub(crate) fn permits(&self) -> &CpuPermits {
        &self.permits
    }

    pub(crate) fn global(&self) -> &GlobalQueue {
        &self.global
    }

    pub(crate) fn retired(&self) -> &RetiredStack {
        &self.retired
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.is_terminated.load(Ordering::Acquire)
    }

    pub(crate) fn created_workers(&self) -> usize {
        self.created_workers.load(Ordering::Acquire)
    }

    pub(crate) fn worker_at(&self, index: usize) -> Option<&Arc<WorkerCore>> {
        self.workers.get(index).and_then(OnceLock::get)
    }

    pub(crate) fn inc_blocking_workers(&self) {
        self.blocking_workers.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn dec_blocking_workers(&self) {
        self.blocking_workers.fetch_sub(1, Ordering::AcqRel);
    }

    /// §4.3 requestCpuWorker policy. Takes `scheduler` (rather than building
    /// a fresh one from `self`) so a newly spawned worker's thread closure
    /// can hold the same `Scheduler` handle the caller already has.
    fn request_cpu_worker_for(&self, scheduler: &Scheduler) {
        if self.permits.available() == 0 {
            return;
        }

        if let Some(idx) = self.retired.pop() {
            if let Some(w) = self.worker_at(idx) {
                if let Some(t) = w.thread() {
                    tracing_feat!(trace!(worker = idx, "reviving retired worker"));
                    t.unpark();
                }
            }
            return;
        }

        let cpu_workers = self
            .created_workers()
            .saturating_sub(self.blocking_workers.load(Ordering::Acquire));

        if cpu_workers < self.core_pool_size {
            self.try_create_worker(scheduler);
            return;
        }

        self.unpark_any();
    }

    fn try_create_worker(&self, scheduler: &Scheduler) {
        loop {
            let created = self.created_workers.load(Ordering::Acquire);
            if created >= self.max_pool_size {
                return;
            }

            if self
                .created_workers
                .compare_exchange(created, created + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.spawn_worker(created, scheduler);
                return;
            }
        }
    }

    fn spawn_worker(&self, index: usize, scheduler: &Scheduler) {
        let core = Arc::new(WorkerCore::new(index));
        self.workers[index]
            .set(core.clone())
            .unwrap_or_else(|_| unreachable!("worker slot {index} published twice"));

        let scheduler = scheduler.clone();
        let mut thread_builder = std::thread::Builder::new().name(self.hooks.call_name_fn());
        if let Some(size) = self.stack_size {
            thread_builder = thread_builder.stack_size(size);
        }

        let handle = thread_builder
            .spawn(move || {
                worker::run_worker(scheduler, core);
            })
            .unwrap_or_else(|_| panic!("failed to spawn a worker thread"));

        tracing_feat!(trace!(worker = index, "created worker"));
        self.join_handles.lock().unwrap_or_else(|e| e.into_inner()).push(handle);
    }

    fn unpark_any(&self) {
        let created = self.created_workers();
        if created == 0 {
            return;
        }

        let mut rng = self.dispatch_rng.lock().unwrap_or_else(|e| e.into_inner());

        for _ in 0..STEAL_ATTEMPTS {
            let idx = rng.next_bound(created);
            if let Some(w) = self.worker_at(idx) {
                if matches!(w.state(), WorkerState::Parking) {
                    if let Some(t) = w.thread() {
                        tracing_feat!(trace!(worker = idx, "unparking random candidate"));
                        t.unpark();
                        return;
                    }
                }
            }
        }
    }
}

impl std::fmt::Display for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = &self.0;
        let created = inner.created_workers();

        let mut cpu = 0usize;
        let mut blocking = 0usize;
        let mut parked = 0usize;
        let mut finished = 0usize;
        let mut queues = Vec::with_capacity(created);

        for i in 0..created {
            let Some(w) = inner.worker_at(i) else { continue };
            let suffix = match w.state() {
                WorkerState::CpuAcquired => {
                    cpu += 1;
                    'c'
                }
                WorkerState::Blocking => {
                    blocking += 1;
                    'b'
                }
                WorkerState::Parking => {
                    parked += 1;
                    'r'
                }
                WorkerState::Retiring => 'r',
                WorkerState::Finished => {
                    finished += 1;
                    'r'
                }
            };
            queues.push(format!("{}{}", w.queue.size(), suffix));
        }

        write!(
            f,
            "[core pool size = {}, CPU workers = {}, blocking workers = {}, parked workers = {}, retired workers = {}, finished workers = {}, running workers queues = [{}], global queue size = {}]",
            inner.core_pool_size,
            cpu,
            blocking,
            parked,
            inner.retired.len(),
            finished,
            queues.join(", "),
            inner.global.len(),
        )
    }
}
