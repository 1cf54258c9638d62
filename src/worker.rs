use std::cell::{Cell, UnsafeCell};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;
use std::thread::Thread;
use std::time::Duration;

use crate::constants::{
    max_park_time, min_park_time_ns, MAX_SPINS, MAX_YIELDS, STEAL_ATTEMPTS,
    WORK_STEALING_TIME_RESOLUTION_NS,
};
use crate::macros::tracing_feat;
use crate::queue::WorkQueue;
use crate::rng::Xorshift32;
use crate::scheduler::Inner;
use crate::task::{TaskMode, TypeErasedTask};

/// A worker's position in the state machine described for §4.5. Backed by a
/// single `AtomicU8` so other threads (the scheduler, thieves) can read it
/// without locking; only the owning worker ever writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    CpuAcquired = 0,
    Blocking = 1,
    Parking = 2,
    Retiring = 3,
    Finished = 4,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkerState::CpuAcquired,
            1 => WorkerState::Blocking,
            2 => WorkerState::Parking,
            3 => WorkerState::Retiring,
            _ => WorkerState::Finished,
        }
    }
}

/// Everything pinned to one worker index. Shared (`Arc`) between the
/// scheduler's `workers[i]` slot, the running thread, and any thief that
/// steals from `queue`. The scratch fields (`rng`, `spins`, `yields`,
/// `park_time_ns`, `last_exhaustion_ns`) live in `UnsafeCell`s because only
/// the owning worker thread ever touches them, the same discipline already
/// used by `WorkQueue`'s owner-only push path.
pub struct WorkerCore {
    pub index: usize,
    pub queue: WorkQueue,
    state: AtomicU8,
    thread: OnceLock<Thread>,
    rng: UnsafeCell<Xorshift32>,
    spins: UnsafeCell<u32>,
    yields: UnsafeCell<u32>,
    park_time_ns: UnsafeCell<u64>,
    last_exhaustion_ns: UnsafeCell<u64>,
}

unsafe impl Sync for WorkerCore {}

impl WorkerCore {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            queue: WorkQueue::new(),
            state: AtomicU8::new(WorkerState::Retiring as u8),
            thread: OnceLock::new(),
            rng: UnsafeCell::new(Xorshift32::for_worker(index)),
            spins: UnsafeCell::new(0),
            yields: UnsafeCell::new(0),
            park_time_ns: UnsafeCell::new(min_park_time_ns()),
            last_exhaustion_ns: UnsafeCell::new(0),
        }
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn thread(&self) -> Option<&Thread> {
        self.thread.get()
    }

    fn publish_thread(&self) {
        let _ = self.thread.set(std::thread::current());
    }

    /// # Safety: only ever called from the owning worker thread.
    fn rng_next_bound(&self, bound: usize) -> usize {
        unsafe { (*self.rng.get()).next_bound(bound) }
    }

    fn reset_spins_yields(&self) {
        unsafe {
            *self.spins.get() = 0;
            *self.yields.get() = 0;
        }
    }

    fn park_time_ns(&self) -> u64 {
        unsafe { *self.park_time_ns.get() }
    }

    fn set_park_time_ns(&self, value: u64) {
        unsafe {
            *self.park_time_ns.get() = value;
        }
    }

    fn bump_park_time(&self) {
        let next = ((self.park_time_ns() as f64) * 1.5) as u64;
        self.set_park_time_ns(next.min(crate::constants::MAX_PARK_TIME_NS));
    }

    fn last_exhaustion_ns(&self) -> u64 {
        unsafe { *self.last_exhaustion_ns.get() }
    }

    fn set_last_exhaustion_ns(&self, value: u64) {
        unsafe {
            *self.last_exhaustion_ns.get() = value;
        }
    }
}

thread_local! {
    static CURRENT: Cell<Option<(*const (), *const WorkerCore)>> = const { Cell::new(None) };
}

fn set_current(scheduler: *const (), core: *const WorkerCore) {
    CURRENT.with(|c| c.set(Some((scheduler, core))));
}

fn clear_current() {
    CURRENT.with(|c| c.set(None));
}

/// Returns the calling thread's `WorkerCore` if it is a worker of the
/// scheduler identified by `scheduler`, and `None` otherwise (including when
/// the calling thread is not a worker at all).
///
/// # Safety
/// The returned pointer is only valid for as long as the originating
/// `run_worker` call is still on the stack of the calling thread, which is
/// always true for any caller reached synchronously from within a task.
pub(crate) fn current_worker(scheduler: *const ()) -> Option<*const WorkerCore> {
    CURRENT.with(|c| c.get()).and_then(|(s, core)| if s == scheduler { Some(core) } else { None })
}

pub(crate) fn run_worker(scheduler: crate::scheduler::Scheduler, core: std::sync::Arc<WorkerCore>) {
    let inner = scheduler.inner_arc();
    let identity: *const () = std::sync::Arc::as_ptr(&inner).cast();

    core.publish_thread();
    set_current(identity, std::sync::Arc::as_ptr(&core));

    tracing_feat!(info!(worker = core.index, "worker started"));
    inner.hooks().call_on_start_fn();

    {
        let core = core.clone();
        let inner = inner.clone();
        crate::defer!(move || {
            clear_current();
            finish(&core, &inner);
            inner.hooks().call_on_stop_fn();
            tracing_feat!(info!(worker = core.index, "worker stopped"));
        });

        loop {
            if inner.is_terminated() {
                break;
            }

            match find_task(&core, &inner) {
                Some(task) => {
                    let mode = task.mode();
                    idle_reset(&core, mode);
                    maybe_enter_blocking(&core, &inner, mode);

                    before_task(&core, &inner, &task);

                    inner.hooks().call_before_work_fn();
                    task.run();
                    inner.hooks().call_after_work_fn();

                    after_task(&core, &inner);
                }
                None => idle(&core, &inner),
            }
        }
    }
}

fn finish(core: &WorkerCore, inner: &Inner) {
    if matches!(core.state(), WorkerState::CpuAcquired) {
        inner.permits().release();
    }
    if matches!(core.state(), WorkerState::Blocking) {
        inner.dec_blocking_workers();
    }
    inner.retired().remove(core.index);
    core.set_state(WorkerState::Finished);
}

fn try_acquire_cpu(core: &WorkerCore, inner: &Inner) -> bool {
    if matches!(core.state(), WorkerState::CpuAcquired) {
        return true;
    }

    if inner.permits().try_acquire() {
        core.set_state(WorkerState::CpuAcquired);
        true
    } else {
        false
    }
}

fn find_task(core: &WorkerCore, inner: &Inner) -> Option<TypeErasedTask> {
    let has_permit = try_acquire_cpu(core, inner);

    if has_permit {
        if let Some(task) = inner.global().pop() {
            return Some(task);
        }
    }

    if let Some(task) = core.queue.poll() {
        return Some(task);
    }

    if has_permit {
        try_steal(core, inner)
    } else {
        None
    }
}

fn try_steal(core: &WorkerCore, inner: &Inner) -> Option<TypeErasedTask> {
    let created = inner.created_workers();
    if created < 2 {
        return None;
    }

    for _ in 0..STEAL_ATTEMPTS {
        let victim_idx = core.rng_next_bound(created);
        if victim_idx == core.index {
            continue;
        }

        let Some(victim) = inner.worker_at(victim_idx) else {
            continue;
        };

        if core.queue.try_steal(&victim.queue, inner.global()) {
            tracing_feat!(trace!(worker = core.index, victim = victim_idx, "stole a task"));
            return core.queue.poll();
        }
    }

    None
}

fn idle_reset(core: &WorkerCore, mode: TaskMode) {
    if matches!(core.state(), WorkerState::Parking) && mode == TaskMode::ProbablyBlocking {
        core.set_state(WorkerState::Blocking);
        core.set_park_time_ns(min_park_time_ns());
    }
    core.reset_spins_yields();
}

fn maybe_enter_blocking(core: &WorkerCore, inner: &Inner, mode: TaskMode) {
    if mode == TaskMode::ProbablyBlocking && matches!(core.state(), WorkerState::CpuAcquired) {
        // Increment blockingWorkers before releasing the permit so a
        // concurrent requestCpuWorker's starvation check already counts
        // this thread as blocking (§4.5's ordering constraint).
        inner.inc_blocking_workers();
        core.set_state(WorkerState::Blocking);
        inner.permits().release();
        inner.request_cpu_worker();
    }
}

fn before_task(core: &WorkerCore, inner: &Inner, task: &TypeErasedTask) {
    if task.mode() != TaskMode::NonBlocking {
        return;
    }

    if inner.permits().available() == 0 {
        return;
    }

    let now = crate::clock::now_ns();
    let age = now.saturating_sub(task.submitted_at());
    if age < WORK_STEALING_TIME_RESOLUTION_NS {
        return;
    }

    if now.saturating_sub(core.last_exhaustion_ns()) < 5 * WORK_STEALING_TIME_RESOLUTION_NS {
        return;
    }

    core.set_last_exhaustion_ns(now);
    tracing_feat!(trace!(worker = core.index, "exhaustion-driven wakeup"));
    inner.request_cpu_worker();
}

fn after_task(core: &WorkerCore, inner: &Inner) {
    if matches!(core.state(), WorkerState::Blocking) {
        core.set_state(WorkerState::Retiring);
        inner.dec_blocking_workers();
    }
}

fn idle(core: &WorkerCore, inner: &Inner) {
    if matches!(core.state(), WorkerState::CpuAcquired) {
        adaptive_idle(core, inner);
    } else {
        blocking_idle(core, inner);
    }
}

fn adaptive_idle(core: &WorkerCore, inner: &Inner) {
    let spins = unsafe { *core.spins.get() };
    if spins < MAX_SPINS {
        unsafe {
            *core.spins.get() += 1;
        }
        std::hint::spin_loop();
        return;
    }

    let yields = unsafe { *core.yields.get() };
    if yields < MAX_YIELDS {
        unsafe {
            *core.yields.get() += 1;
        }
        std::thread::yield_now();
        return;
    }

    core.bump_park_time();
    inner.permits().release();
    core.set_state(WorkerState::Parking);

    inner.hooks().call_on_park_fn();
    tracing_feat!(trace!(worker = core.index, park_time_ns = core.park_time_ns(), "parking (adaptive)"));
    std::thread::park_timeout(Duration::from_nanos(core.park_time_ns()).min(max_park_time()));
    inner.hooks().call_on_unpark_fn();

    core.set_state(WorkerState::Retiring);
    core.reset_spins_yields();
}

fn blocking_idle(core: &WorkerCore, inner: &Inner) {
    core.set_state(WorkerState::Parking);
    inner.retired().push(core.index);

    inner.hooks().call_on_park_fn();
    tracing_feat!(trace!(worker = core.index, "parking indefinitely (retired)"));
    std::thread::park();
    inner.hooks().call_on_unpark_fn();

    // Defensive: cover the case where this worker woke on its own (e.g. the
    // unconditional shutdown unpark) rather than being popped by
    // requestCpuWorker.
    inner.retired().remove(core.index);
    core.set_state(WorkerState::Retiring);
}
