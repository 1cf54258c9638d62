use std::{mem::MaybeUninit, ptr::NonNull, sync::{Arc, Mutex}};

use crate::{hooks::Hooks, task::state::Snapshot, JoinResult};

use super::{mode::TaskMode, park::Parker, runnable::Runnable, state::State, vtable::VTable};

#[repr(C)]
/// A task that can be run by the executor.
pub struct Task<T, R> {
    header: Header,
    function: MaybeUninit<T>,
    output: MaybeUninit<JoinResult<R>>,
}

/// Header of the task, used to interact with the task
pub struct Header {
    vtable: &'static VTable,
    pub(crate) state: State,
    parker: Mutex<Parker>,
    /// Monotonic dispatch timestamp, set once and never mutated afterward.
    submitted_at: u64,
    mode: TaskMode,
    /// Shared with the owning scheduler so `runSafely` can report an
    /// uncaught fault without plumbing scheduler state through the run path.
    hooks: Arc<Hooks>,
}

pub struct TypeErasedTask {
    pub(crate) header: NonNull<Header>
}

unsafe impl Send for TypeErasedTask {}
unsafe impl Sync for TypeErasedTask {}

impl<T, R> Task<T, R>
where
    T: Runnable<Output = R>,
{
    pub fn new(runnable: T, submitted_at: u64, mode: TaskMode, hooks: Arc<Hooks>) -> Self {
        Self {
            header: Header {
                vtable: vtable::vtable::<T>(),
                state: State::new(),
                parker: Default::default(),
                submitted_at,
                mode,
                hooks,
            },
            function: MaybeUninit::new(runnable),
            output: MaybeUninit::uninit(),
        }
    }

    pub fn erase(self) -> TypeErasedTask {
        let header = Box::into_raw(Box::new(self)).cast::<Header>();
        
        unsafe {
            // set the executor alive flag
            (*header).state.set(State::EXECUTOR_ALIVE, true);
        }

        TypeErasedTask {
            header: NonNull::new(header).unwrap()
        }
    }
}

impl Header {
    fn run(this: NonNull<Self>) {
        unsafe {
            let run_fn = this.as_ref().vtable.run;
            run_fn(this.cast());

            this.as_ref().wake();
        }
    }

    fn abort(this: NonNull<Self>) {
        unsafe {
            let abort_fn = this.as_ref().vtable.abort;
            abort_fn(this.cast());

            this.as_ref().wake();
        }
    }

    pub fn try_dealloc(this: NonNull<Self>) -> bool {
        unsafe {
            let dealloc_fn = this.as_ref().vtable.drop;
            dealloc_fn(this.cast())
        }
    }

    fn wake(&self) {
        self.parker.lock().unwrap_or_else(|s| s.into_inner())
                .take()
                .wake();
    }

    pub unsafe fn try_get_output(this: NonNull<Self>, dest: *mut ()) {
        unsafe {
            let get_output_fn = this.as_ref().vtable.take_output;
            get_output_fn(this.cast(), dest)
        }
    }

    #[inline(always)]
    pub fn parker(&self) -> &Mutex<Parker> {
        &self.parker
    }

    pub fn mark_aborted(&self) {
        self.state.set(State::ABORTED, true);
    }

    pub fn set_handle_alive(&self, value: bool) {
        self.state.set(State::HANDLE_ALIVE, value);
    }

    /// Releases the executor's claim on this task, deallocating it if the
    /// handle side has already released too.
    pub(crate) fn release_executor(this: NonNull<Self>) {
        let safe = unsafe {
            this.as_ref().state.clear_and_check_other_clear(State::EXECUTOR_ALIVE, State::HANDLE_ALIVE)
        };
        if safe {
            Self::try_dealloc(this);
        }
    }

    /// Releases the handle's claim on this task, deallocating it if the
    /// executor side has already released too.
    pub(crate) fn release_handle(this: NonNull<Self>) {
        let safe = unsafe {
            this.as_ref().state.clear_and_check_other_clear(State::HANDLE_ALIVE, State::EXECUTOR_ALIVE)
        };
        if safe {
            Self::try_dealloc(this);
        }
    }

    pub fn state_snapshot(&self) -> Snapshot {
        self.state.snapshot()
    }

    pub fn submitted_at(&self) -> u64 {
        self.submitted_at
    }

    pub fn mode(&self) -> TaskMode {
        self.mode
    }
}

impl TypeErasedTask {
    pub fn run(self) {
        Header::run(self.header);
    }

    pub fn abort(&self) {
        Header::abort(self.header);
    }

    pub fn submitted_at(&self) -> u64 {
        unsafe { self.header.as_ref().submitted_at() }
    }

    pub fn mode(&self) -> TaskMode {
        unsafe { self.header.as_ref().mode() }
    }
}

impl Drop for TypeErasedTask {
    fn drop(&mut self) {
        // type erased task is only held by the executor, so this reflects
        // the executor releasing its claim on the task
        Header::release_executor(self.header);
    }
}


mod vtable {
    use std::{mem::MaybeUninit, panic::{catch_unwind, AssertUnwindSafe}, ptr::NonNull};

    use crate::{task::{runnable::Runnable, state::State, vtable::VTable}, JoinResult};

    use super::{Header, Task};

    /// Builds a standalone panic payload describing the failure, independent
    /// of the one stored in `JoinResult` so the uncaught-fault hook never
    /// races a `JoinHandle` for ownership of the original box.
    fn describe_panic(payload: &Box<dyn std::any::Any + Send + 'static>) -> Box<dyn std::any::Any + Send + 'static> {
        if let Some(s) = payload.downcast_ref::<&'static str>() {
            Box::new(*s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            Box::new(s.clone())
        } else {
            Box::new("task panicked with a non-string payload")
        }
    }

    pub fn vtable<T>() -> &'static VTable 
    where
        T: Runnable
    {
        &VTable {
            run: run::<T>,
            abort: abort,
            drop: try_dealloc::<T>,
            take_output: try_get_output::<T>,
        }
    }

    unsafe fn run<T>(ptr: NonNull<()>) 
    where
        T: Runnable
    {
        let header = unsafe {
            ptr.cast::<Header>().as_ref()
        };

        assert!(!header.state.get(State::RUNNING));
        assert!(!header.state.get(State::FINISHED));

        if header.state.get(State::ABORTED) {
            return;
        }

        header.state.set(State::RUNNING, true);

        let mut ptr = ptr.cast::<Task<T, T::Output>>();

        let task = unsafe {
            ptr.as_mut()
        };

        let runnable = unsafe {
            std::mem::replace(&mut task.function, MaybeUninit::uninit())
                .assume_init()
        };

        let result = catch_unwind(AssertUnwindSafe(|| runnable.run()));

        if let Err(payload) = &result {
            header.state.set(State::PANICKED, true);
            header.hooks.call_on_uncaught_fault_fn(describe_panic(payload));
        }

        task.output = MaybeUninit::new(result);

        task.header.state.set(State::RUNNING, false);
        task.header.state.set(State::FINISHED, true);
        task.header.state.set(State::OUTPUT_READY, true);

        task.header.wake();
    }

    unsafe fn abort(ptr: NonNull<()>) {
        let header = unsafe {
            ptr.cast::<Header>().as_ref()
        };

        // just set aborted flag
        header.state.set(State::ABORTED, true);
    }

    unsafe fn try_dealloc<T>(ptr: NonNull<()>) -> bool 
    where
        T: Runnable
    {
        let header = unsafe {
            ptr.cast::<Header>().as_ref()
        };

        if header.state.get(State::HANDLE_ALIVE) 
            || header.state.get(State::EXECUTOR_ALIVE) 
        {
            return false;
        }

        // drop the task
        let mut task = ptr.cast::<Task<T, T::Output>>();
        
        unsafe  {
            let task_mut = task.as_mut();

            // if finished flag is not set, the function is still there
            if !task_mut.header.state.get(State::FINISHED) {
                task_mut.function.assume_init_drop();
            }

            // if output flag is set, the output is there
            if task_mut.header.state.get(State::OUTPUT_READY) 
                && !task_mut.header.state.get(State::OUTPUT_TAKEN)
            {
                task_mut.output.assume_init_drop();
            }

            // drop the task
            drop(Box::from_raw(task.as_ptr()));
        }

        true
    }

    unsafe fn try_get_output<T>(ptr: NonNull<()>, dest: *mut ())
    where
        T: Runnable
    {
        let header = unsafe {
            ptr.cast::<Header>().as_ref()
        };

        if !header.state.get(State::OUTPUT_READY)
            || header.state.get(State::OUTPUT_TAKEN)
        {
            return;
        }

        header.state.set(State::OUTPUT_TAKEN, true);

        let dest = dest.cast::<Option<JoinResult<T::Output>>>();

        let mut task = ptr.cast::<Task<T, T::Output>>();

        unsafe {
            let output = std::mem::replace(&mut task.as_mut().output, MaybeUninit::uninit())
                .assume_init();

            *dest = Some(output);
            task.as_mut().header.state.set(State::OUTPUT_TAKEN, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{hooks::Hooks, task::{mode::TaskMode, state::State}, JoinResult};

    use super::Task;

    fn hooks() -> Arc<Hooks> {
        Arc::new(Hooks::new())
    }

    #[test]
    fn runnable() {
        print!("Runnable ran")
    }

    #[test]
    pub fn create_drop_task() {
        let _task = Task::new(runnable, 0, TaskMode::NonBlocking, hooks());
    }

    #[test]
    pub fn create_drop_erased() {
        let task = Task::new(runnable, 0, TaskMode::NonBlocking, hooks());
        let _erased = task.erase();
    }

    #[test]
    pub fn create_run_erased() {
        let task = Task::new(runnable, 0, TaskMode::NonBlocking, hooks());
        let erased = task.erase();
        erased.run();
    }

    #[test]
    pub fn create_take_output() {
        let task = Task::new(|| {
            runnable();
            "foo"
        }, 0, TaskMode::NonBlocking, hooks());

        let erased = task.erase();
        let header = erased.header;

        unsafe {
            // this is technically not a handle, but put this flag to avoid
            // deallocating the task when running
            header.as_ref().state.set(State::HANDLE_ALIVE, true);
        }
        erased.run();

        let mut output = Option::<JoinResult<&'static str>>::None;

        unsafe {
            let get_output_fn = header.as_ref().vtable.take_output;
            get_output_fn(header.cast(), &mut output as *mut _ as *mut ());
        }

        assert!(output.is_some());
        assert_eq!(output.unwrap().unwrap(), "foo");

        let header_ref = unsafe { header.as_ref() };

        assert!(!header_ref.state.get(State::RUNNING));
        assert!(header_ref.state.get(State::FINISHED));
        assert!(header_ref.state.get(State::OUTPUT_READY));
        assert!(header_ref.state.get(State::OUTPUT_TAKEN));
        assert!(!header_ref.state.get(State::EXECUTOR_ALIVE));

        unsafe {
            header.as_ref().state.set(State::HANDLE_ALIVE, false);

            let drop_fn = header.as_ref().vtable.drop;
            drop_fn(header.cast());
        }
    }

    #[test]
    pub fn panicking_runnable_reports_to_uncaught_hook_and_join_result() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let reported = Arc::new(AtomicBool::new(false));
        let reported_clone = reported.clone();

        let mut hooks = Hooks::new();
        hooks.set_on_uncaught_fault_fn(move |_payload| {
            reported_clone.store(true, Ordering::SeqCst);
        });

        let task = Task::new(
            || -> () { panic!("boom") },
            0,
            TaskMode::NonBlocking,
            Arc::new(hooks),
        );
        let erased = task.erase();
        let header = erased.header;

        unsafe {
            header.as_ref().state.set(State::HANDLE_ALIVE, true);
        }

        erased.run();

        assert!(reported.load(Ordering::SeqCst));

        let mut output = Option::<JoinResult<()>>::None;
        unsafe {
            let get_output_fn = header.as_ref().vtable.take_output;
            get_output_fn(header.cast(), &mut output as *mut _ as *mut ());

            header.as_ref().state.set(State::HANDLE_ALIVE, false);
            let drop_fn = header.as_ref().vtable.drop;
            drop_fn(header.cast());
        }

        assert!(output.unwrap().is_err());
    }
}
