use crate::hooks::Hooks;
use crate::scheduler::Scheduler;

/// Builder for a [`Scheduler`]. Validated only at [`build`](Self::build),
/// fail-fast: invalid sizes are rejected synchronously rather than panicking
/// somewhere deep in worker machinery.
pub struct SchedulerBuilder {
    core_pool_size: usize,
    max_pool_size: Option<usize>,
    stack_size: Option<usize>,
    hooks: Hooks,
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self {
            core_pool_size: num_cpus::get(),
            max_pool_size: None,
            stack_size: None,
            hooks: Hooks::new(),
        }
    }

    /// Sets `corePoolSize`, the number of CPU permits and the floor
    /// `requestCpuWorker` creates workers up to. Must be at least 1.
    pub fn core_pool_size(&mut self, size: usize) -> &mut Self {
        self.core_pool_size = size;
        self
    }

    /// Sets `maxPoolSize`, the ceiling on created workers. Defaults to
    /// `corePoolSize` if never called. Must be `>= corePoolSize`.
    pub fn max_pool_size(&mut self, size: usize) -> &mut Self {
        self.max_pool_size = Some(size);
        self
    }

    /// Sets the stack size for spawned worker threads.
    pub fn stack_size(&mut self, size: usize) -> &mut Self {
        self.stack_size = Some(size);
        self
    }

    /// Configures the hooks invoked on threadpool lifecycle events.
    pub fn with_hooks(&mut self, fun: impl FnOnce(&mut Hooks)) -> &mut Self {
        fun(&mut self.hooks);
        self
    }

    /// Validates and constructs the `Scheduler`. Workers are not created
    /// eagerly here; the first dispatches create them up to `corePoolSize`
    /// via the ordinary `requestCpuWorker` path.
    pub fn build(&mut self) -> Result<Scheduler, BuildError> {
        if self.core_pool_size == 0 {
            return Err(BuildError::ZeroCorePoolSize);
        }

        let max_pool_size = self.max_pool_size.unwrap_or(self.core_pool_size);
        if max_pool_size < self.core_pool_size {
            return Err(BuildError::MaxPoolSizeBelowCore {
                core: self.core_pool_size,
                max: max_pool_size,
            });
        }

        let hooks = std::mem::replace(&mut self.hooks, Hooks::new());

        Ok(Scheduler::new(self.core_pool_size, max_pool_size, self.stack_size, hooks))
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration faults rejected by [`SchedulerBuilder::build`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildError {
    ZeroCorePoolSize,
    MaxPoolSizeBelowCore { core: usize, max: usize },
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::ZeroCorePoolSize => write!(f, "core pool size must be at least 1"),
            BuildError::MaxPoolSizeBelowCore { core, max } => {
                write!(f, "max pool size ({max}) must be >= core pool size ({core})")
            }
        }
    }
}

impl std::error::Error for BuildError {}
