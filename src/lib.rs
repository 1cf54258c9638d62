use std::any::Any;

mod builder;
mod clock;
mod constants;
mod defer;
mod global_queue;
mod hooks;
mod join;
mod macros;
mod permits;
mod queue;
mod retired;
mod rng;
mod scheduler;
mod task;
mod worker;

pub use builder::{BuildError, SchedulerBuilder};
pub use hooks::Hooks;
pub use join::JoinHandle;
pub use scheduler::Scheduler;
pub use task::{Runnable, TaskMode};

pub type JoinResult<T> = Result<T, Box<dyn Any + Send + 'static>>;
