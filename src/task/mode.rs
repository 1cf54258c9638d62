/// Hints the scheduler about whether a task is expected to block its worker.
///
/// `NonBlocking` tasks count toward [`CpuPermits`](crate::permits::CpuPermits);
/// `ProbablyBlocking` tasks do not, and instead push their worker into the
/// `BLOCKING` state for the duration of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMode {
    NonBlocking,
    ProbablyBlocking,
}

impl Default for TaskMode {
    fn default() -> Self {
        TaskMode::NonBlocking
    }
}
