//! Tunable constants shared by the queue, worker loop and dispatcher.

use std::time::Duration;

/// Capacity of a single worker's local ring buffer. Must be a power of two.
pub const LOCAL_QUEUE_CAPACITY: usize = 256;

/// Local-queue watermark past which `dispatch` requests help from the pool.
pub const QUEUE_SIZE_OFFLOAD_THRESHOLD: usize = LOCAL_QUEUE_CAPACITY - (LOCAL_QUEUE_CAPACITY / 4);

/// Minimum age, in nanoseconds, a task must have before it becomes eligible
/// for work stealing. Preserves producer/consumer locality on the owner.
pub const WORK_STEALING_TIME_RESOLUTION_NS: u64 = 100_000; // 100 us

/// How many random victims `trySteal` probes before giving up.
pub const STEAL_ATTEMPTS: usize = 4;

/// Busy-spin iterations before a CPU-holding idle worker starts yielding.
pub const MAX_SPINS: u32 = 1000;

/// Thread-yield iterations before a CPU-holding idle worker starts parking.
pub const MAX_YIELDS: u32 = 500;

pub const MAX_PARK_TIME_NS: u64 = 1_000_000_000; // 1 s

pub fn min_park_time_ns() -> u64 {
    (WORK_STEALING_TIME_RESOLUTION_NS / 4).clamp(10, MAX_PARK_TIME_NS)
}

pub fn max_park_time() -> Duration {
    Duration::from_nanos(MAX_PARK_TIME_NS)
}
