//! Monotonic nanosecond clock used for submission timestamps and the
//! temporal-affinity steal check.
//!
//! `Instant` itself has no stable epoch, so a process-wide reference point is
//! captured lazily on first use and every reading is relative to it.

use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Nanoseconds elapsed since this process's first call into the clock.
pub fn now_ns() -> u64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    Instant::now().saturating_duration_since(*epoch).as_nanos() as u64
}
