//! Per-worker random source used for victim selection.
//!
//! `fastrand::usize(0..n)` would be the obvious pick for victim selection,
//! but it generates via wyrand, not xorshift32. Victim selection here is
//! required to be a Marsaglia xorshift32, so it is hand-rolled instead: one
//! state word per worker, seeded once at worker creation so no two workers
//! in the same process start from the same sequence.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Mixed into every freshly-seeded RNG so that two schedulers created back to
/// back (or two workers created on the same nanosecond) don't collide.
static SEED_COUNTER: AtomicU32 = AtomicU32::new(0);

/// A single xorshift32 state word. `nextInt`'s fast path assumes the caller
/// passes a power-of-two bound; anything else falls back to modulo, which is
/// fine for victim selection (not security sensitive).
pub struct Xorshift32 {
    state: u32,
}

impl Xorshift32 {
    /// Derives a seed for worker `worker_index` from a shared, ever-advancing
    /// counter plus the current time, and builds a generator from it. The
    /// state is never allowed to be zero, which would fix the sequence.
    pub fn for_worker(worker_index: usize) -> Self {
        let counter = SEED_COUNTER.fetch_add(1, Ordering::Relaxed);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);

        let mut seed = counter
            ^ nanos
            ^ (worker_index as u32).wrapping_mul(0x9E3779B1);

        if seed == 0 {
            seed = 0x2545_F491;
        }

        Self { state: seed }
    }

    /// Advances the state and returns the next `u32`.
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Returns a value in `[0, bound)`. `bound` must be nonzero.
    pub fn next_bound(&mut self, bound: usize) -> usize {
        debug_assert!(bound > 0, "next_bound called with a zero bound");

        if bound.is_power_of_two() {
            (self.next_u32() as usize) & (bound - 1)
        } else {
            (self.next_u32() as usize) % bound
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Xorshift32;

    #[test]
    fn never_produces_a_stuck_zero_state() {
        let mut rng = Xorshift32::for_worker(0);
        for _ in 0..1000 {
            rng.next_u32();
        }
    }

    #[test]
    fn bound_respects_range() {
        let mut rng = Xorshift32::for_worker(3);
        for _ in 0..1000 {
            assert!(rng.next_bound(7) < 7);
            assert!(rng.next_bound(8) < 8);
        }
    }

    #[test]
    fn distinct_workers_diverge() {
        let mut a = Xorshift32::for_worker(0);
        let mut b = Xorshift32::for_worker(1);

        let seq_a: Vec<u32> = (0..8).map(|_| a.next_u32()).collect();
        let seq_b: Vec<u32> = (0..8).map(|_| b.next_u32()).collect();

        assert_ne!(seq_a, seq_b);
    }
}
