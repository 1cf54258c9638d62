use std::sync::atomic::{AtomicUsize, Ordering};

/// A counting semaphore gating admission to CPU-bound scheduling.
///
/// Implemented directly over an atomic counter rather than a blocking
/// semaphore: every caller only ever *tries* to acquire (never waits), so a
/// CAS loop is simpler and cheaper than pulling in a blocking primitive.
pub struct CpuPermits {
    available: AtomicUsize,
    total: usize,
}

impl CpuPermits {
    pub fn new(total: usize) -> Self {
        Self {
            available: AtomicUsize::new(total),
            total,
        }
    }

    /// Tries to take one permit. Returns `true` if one was available.
    pub fn try_acquire(&self) -> bool {
        let mut current = self.available.load(Ordering::Acquire);

        loop {
            if current == 0 {
                return false;
            }

            match self.available.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Releases one permit back to the pool.
    pub fn release(&self) {
        let prev = self.available.fetch_add(1, Ordering::AcqRel);
        debug_assert!(prev < self.total, "released more CPU permits than exist");
    }

    /// Approximate count of currently available permits.
    pub fn available(&self) -> usize {
        self.available.load(Ordering::Acquire)
    }

    /// The fixed total number of permits (== `corePoolSize`).
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of permits currently held by some worker.
    pub fn in_use(&self) -> usize {
        self.total.saturating_sub(self.available())
    }
}

#[cfg(test)]
mod tests {
    use super::CpuPermits;

    #[test]
    fn acquire_drains_to_zero_then_refuses() {
        let permits = CpuPermits::new(2);
        assert!(permits.try_acquire());
        assert!(permits.try_acquire());
        assert!(!permits.try_acquire());
        assert_eq!(permits.available(), 0);
    }

    #[test]
    fn release_makes_a_permit_available_again() {
        let permits = CpuPermits::new(1);
        assert!(permits.try_acquire());
        assert!(!permits.try_acquire());
        permits.release();
        assert!(permits.try_acquire());
    }

    #[test]
    fn in_use_tracks_outstanding_permits() {
        let permits = CpuPermits::new(4);
        permits.try_acquire();
        permits.try_acquire();
        assert_eq!(permits.in_use(), 2);
    }
}
