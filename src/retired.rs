use std::sync::Mutex;

/// Indices of workers that finished their local queue while not holding a CPU
/// permit and parked themselves indefinitely, waiting to be revived.
///
/// A mutex-guarded `Vec` rather than a lock-free Treiber stack: the
/// collection is tiny and rarely contended, and this codebase already guards
/// its worker registry the same way (a coarse lock over a small `Vec`). LIFO
/// pop still gives the cache-warmth property a stack is chosen for.
pub struct RetiredStack {
    indices: Mutex<Vec<usize>>,
}

impl RetiredStack {
    pub fn new() -> Self {
        Self {
            indices: Mutex::new(Vec::new()),
        }
    }

    /// Enrolls a worker index. A worker should only ever call this for
    /// itself, and only once per retirement.
    pub fn push(&self, index: usize) {
        let mut guard = self.indices.lock().unwrap_or_else(|e| e.into_inner());
        debug_assert!(
            !guard.contains(&index),
            "worker {index} enrolled into the retired stack twice"
        );
        guard.push(index);
    }

    /// Pops the most-recently-retired worker index, if any.
    pub fn pop(&self) -> Option<usize> {
        let mut guard = self.indices.lock().unwrap_or_else(|e| e.into_inner());
        guard.pop()
    }

    /// Removes a specific worker index if it is present (used when a worker
    /// wakes up on its own, e.g. via the scheduler's unconditional shutdown
    /// unpark, without having been popped by `requestCpuWorker`).
    pub fn remove(&self, index: usize) {
        let mut guard = self.indices.lock().unwrap_or_else(|e| e.into_inner());
        guard.retain(|&i| i != index);
    }

    pub fn len(&self) -> usize {
        self.indices.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::RetiredStack;

    #[test]
    fn pop_returns_most_recently_pushed() {
        let stack = RetiredStack::new();
        stack.push(1);
        stack.push(2);
        stack.push(3);

        assert_eq!(stack.pop(), Some(3));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn remove_drops_a_specific_entry() {
        let stack = RetiredStack::new();
        stack.push(1);
        stack.push(2);
        stack.remove(1);

        assert_eq!(stack.len(), 1);
        assert_eq!(stack.pop(), Some(2));
    }
}
