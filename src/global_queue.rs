use crossbeam_queue::SegQueue;

use crate::task::TypeErasedTask;

/// Unbounded multi-producer/multi-consumer FIFO queue for externally
/// submitted tasks and local-queue overflow. A `crossbeam_deque::Injector`
/// would also fit this shape, but there are no per-worker stealer handles to
/// hand out here, so `crossbeam-queue`'s plain `SegQueue` is enough.
pub struct GlobalQueue {
    inner: SegQueue<TypeErasedTask>,
}

impl GlobalQueue {
    pub fn new() -> Self {
        Self { inner: SegQueue::new() }
    }

    pub fn push(&self, task: TypeErasedTask) {
        self.inner.push(task);
    }

    pub fn pop(&self) -> Option<TypeErasedTask> {
        self.inner.pop()
    }

    /// Approximate length; non-atomic snapshot, fine for diagnostics only.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
