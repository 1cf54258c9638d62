//! Per-worker local run queue.
//!
//! Two tiers, grounded on tokio's `queue.rs` CAS ring buffer:
//!
//! - a single `head_slot` fast path (the old tokio thread pool's `lifo_slot`)
//!   that gives a freshly-dispatched task near-zero latency to its worker and
//!   implements the semi-FIFO coupling described for `add`;
//! - a fixed-capacity ring buffer behind it, claimed by a single atomic CAS
//!   on a monotonic head counter. Tokio's own ring buffer packs a second
//!   `steal` counter into the head word so a thief can reserve a *batch* of
//!   tasks without blocking the owner mid-transfer; this queue only ever
//!   steals one task at a time; there is nothing to reserve a batch for, so
//!   that second counter is dropped and the head word is a plain index.
//!
//! Both the owner's `poll` and a thief's `trySteal` race for ring-buffer
//! slots via `compare_exchange` on the same head counter: whichever wins
//! advances it, the loser either retries (owner) or backs off (thief).
//! Contended steals therefore never block, matching the WorkQueue contract.
//!
//! A slot holds a `TypeErasedTask`, i.e. a pointer to a separately
//! heap-allocated `Header`. Only the *slot* is protected by the CAS; once a
//! task is visible in a slot, nothing stops its owner from concurrently
//! popping and running it (freeing the `Header`) while a thief is still
//! looking at that slot. So a thief must win the claiming CAS *before* it
//! ever dereferences the task to read `submitted_at` — peeking first and
//! claiming second would let the owner free the task out from under the
//! peek. Every steal path here claims unconditionally, then reads the age
//! of the task it now exclusively owns, and hands it to the global queue
//! instead of the stealer's own queue if it turns out to be too young.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

use crate::clock::now_ns;
use crate::constants::{LOCAL_QUEUE_CAPACITY, WORK_STEALING_TIME_RESOLUTION_NS};
use crate::global_queue::GlobalQueue;
use crate::task::TypeErasedTask;

const MASK: u32 = LOCAL_QUEUE_CAPACITY as u32 - 1;

const _: () = assert!(LOCAL_QUEUE_CAPACITY.is_power_of_two());

pub struct WorkQueue {
    /// Fast single-task path; holds a type-erased task header pointer or
    /// null. Only the owner ever stores into it unconditionally (`swap`); a
    /// thief claims it with a `compare_exchange` against the value it last
    /// observed, and only reads the task through it after winning that CAS.
    head_slot: AtomicPtr<()>,
    /// Consumer-side index into `buffer`, raced over by the owner's `poll`
    /// and any thief's `trySteal`.
    head: AtomicU32,
    /// Producer-side index. Only the owner ever writes it.
    tail: AtomicU32,
    buffer: Box<[UnsafeCell<MaybeUninit<TypeErasedTask>>]>,
}

unsafe impl Send for WorkQueue {}
unsafe impl Sync for WorkQueue {}

impl WorkQueue {
    pub fn new() -> Self {
        let mut buffer = Vec::with_capacity(LOCAL_QUEUE_CAPACITY);
        for _ in 0..LOCAL_QUEUE_CAPACITY {
            buffer.push(UnsafeCell::new(MaybeUninit::uninit()));
        }

        Self {
            head_slot: AtomicPtr::new(std::ptr::null_mut()),
            head: AtomicU32::new(0),
            tail: AtomicU32::new(0),
            buffer: buffer.into_boxed_slice(),
        }
    }

    /// Non-fair push: places `task` in the head slot, displacing whatever
    /// was there to the tail of the ring buffer. Always succeeds locally;
    /// only the *displaced* task can overflow to `global`.
    pub fn add(&self, task: TypeErasedTask, global: &GlobalQueue) -> bool {
        let new_ptr = Self::into_raw(task);
        let old_ptr = self.head_slot.swap(new_ptr, Ordering::AcqRel);

        if let Some(displaced) = Self::from_raw(old_ptr) {
            if let Err(overflow) = self.ring_push_back(displaced) {
                global.push(overflow);
            }
        }

        true
    }

    /// Fair push: strict tail insertion, bypassing the head slot entirely.
    /// Returns `false` if the incoming task itself had to go to `global`.
    pub fn add_last(&self, task: TypeErasedTask, global: &GlobalQueue) -> bool {
        match self.ring_push_back(task) {
            Ok(()) => true,
            Err(overflow) => {
                global.push(overflow);
                false
            }
        }
    }

    /// Owner-only pop: head slot first, then the ring buffer.
    pub fn poll(&self) -> Option<TypeErasedTask> {
        let slot = self.head_slot.swap(std::ptr::null_mut(), Ordering::AcqRel);
        if let Some(task) = Self::from_raw(slot) {
            return Some(task);
        }

        self.ring_pop_front()
    }

    /// Attempts to steal one task from `victim` into `self`'s own queue.
    /// Tries the victim's head slot first (the fallback that makes a
    /// head-slot-only owner, e.g. `corePoolSize == 1`, stealable at all once
    /// a second worker exists), then its ring buffer.
    pub fn try_steal(&self, victim: &WorkQueue, global: &GlobalQueue) -> bool {
        if let Some(task) = victim.try_steal_head_slot(global) {
            self.accept_stolen(task, global);
            return true;
        }

        if let Some(task) = victim.ring_try_steal_one(global) {
            self.accept_stolen(task, global);
            return true;
        }

        false
    }

    /// Approximate occupancy of the ring buffer only (head slot excluded).
    pub fn buffer_size(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        tail.wrapping_sub(head) as usize
    }

    /// Approximate total occupancy, including the head slot.
    pub fn size(&self) -> usize {
        let extra = if self.head_slot.load(Ordering::Relaxed).is_null() { 0 } else { 1 };
        self.buffer_size() + extra
    }

    fn accept_stolen(&self, task: TypeErasedTask, global: &GlobalQueue) {
        if let Err(overflow) = self.ring_push_back(task) {
            global.push(overflow);
        }
    }

    fn ring_push_back(&self, task: TypeErasedTask) -> Result<(), TypeErasedTask> {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Relaxed);

        if tail.wrapping_sub(head) >= LOCAL_QUEUE_CAPACITY as u32 {
            return Err(task);
        }

        let idx = (tail & MASK) as usize;
        unsafe {
            (*self.buffer[idx].get()).write(task);
        }
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    fn ring_pop_front(&self) -> Option<TypeErasedTask> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Acquire);

            if head == tail {
                return None;
            }

            let idx = (head & MASK) as usize;

            match self.head.compare_exchange(
                head,
                head.wrapping_add(1),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => unsafe {
                    let task = (*self.buffer[idx].get()).assume_init_read();
                    return Some(task);
                },
                Err(_) => continue,
            }
        }
    }

    /// Single-attempt steal: contended slots back off rather than retrying,
    /// per the WorkQueue contract. The slot is claimed unconditionally
    /// first; only once the task is exclusively owned here is it safe to
    /// dereference it and check its age. A claimed-but-too-young task is
    /// handed to `global` rather than returned, since it can no longer be
    /// put back in the victim's ring.
    fn ring_try_steal_one(&self, global: &GlobalQueue) -> Option<TypeErasedTask> {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);

        if head == tail {
            return None;
        }

        let idx = (head & MASK) as usize;

        self.head.compare_exchange(head, head.wrapping_add(1), Ordering::AcqRel, Ordering::Acquire).ok()?;

        let task = unsafe { (*self.buffer[idx].get()).assume_init_read() };

        if now_ns().saturating_sub(task.submitted_at()) < WORK_STEALING_TIME_RESOLUTION_NS {
            global.push(task);
            return None;
        }

        Some(task)
    }

    /// Same claim-before-read discipline as `ring_try_steal_one`, applied to
    /// the head slot.
    fn try_steal_head_slot(&self, global: &GlobalQueue) -> Option<TypeErasedTask> {
        let ptr = self.head_slot.load(Ordering::Acquire);
        if ptr.is_null() {
            return None;
        }

        let claimed = self
            .head_slot
            .compare_exchange(ptr, std::ptr::null_mut(), Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        let task = Self::from_raw(claimed)?;

        if now_ns().saturating_sub(task.submitted_at()) < WORK_STEALING_TIME_RESOLUTION_NS {
            global.push(task);
            return None;
        }

        Some(task)
    }

    /// Extracts the raw header pointer from a `TypeErasedTask` without
    /// running its `Drop` (which would tear down the task's executor-alive
    /// flag); ownership moves into the slot/atomic instead.
    fn into_raw(task: TypeErasedTask) -> *mut () {
        let ptr = task.header.as_ptr().cast();
        std::mem::forget(task);
        ptr
    }

    /// Reconstructs a `TypeErasedTask` from a pointer produced by
    /// `into_raw`. The caller must hold the only copy of `ptr`.
    fn from_raw(ptr: *mut ()) -> Option<TypeErasedTask> {
        NonNull::new(ptr).map(|header| TypeErasedTask { header: header.cast() })
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        // Drain the head slot and whatever remains in the ring buffer so
        // in-flight tasks run their drop glue instead of leaking.
        let slot = self.head_slot.swap(std::ptr::null_mut(), Ordering::AcqRel);
        drop(Self::from_raw(slot));

        while let Some(task) = self.ring_pop_front() {
            drop(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::global_queue::GlobalQueue;
    use crate::hooks::Hooks;
    use crate::task::{Task, TaskMode};

    use super::WorkQueue;

    fn task(mark: Arc<std::sync::atomic::AtomicUsize>, value: usize) -> crate::task::TypeErasedTask {
        Task::new(
            move || {
                mark.store(value, std::sync::atomic::Ordering::SeqCst);
            },
            crate::clock::now_ns(),
            TaskMode::NonBlocking,
            Arc::new(Hooks::new()),
        )
        .erase()
    }

    #[test]
    fn add_then_poll_returns_head_slot_task() {
        let queue = WorkQueue::new();
        let global = GlobalQueue::new();
        let mark = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        queue.add(task(mark.clone(), 1), &global);
        let polled = queue.poll().expect("task should be present");
        polled.run();

        assert_eq!(mark.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn semi_fifo_displaces_previous_head_to_tail() {
        let queue = WorkQueue::new();
        let global = GlobalQueue::new();
        let mark_a = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mark_b = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        queue.add(task(mark_a.clone(), 1), &global);
        queue.add(task(mark_b.clone(), 2), &global);

        // B (newest) should come back first.
        let first = queue.poll().expect("task present");
        first.run();
        assert_eq!(mark_b.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(mark_a.load(std::sync::atomic::Ordering::SeqCst), 0);

        let second = queue.poll().expect("task present");
        second.run();
        assert_eq!(mark_a.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn add_last_is_strict_fifo() {
        let queue = WorkQueue::new();
        let global = GlobalQueue::new();
        let mark_a = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mark_b = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        queue.add_last(task(mark_a.clone(), 1), &global);
        queue.add_last(task(mark_b.clone(), 2), &global);

        let first = queue.poll().expect("task present");
        first.run();
        assert_eq!(mark_a.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn young_tasks_are_not_stolen_into_the_thief_but_offloaded_to_global() {
        let victim = WorkQueue::new();
        let stealer = WorkQueue::new();
        let global = GlobalQueue::new();
        let mark = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        victim.add_last(task(mark, 1), &global);

        // The slot is claimed (it can't be peeked without owning it first),
        // found too young, and handed to the global queue rather than the
        // thief's own queue.
        assert!(!stealer.try_steal(&victim, &global));
        assert_eq!(victim.size(), 0);
        assert_eq!(stealer.size(), 0);
        assert_eq!(global.len(), 1);
    }

    #[test]
    fn empty_queue_yields_no_task() {
        let queue = WorkQueue::new();
        assert!(queue.poll().is_none());
        assert_eq!(queue.size(), 0);
    }
}
