//! A single shared pool of jobs, reused by wraparound. No free list: the
//! pool hands out the next slot modulo its size and trusts the caller never
//! to have more than `capacity` jobs outstanding at once. One pool per
//! `JobSystem`, shared by every worker — nothing here needs per-thread
//! allocation locality to stay correct.

use crate::job::{Job, JobFunction};
use fj_core::sync::SyncUnsafeCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

pub const POOL_SIZE: usize = 4096;

pub struct JobAllocator {
    slots: Box<[SyncUnsafeCell<Job>]>,
    next: AtomicU32,
}

impl JobAllocator {
    pub fn new() -> Self {
        Self::with_capacity(POOL_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "job pool capacity must be a power of two");
        let slots = (0..capacity)
            .map(|_| SyncUnsafeCell::new(Job::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            next: AtomicU32::new(0),
        }
    }

    /// Lock-free, O(1), never fails. If the pool wraps around onto a slot
    /// whose previous occupant hasn't finished yet, that job's bookkeeping
    /// is silently clobbered — debug builds catch this with an assertion.
    /// Wraparound itself is the pool's defined behavior, not a failure mode
    /// a caller can recover from, so there is no error to return.
    pub fn allocate(&self, function: JobFunction, parent: Option<NonNull<Job>>) -> *mut Job {
        let index = self.next.fetch_add(1, Ordering::Relaxed) as usize & (self.slots.len() - 1);
        let slot = self.slots[index].get();

        unsafe {
            debug_assert!(
                (*slot).unfinished.load(Ordering::Acquire) == 0,
                "job pool wraparound onto slot {index} with unfinished work still pending"
            );
            (*slot).function = Some(function);
            (*slot).parent = parent;
            (*slot).unfinished.store(1, Ordering::Release);
        }
        slot
    }
}
