//! A single unit of work. Jobs are allocated from a fixed pool (see
//! `allocator.rs`) and referenced by raw pointer once they are queued, since
//! they outlive any one borrow and are shared across threads by the deque.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

/// Size of a job's inline argument buffer. 48 bytes is enough for a handful
/// of indices or a small captured closure (see `JobSystem::join`) without
/// forcing a heap allocation per job.
pub const PAYLOAD_SIZE: usize = 48;

/// The function a job runs. It receives the inline payload it was created
/// with and writes nothing back except through that buffer or outside state
/// it closes over via raw pointers.
pub type JobFunction = fn(&mut [u8; PAYLOAD_SIZE]);

/// Cache-line aligned so two jobs never share a line: the atomic
/// `unfinished` counter is hammered by every worker touching a child of this
/// job, and false sharing with a neighboring job would show up directly in
/// stealing throughput.
#[repr(align(64))]
pub struct Job {
    pub(crate) function: Option<JobFunction>,
    pub(crate) parent: Option<NonNull<Job>>,
    /// One (the job itself) plus one per child not yet finished. Reaches
    /// zero exactly once, the moment this job and all its descendants are
    /// done.
    pub(crate) unfinished: AtomicU32,
    pub(crate) payload: [u8; PAYLOAD_SIZE],
}

impl Default for Job {
    fn default() -> Self {
        Self {
            function: None,
            parent: None,
            unfinished: AtomicU32::new(0),
            payload: [0; PAYLOAD_SIZE],
        }
    }
}

// SAFETY: `function` and `parent` are written exactly once, by the thread
// that allocates the job, before the job's address is ever published to a
// deque or to a child job's `parent` pointer. After publication only
// `unfinished` is mutated, and that field is already atomic. So sharing
// `&Job`/`*mut Job` across threads never races on anything but the atomic.
unsafe impl Send for Job {}
unsafe impl Sync for Job {}

impl Job {
    /// True once this job and every job created as its child (transitively)
    /// has run to completion.
    pub fn has_completed(&self) -> bool {
        // Acquire: a caller that observes completion must also observe every
        // write the job (and its descendants) made before finishing.
        self.unfinished.load(Ordering::Acquire) == 0
    }
}

/// Walks the parent chain, decrementing `unfinished` along the way. Written
/// as a loop rather than recursion so a long chain of parent jobs (deep
/// `create_job_as_child` nesting) can't blow the stack.
pub(crate) fn finish(mut job_ptr: *mut Job) {
    loop {
        let job = unsafe { &*job_ptr };
        // Release: pairs with the Acquire load in `has_completed`/`wait` so
        // that whatever this job did before finishing is visible to whoever
        // observes `unfinished == 0`.
        let previous = job.unfinished.fetch_sub(1, Ordering::Release);
        debug_assert!(previous > 0, "job finished more times than it started");

        if previous != 1 {
            // Either this job itself has unfinished children, or this call
            // is finishing one of those children and siblings remain.
            return;
        }

        match job.parent {
            Some(parent) => job_ptr = parent.as_ptr(),
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_job_completes_after_single_finish() {
        let mut job = Job::default();
        job.unfinished = AtomicU32::new(1);
        assert!(!job.has_completed());
        finish(&mut job as *mut Job);
        assert!(job.has_completed());
    }

    #[test]
    fn parent_does_not_complete_before_every_child_finishes() {
        let mut parent = Job::default();
        parent.unfinished = AtomicU32::new(1);

        let mut child_a = Job::default();
        child_a.parent = Some(NonNull::from(&parent));
        child_a.unfinished = AtomicU32::new(1);
        parent.unfinished.fetch_add(1, Ordering::Relaxed);

        let mut child_b = Job::default();
        child_b.parent = Some(NonNull::from(&parent));
        child_b.unfinished = AtomicU32::new(1);
        parent.unfinished.fetch_add(1, Ordering::Relaxed);

        finish(&mut child_a as *mut Job);
        assert!(!parent.has_completed(), "parent must wait for child_b too");

        finish(&mut child_b as *mut Job);
        assert!(!parent.has_completed(), "parent itself hasn't finished yet");

        finish(&mut parent as *mut Job);
        assert!(parent.has_completed());
    }
}
