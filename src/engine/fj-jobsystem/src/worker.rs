//! One worker per hardware thread. Each worker owns a deque; it drains its
//! own queue first and only goes looking for someone else's tail once its
//! own is empty.

use crate::deque::Deque;
use crate::job::{self, Job};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

pub struct Worker {
    index: usize,
    num_workers: usize,
    deques: Arc<[Deque<*mut Job>]>,
    active: AtomicBool,
    /// Round-robin cursor into `deques`, used to pick a steal victim.
    /// Plain round-robin rather than a real RNG: cheap, and fairness across
    /// victims matters more than unpredictability here.
    steal_cursor: AtomicU32,
    jobs_completed: AtomicU64,
}

impl Worker {
    pub fn new(index: usize, num_workers: usize, deques: Arc<[Deque<*mut Job>]>) -> Self {
        Self {
            index,
            num_workers,
            deques,
            active: AtomicBool::new(false),
            steal_cursor: AtomicU32::new(0),
            jobs_completed: AtomicU64::new(0),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn jobs_completed(&self) -> u64 {
        self.jobs_completed.load(Ordering::Relaxed)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }

    /// Push a job onto this worker's own deque. Owner-only, per the deque's
    /// contract: only ever called from this worker's own thread (or, for
    /// worker 0, from whichever thread is calling `JobSystem::enqueue`).
    pub fn run(&self, job: &Job) {
        self.deques[self.index].push(job as *const Job as *mut Job);
    }

    pub fn thread_function(&self) {
        let current = thread::current();
        fj_core::thread::set_thread_name(
            current.id(),
            current.name().unwrap_or("jobsystem worker").to_string(),
        );
        while self.active.load(Ordering::Relaxed) {
            self.fetch_and_execute();
        }
    }

    /// One pass of pop-or-steal-or-yield. Returns whether a job actually
    /// ran. Exposed so `JobSystem::wait` can drive the same loop on the
    /// calling thread instead of spinning idle.
    pub fn fetch_and_execute(&self) -> bool {
        if let Some(job) = self.deques[self.index].pop() {
            self.execute(job);
            return true;
        }

        if self.num_workers > 1 {
            let victim = (self.steal_cursor.fetch_add(1, Ordering::Relaxed) as usize) % self.num_workers;
            if victim != self.index {
                if let Some(job) = self.deques[victim].steal() {
                    self.execute(job);
                    return true;
                }
            }
        }

        thread::yield_now();
        false
    }

    fn execute(&self, job_ptr: *mut Job) {
        unsafe {
            let job = &mut *job_ptr;
            // Cheap hint only: callers may read `payload[0]` but must not
            // rely on more than this one byte.
            job.payload[0] = b'0'.wrapping_add(self.index as u8);
            if let Some(function) = job.function {
                function(&mut job.payload);
            }
        }
        job::finish(job_ptr);
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }
}
