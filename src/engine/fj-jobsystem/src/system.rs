//! The public entry point: owns the worker pool and the job allocator, and
//! exposes the job-submission API.

use crate::allocator::JobAllocator;
use crate::deque::Deque;
use crate::job::{Job, JobFunction, PAYLOAD_SIZE};
use crate::worker::Worker;
use fj_core::fj_info;
use std::mem;
use std::ptr;
use std::ptr::NonNull;
use std::sync::Arc;
use std::thread::JoinHandle;

pub struct JobSystem {
    workers: Vec<Arc<Worker>>,
    allocator: JobAllocator,
    threads: Vec<JoinHandle<()>>,
}

impl JobSystem {
    pub fn new(num_workers: usize) -> Self {
        assert!(num_workers >= 1, "a job system needs at least one worker");

        fj_info!("creating job system with {} workers", num_workers);

        let deques: Arc<[Deque<*mut Job>]> = (0..num_workers)
            .map(|_| Deque::new())
            .collect::<Vec<_>>()
            .into_boxed_slice()
            .into();

        let workers: Vec<Arc<Worker>> = (0..num_workers)
            .map(|index| Arc::new(Worker::new(index, num_workers, deques.clone())))
            .collect();

        // Worker 0 has no dedicated OS thread: whichever thread calls
        // `wait` drives worker 0's queue itself, so a single-threaded
        // caller still makes progress instead of deadlocking on its own
        // jobs.
        let mut threads = Vec::with_capacity(num_workers.saturating_sub(1));
        for worker in workers.iter().skip(1) {
            worker.set_active(true);
            let worker = worker.clone();
            threads.push(
                std::thread::Builder::new()
                    .name(format!("Job Worker {}", worker.index()))
                    .spawn(move || worker.thread_function())
                    .expect("failed to spawn job worker thread"),
            );
        }

        Self {
            workers,
            allocator: JobAllocator::new(),
            threads,
        }
    }

    pub fn cpu_thread_count() -> usize {
        num_cpus::get()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Allocate a root job. The job is not queued until `enqueue` is called.
    pub fn create_job(&self, function: JobFunction) -> &Job {
        unsafe { &*self.allocator.allocate(function, None) }
    }

    /// Allocate a job as a child of `parent`. `parent` will not be observed
    /// as completed until this job (and everything spawned under it) has
    /// also finished.
    pub fn create_job_as_child<'a>(&'a self, parent: &Job, function: JobFunction) -> &'a Job {
        // Release: publishes the bump before the child can possibly finish
        // and race a concurrent decrement from another sibling.
        parent.unfinished.fetch_add(1, std::sync::atomic::Ordering::Release);
        let parent_ptr = NonNull::from(parent);
        unsafe { &*self.allocator.allocate(function, Some(parent_ptr)) }
    }

    /// Submit a job to run. Always enqueued on worker 0's deque; workers
    /// steal from there just like any other deque, so this is not a
    /// bottleneck beyond the initial push.
    pub fn enqueue(&self, job: &Job) {
        self.workers[0].run(job);
    }

    pub fn has_job_completed(&self, job: &Job) -> bool {
        job.has_completed()
    }

    /// Block the calling thread until `job` (and its descendants) finish,
    /// running other queued jobs on worker 0's deque in the meantime
    /// instead of spinning idle.
    pub fn wait(&self, job: &Job) {
        while !self.has_job_completed(job) {
            self.workers[0].fetch_and_execute();
        }
    }

    /// Run two closures as sibling jobs and block until both finish. Not
    /// part of the core submission API; a convenience carried over from
    /// the original implementation's `join`, built on top of `create_job`
    /// the same way the rest of the system is.
    pub fn join<F1, F2>(&self, f1: F1, f2: F2)
    where
        F1: FnOnce() + Send,
        F2: FnOnce() + Send,
    {
        let root = self.create_job(noop);
        let left = self.spawn_closure_as_child(root, f1);
        let right = self.spawn_closure_as_child(root, f2);
        self.enqueue(left);
        self.enqueue(right);
        self.enqueue(root);
        self.wait(root);
    }

    /// Embeds a non-capturing, generic trampoline function as the job's
    /// `function` pointer, and writes the closure itself into the job's
    /// inline payload. `read_unaligned`/`write_unaligned` because nothing
    /// guarantees `payload` is aligned for an arbitrary `F`.
    fn spawn_closure_as_child<'a, F>(&'a self, parent: &Job, f: F) -> &'a Job
    where
        F: FnOnce() + Send,
    {
        assert!(
            mem::size_of::<F>() <= PAYLOAD_SIZE,
            "closure passed to JobSystem::join exceeds the {PAYLOAD_SIZE}-byte inline payload"
        );

        fn trampoline<F: FnOnce() + Send>(payload: &mut [u8; PAYLOAD_SIZE]) {
            let f = unsafe { ptr::read_unaligned(payload.as_ptr() as *const F) };
            f();
        }

        let job = self.create_job_as_child(parent, trampoline::<F>);
        unsafe {
            let job_mut = (job as *const Job as *mut Job).as_mut().unwrap();
            ptr::write_unaligned(job_mut.payload.as_mut_ptr() as *mut F, f);
        }
        job
    }
}

fn noop(_: &mut [u8; PAYLOAD_SIZE]) {}

impl Drop for JobSystem {
    fn drop(&mut self) {
        for worker in self.workers.iter().skip(1) {
            worker.set_active(false);
        }
        for thread in self.threads.drain(..) {
            let _ = thread.join();
        }

        let total: u64 = self.workers.iter().map(|w| w.jobs_completed()).sum();
        fj_info!("job system shut down after {} jobs", total);
    }
}
