//! Construction-time configuration, in the same builder shape rayon's
//! `Configuration`/`ThreadPoolBuilder` uses: a handful of optional knobs,
//! defaulted from the environment, consumed once by `build()`.

use crate::system::JobSystem;

#[derive(Debug, Default, Clone, Copy)]
pub struct JobSystemConfig {
    num_workers: Option<usize>,
}

impl JobSystemConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults to the logical CPU count if left unset.
    pub fn num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = Some(num_workers);
        self
    }

    pub fn build(self) -> JobSystem {
        JobSystem::new(self.num_workers.unwrap_or_else(JobSystem::cpu_thread_count))
    }
}
