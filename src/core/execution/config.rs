//! Engine tuning that is not part of a scenario document.

/// How a [`BatchRunner`](super::batch::BatchRunner) spreads independent runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrencyMode {
    /// One run after another on the calling thread
    #[default]
    Sequential,
    /// Runs distributed over a rayon thread pool
    Rayon,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionConfig {
    pub concurrency_mode: ConcurrencyMode,
    /// Worker threads for `Rayon` mode; `None` uses rayon's default
    pub thread_pool_size: Option<usize>,
}

impl ExecutionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concurrency(mut self, mode: ConcurrencyMode) -> Self {
        self.concurrency_mode = mode;
        self
    }

    /// Only affects `Rayon` mode
    pub fn with_thread_pool_size(mut self, size: usize) -> Self {
        self.thread_pool_size = Some(size);
        self
    }

    pub fn is_parallel(&self) -> bool {
        self.concurrency_mode == ConcurrencyMode::Rayon
    }
}
