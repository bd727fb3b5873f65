//! Execution engines.
//!
//! An engine only knows how to run `n` independent partition tasks. Everything
//! else (lazy pipelines, shuffles, reductions) is built on top of that in
//! [`crate::execution::partitioned`], so a backend is easy to swap or stub.

use crate::core::config::EngineConfig;
use crate::core::error::{EngineError, EngineResult};
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// One unit of partition work.
pub type PartitionTask<'a> = dyn Fn(usize) -> EngineResult<()> + Send + Sync + 'a;

/// Schedules partition tasks.
pub trait Engine: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Number of tasks that can run at once.
    fn parallelism(&self) -> usize;

    /// Partition count used when a collection is created without one.
    fn default_partitions(&self) -> usize {
        self.parallelism()
    }

    /// Run `task(p)` for every `p` in `0..partitions`.
    ///
    /// Returns the first failure; other tasks may or may not have run.
    fn run(&self, partitions: usize, task: &PartitionTask<'_>) -> EngineResult<()>;
}

/// Engine options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Number of worker threads (0 = use all available).
    pub threads: usize,
    /// Default partition count (0 = one per worker).
    pub partitions: usize,
}

impl EngineOptions {
    /// Create a new options builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set worker threads.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set default partition count.
    pub fn with_partitions(mut self, partitions: usize) -> Self {
        self.partitions = partitions;
        self
    }
}

impl From<&EngineConfig> for EngineOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            threads: config.threads,
            partitions: config.partitions,
        }
    }
}

/// Runs partitions on a dedicated rayon thread pool.
pub struct RayonEngine {
    pool: rayon::ThreadPool,
    options: EngineOptions,
}

impl fmt::Debug for RayonEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RayonEngine")
            .field("threads", &self.pool.current_num_threads())
            .field("options", &self.options)
            .finish()
    }
}

impl RayonEngine {
    /// Create an engine using all available cores.
    pub fn new() -> EngineResult<Self> {
        Self::with_options(EngineOptions::default())
    }

    /// Create an engine with explicit options.
    pub fn with_options(options: EngineOptions) -> EngineResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.threads)
            .thread_name(|index| format!("framestack-worker-{}", index))
            .build()
            .map_err(|e| EngineError::PoolBuild(e.to_string()))?;

        log::debug!(
            "started rayon engine with {} threads",
            pool.current_num_threads()
        );
        Ok(Self { pool, options })
    }

    /// Create an engine wrapped in Arc for handing to collections.
    pub fn shared(options: EngineOptions) -> EngineResult<Arc<dyn Engine>> {
        Ok(Arc::new(Self::with_options(options)?))
    }
}

impl Engine for RayonEngine {
    fn name(&self) -> &str {
        "rayon"
    }

    fn parallelism(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn default_partitions(&self) -> usize {
        if self.options.partitions == 0 {
            self.parallelism()
        } else {
            self.options.partitions
        }
    }

    fn run(&self, partitions: usize, task: &PartitionTask<'_>) -> EngineResult<()> {
        let start = Instant::now();
        let result = self
            .pool
            .install(|| (0..partitions).into_par_iter().try_for_each(task));
        log::debug!(
            "rayon engine ran {} partitions in {:?}",
            partitions,
            start.elapsed()
        );
        result
    }
}

/// Runs partitions one after another on the calling thread.
///
/// Deterministic and dependency-free; the reference backend for tests.
#[derive(Debug, Clone)]
pub struct InlineEngine {
    partitions: usize,
}

impl InlineEngine {
    /// Create an inline engine that splits new collections in `partitions`.
    pub fn new(partitions: usize) -> Self {
        Self {
            partitions: partitions.max(1),
        }
    }

    /// Create an inline engine wrapped in Arc.
    pub fn shared(partitions: usize) -> Arc<dyn Engine> {
        Arc::new(Self::new(partitions))
    }
}

impl Default for InlineEngine {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Engine for InlineEngine {
    fn name(&self) -> &str {
        "inline"
    }

    fn parallelism(&self) -> usize {
        1
    }

    fn default_partitions(&self) -> usize {
        self.partitions
    }

    fn run(&self, partitions: usize, task: &PartitionTask<'_>) -> EngineResult<()> {
        for partition in 0..partitions {
            log::trace!("inline engine running partition {}", partition);
            task(partition)?;
        }
        Ok(())
    }
}
