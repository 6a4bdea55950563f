use crate::errors::{PipelineError, PipelineResult};
use std::time::Duration;

/// Rows per chunk when the batch is split for parallel execution.
pub const DEFAULT_CHUNK_SIZE: usize = 20_000;

/// Upper bound on the default worker count, regardless of core count.
pub const MAX_DEFAULT_WORKERS: usize = 8;

/// Batches smaller than this run inline on the calling thread.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 40_000;

/// Default bound on the fan-in wait for a parallel batch.
pub const DEFAULT_FAN_IN_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub chunk_size: usize,
    pub worker_count: usize,
    pub parallel_threshold: usize,
    /// `None` waits for every chunk without a bound.
    pub fan_in_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            worker_count: default_worker_count(),
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            fan_in_timeout: Some(Duration::from_secs(DEFAULT_FAN_IN_TIMEOUT_SECS)),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `BS_*` environment variables (and `.env`, if present).
    pub fn from_env() -> PipelineResult<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let chunk_size = positive_env("BS_CHUNK_SIZE", defaults.chunk_size)?;
        let worker_count = positive_env("BS_WORKERS", defaults.worker_count)?;
        let parallel_threshold =
            positive_env("BS_PARALLEL_THRESHOLD", defaults.parallel_threshold)?;

        let timeout_secs = match std::env::var("BS_FAN_IN_TIMEOUT_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| PipelineError::Config(format!("BS_FAN_IN_TIMEOUT_SECS: {e}")))?,
            Err(_) => DEFAULT_FAN_IN_TIMEOUT_SECS,
        };

        Ok(Self {
            chunk_size,
            worker_count,
            parallel_threshold,
            fan_in_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count.max(1);
        self
    }

    pub fn with_parallel_threshold(mut self, parallel_threshold: usize) -> Self {
        self.parallel_threshold = parallel_threshold;
        self
    }

    pub fn with_fan_in_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fan_in_timeout = timeout;
        self
    }

    #[inline]
    pub fn should_parallelize(&self, n_rows: usize) -> bool {
        n_rows >= self.parallel_threshold && n_rows > self.chunk_size
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, MAX_DEFAULT_WORKERS)
}

fn positive_env(key: &str, default: usize) -> PipelineResult<usize> {
    let Ok(raw) = std::env::var(key) else {
        return Ok(default);
    };
    let value = raw
        .trim()
        .parse::<usize>()
        .map_err(|e| PipelineError::Config(format!("{key}: {e}")))?;
    if value == 0 {
        return Err(PipelineError::Config(format!("{key}: must be a positive integer")));
    }
    Ok(value)
}
