//! Worker pool and submission limits.

use serde::{Deserialize, Serialize};

/// Configuration for the conversion worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Jobs executing at the same time.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Jobs allowed to wait for a worker. Submissions beyond this fail fast.
    #[serde(default = "default_max_queued")]
    pub max_queued: usize,

    /// How long a job may wait for a worker before it expires (seconds).
    #[serde(default = "default_queue_timeout")]
    pub queue_timeout_secs: u64,

    /// Standard jobs up to this size run inside the submitting request.
    /// 0 disables inline execution.
    #[serde(default)]
    pub inline_max_bytes: u64,

    /// How often the maintenance loop runs (seconds).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// How long finished job rows are kept (seconds).
    #[serde(default = "default_job_retention")]
    pub job_retention_secs: u64,
}

fn default_pool_size() -> usize {
    4
}

fn default_max_queued() -> usize {
    256
}

fn default_queue_timeout() -> u64 {
    600 // 10 minutes
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_job_retention() -> u64 {
    86_400 // 1 day
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            max_queued: default_max_queued(),
            queue_timeout_secs: default_queue_timeout(),
            inline_max_bytes: 0,
            sweep_interval_secs: default_sweep_interval(),
            job_retention_secs: default_job_retention(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_batch_files")]
    pub max_batch_files: usize,
}

fn default_max_batch_files() -> usize {
    20
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_batch_files: default_max_batch_files(),
        }
    }
}
