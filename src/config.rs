//! Configuration types for pipeline construction.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors raised when validating a [`PipelineConfig`].
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Queue capacity cannot be zero.
    #[error("`queue_capacity` cannot be zero")]
    QueueCapacityZero,
    /// Poll interval cannot be zero.
    #[error("`poll_interval_ms` cannot be zero")]
    PollIntervalZero,
}

/// Configuration for a pipeline graph.
///
/// Contains the tunables shared by every edge and worker of one pipeline: the bound
/// of each connecting queue and the granularity of the timeout-bounded `get`/`put`
/// retry loops.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Maximum number of items held by each queue in the graph.
    ///
    /// A full queue blocks its producers, which is the backpressure mechanism that
    /// throttles upstream stages to the slowest consumer's pace.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Granularity, in milliseconds, of the `get`/`put` retry timeouts.
    ///
    /// Workers re-check the shutdown condition every time this interval elapses, so
    /// lowering it reduces shutdown latency at the cost of more wakeups.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl PipelineConfig {
    /// Default capacity for every queue in the graph.
    pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

    /// Default retry timeout granularity in milliseconds.
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 25;

    /// Validates pipeline configuration settings.
    ///
    /// Ensures the queue capacity and poll interval are non-zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.queue_capacity == 0 {
            return Err(ValidationError::QueueCapacityZero);
        }

        if self.poll_interval_ms == 0 {
            return Err(ValidationError::PollIntervalZero);
        }

        Ok(())
    }

    /// Returns the poll interval as a [`Duration`].
    pub(crate) fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_queue_capacity() -> usize {
    PipelineConfig::DEFAULT_QUEUE_CAPACITY
}

fn default_poll_interval_ms() -> u64 {
    PipelineConfig::DEFAULT_POLL_INTERVAL_MS
}
