use std::time::Duration;

use flow::config::PipelineConfig;

/// Initializes tracing output for a test run. Safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config with small queues and a fast poll interval to keep tests snappy.
pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        queue_capacity: 16,
        poll_interval_ms: 5,
    }
}

/// Outer deadline for waits that are expected to finish; pipelines have no built-in
/// one, so tests impose their own.
pub const TEST_DEADLINE: Duration = Duration::from_secs(30);
