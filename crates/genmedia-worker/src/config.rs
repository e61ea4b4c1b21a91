//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Work directory for temporary files
    pub work_dir: String,

    /// Assumed reading speed for script duration estimates
    pub words_per_minute: u32,
    /// A script is truncated when its estimated duration exceeds
    /// max(requested * multiplier, requested + slack)
    pub duration_violation_multiplier: f64,
    /// See `duration_violation_multiplier`
    pub duration_slack_secs: u32,

    /// Delay before the first (and only) video operation poll
    pub video_first_poll_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            shutdown_timeout: Duration::from_secs(30),
            work_dir: "/tmp/genmedia".to_string(),
            words_per_minute: 150,
            duration_violation_multiplier: 2.0,
            duration_slack_secs: 30,
            video_first_poll_delay: Duration::from_secs(20),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .unwrap_or_else(|_| "/tmp/genmedia".to_string()),
            words_per_minute: std::env::var("SCRIPT_WORDS_PER_MINUTE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(150),
            duration_violation_multiplier: std::env::var("SCRIPT_DURATION_MULTIPLIER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2.0),
            duration_slack_secs: std::env::var("SCRIPT_DURATION_SLACK_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            video_first_poll_delay: Duration::from_secs(
                std::env::var("VIDEO_FIRST_POLL_DELAY_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(20),
            ),
        }
    }
}
