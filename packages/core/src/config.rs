//! Runner configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for runner behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Maximum number of jobs kept before terminal ones are evicted.
    pub max_jobs: usize,
    /// Maximum number of results kept.
    pub max_results: usize,
    /// Idle sleep between worker iterations (milliseconds).
    pub poll_interval_ms: u64,
    /// Timeout applied when a request does not set one (seconds).
    pub default_timeout_secs: u64,
    /// Retry limit applied when a request does not set one.
    pub default_max_retries: u32,
    /// Buffer size of the lifecycle event channel.
    pub event_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_jobs: 1000,
            max_results: 1000,
            poll_interval_ms: 50,
            default_timeout_secs: 300,
            default_max_retries: 3,
            event_capacity: 1024,
        }
    }
}

impl RunnerConfig {
    /// Defaults overlaid with `JOB_RUNNER_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        overlay_env("JOB_RUNNER_MAX_JOBS", &mut config.max_jobs);
        overlay_env("JOB_RUNNER_MAX_RESULTS", &mut config.max_results);
        overlay_env("JOB_RUNNER_POLL_INTERVAL_MS", &mut config.poll_interval_ms);
        overlay_env(
            "JOB_RUNNER_DEFAULT_TIMEOUT_SECS",
            &mut config.default_timeout_secs,
        );
        overlay_env(
            "JOB_RUNNER_DEFAULT_MAX_RETRIES",
            &mut config.default_max_retries,
        );
        config
    }

    pub fn with_max_jobs(mut self, max_jobs: usize) -> Self {
        self.max_jobs = max_jobs;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    pub fn with_default_timeout_secs(mut self, secs: u64) -> Self {
        self.default_timeout_secs = secs;
        self
    }

    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn overlay_env<T: FromStr>(key: &str, target: &mut T) {
    let Ok(raw) = std::env::var(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!("Ignoring {}: cannot parse {:?}", key, raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: RunnerConfig = serde_json::from_str(r#"{"max_jobs": 10}"#).unwrap();
        assert_eq!(config.max_jobs, 10);
        assert_eq!(config.max_results, 1000);
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
    }

    // The only test in this crate that touches the process environment.
    #[test]
    fn env_overlay_skips_unparsable_values() {
        unsafe {
            std::env::set_var("JOB_RUNNER_MAX_JOBS", " 7 ");
            std::env::set_var("JOB_RUNNER_POLL_INTERVAL_MS", "abc");
        }
        let config = RunnerConfig::from_env();
        unsafe {
            std::env::remove_var("JOB_RUNNER_MAX_JOBS");
            std::env::remove_var("JOB_RUNNER_POLL_INTERVAL_MS");
        }

        assert_eq!(config.max_jobs, 7);
        assert_eq!(config.poll_interval_ms, 50);
        assert_eq!(config.max_results, 1000);
    }

    #[test]
    fn builders_override_fields() {
        let config = RunnerConfig::default()
            .with_max_jobs(5)
            .with_default_max_retries(0)
            .with_poll_interval_ms(10);
        assert_eq!(config.max_jobs, 5);
        assert_eq!(config.default_max_retries, 0);
        assert_eq!(config.poll_interval_ms, 10);
    }
}
