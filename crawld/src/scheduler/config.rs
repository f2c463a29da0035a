//! Scheduler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks
    #[serde(rename = "tick-interval-secs", default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Hours a worker may run before the cluster kills it
    #[serde(rename = "job-timeout-hours", default = "default_job_timeout_hours")]
    pub job_timeout_hours: u32,

    /// Retries for conditional target updates that hit a concurrent write
    #[serde(rename = "update-retries", default = "default_update_retries")]
    pub update_retries: u32,

    /// Seconds to wait for one job submission before treating it as a
    /// transient failure
    #[serde(rename = "submit-timeout-secs", default = "default_submit_timeout_secs")]
    pub submit_timeout_secs: u64,
}

fn default_tick_interval_secs() -> u64 {
    900
}

fn default_job_timeout_hours() -> u32 {
    24
}

fn default_update_retries() -> u32 {
    3
}

fn default_submit_timeout_secs() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 900,
            job_timeout_hours: 24,
            update_retries: 3,
            submit_timeout_secs: 30,
        }
    }
}

impl SchedulerConfig {
    /// Get the tick interval as a Duration
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    /// Get the submission timeout as a Duration
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.tick_interval_secs, 900);
        assert_eq!(config.job_timeout_hours, 24);
        assert_eq!(config.update_retries, 3);
        assert_eq!(config.tick_interval(), Duration::from_secs(900));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SchedulerConfig = serde_yaml::from_str("tick-interval-secs: 60").unwrap();
        assert_eq!(config.tick_interval_secs, 60);
        assert_eq!(config.job_timeout_hours, 24);
    }
}
