//! Dispatcher - submission retry policy on top of a runner
//!
//! The dispatcher owns the rule for which submission failures get a second
//! chance. Transient errors (capacity, network, timeout) are retried;
//! permanent errors (bad spec, bad credentials) surface immediately.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::Target;

use super::error::DispatchError;
use super::runner::{JobHandle, JobRunner, JobSpec, RunnerStatus};

/// Total submission attempts per dispatch: the first try plus one retry
pub const MAX_SUBMIT_ATTEMPTS: u32 = 2;

/// Backoff before a retried submission
const RETRY_BACKOFF_MS: u64 = 500;

/// Submits jobs for targets and polls their lifecycle
pub struct Dispatcher {
    runner: Arc<dyn JobRunner>,
    data_prefix: String,
    notify_url: Option<String>,
    job_timeout_hours: u32,
    submit_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        runner: Arc<dyn JobRunner>,
        data_prefix: impl Into<String>,
        notify_url: Option<String>,
        job_timeout_hours: u32,
        submit_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            data_prefix: data_prefix.into(),
            notify_url,
            job_timeout_hours,
            submit_timeout,
        }
    }

    /// Submit a crawl job for a target. Retryable failures get one more
    /// attempt; the returned error is the last one seen.
    pub async fn submit(&self, target: &Target) -> Result<JobHandle, DispatchError> {
        debug!(url = %target.url, "submit: called");
        let spec = JobSpec::from_target(
            target,
            &self.data_prefix,
            self.notify_url.as_deref(),
            self.job_timeout_hours,
        );

        let mut last_error = None;
        for attempt in 1..=MAX_SUBMIT_ATTEMPTS {
            if attempt > 1 {
                warn!(url = %target.url, attempt, "submit: retrying after transient error");
                tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS)).await;
            }

            let result = tokio::time::timeout(self.submit_timeout, self.runner.submit(&spec)).await;
            let error = match result {
                Ok(Ok(handle)) => {
                    debug!(url = %target.url, job_id = %handle.job_id, attempt, "submit: accepted");
                    return Ok(handle);
                }
                Ok(Err(e)) => e,
                Err(_) => DispatchError::CapacityUnavailable("submission timed out".to_string()),
            };

            if !error.is_retryable() {
                debug!(url = %target.url, %error, "submit: permanent error");
                return Err(error);
            }
            last_error = Some(error);
        }

        Err(last_error
            .unwrap_or_else(|| DispatchError::CapacityUnavailable("max attempts exceeded".to_string())))
    }

    /// Poll the cluster status of a job
    pub async fn poll(&self, job_id: &str) -> Result<RunnerStatus, DispatchError> {
        self.runner.poll(job_id).await
    }

    /// Cancel a job on the cluster
    pub async fn cancel(&self, job_id: &str) -> Result<(), DispatchError> {
        self.runner.cancel(job_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::fake::{FailureMode, InMemoryRunner};
    use crate::domain::{TargetConfig, TargetType};

    fn target() -> Target {
        Target::new(TargetConfig {
            url: "example.com".to_string(),
            target_type: TargetType::Website,
            max_requests: 0,
            max_files: 0,
            download_files: true,
            file_types: Vec::new(),
            ignore_robots_txt: false,
            crawl_interval_hours: 24,
        })
        .unwrap()
    }

    fn dispatcher(runner: Arc<InMemoryRunner>) -> Dispatcher {
        Dispatcher::new(runner, "crawl-data/", None, 24, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_submit_success_first_attempt() {
        let runner = Arc::new(InMemoryRunner::new());
        let handle = dispatcher(runner.clone()).submit(&target()).await.unwrap();

        assert!(!handle.job_id.is_empty());
        assert_eq!(runner.submit_attempts(), 1);
    }

    #[tokio::test]
    async fn test_transient_error_is_retried_once() {
        let runner = Arc::new(InMemoryRunner::new());
        runner.fail_next_submit(DispatchError::CapacityUnavailable(
            "cannot pull execution image".to_string(),
        ));

        let handle = dispatcher(runner.clone()).submit(&target()).await.unwrap();
        assert!(!handle.job_id.is_empty());
        assert_eq!(runner.submit_attempts(), 2);
    }

    #[tokio::test]
    async fn test_retries_are_capped() {
        let runner = Arc::new(InMemoryRunner::always_fail(FailureMode::Capacity));
        let result = dispatcher(runner.clone()).submit(&target()).await;

        assert!(matches!(result, Err(DispatchError::CapacityUnavailable(_))));
        assert_eq!(runner.submit_attempts(), MAX_SUBMIT_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_invalid_spec_never_retried() {
        let runner = Arc::new(InMemoryRunner::always_fail(FailureMode::Invalid));
        let result = dispatcher(runner.clone()).submit(&target()).await;

        assert!(matches!(result, Err(DispatchError::InvalidSpec(_))));
        assert_eq!(runner.submit_attempts(), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_never_retried() {
        let runner = Arc::new(InMemoryRunner::always_fail(FailureMode::Permission));
        let result = dispatcher(runner.clone()).submit(&target()).await;

        assert!(matches!(result, Err(DispatchError::PermissionDenied(_))));
        assert_eq!(runner.submit_attempts(), 1);
    }
}
