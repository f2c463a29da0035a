//! In-memory cluster runner for tests
//!
//! Jobs queue on submit and only change state when the test drives them
//! with [`InMemoryRunner::complete`] or [`InMemoryRunner::start`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use super::error::DispatchError;
use super::runner::{JobHandle, JobRunner, JobSpec, RunnerStatus};

/// Permanent failure personality for a test runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Every submit fails with CapacityUnavailable
    Capacity,
    /// Every submit fails with PermissionDenied
    Permission,
    /// Every submit fails with InvalidSpec
    Invalid,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, RunnerStatus>,
    specs: Vec<JobSpec>,
    /// Errors to return for the next submits, in order
    submit_errors: VecDeque<DispatchError>,
    failure_mode: Option<FailureMode>,
    submit_attempts: u32,
    submit_delay: Option<Duration>,
    next_id: u64,
}

/// Test double for the compute cluster
#[derive(Default)]
pub struct InMemoryRunner {
    inner: Mutex<Inner>,
}

impl InMemoryRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every submit with the given mode
    pub fn always_fail(mode: FailureMode) -> Self {
        let runner = Self::new();
        runner.inner.lock().unwrap().failure_mode = Some(mode);
        runner
    }

    /// Queue an error for the next submit; later submits succeed again
    pub fn fail_next_submit(&self, error: DispatchError) {
        self.inner.lock().unwrap().submit_errors.push_back(error);
    }

    /// Hold every submit for `delay` before answering, to let tests overlap
    /// in-flight submissions
    pub fn set_submit_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().submit_delay = Some(delay);
    }

    /// Number of submit calls seen, including failed ones
    pub fn submit_attempts(&self) -> u32 {
        self.inner.lock().unwrap().submit_attempts
    }

    /// Specs of all accepted submissions, in order
    pub fn submitted_specs(&self) -> Vec<JobSpec> {
        self.inner.lock().unwrap().specs.clone()
    }

    /// Drive a queued job to Running
    pub fn start(&self, job_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.jobs.insert(job_id.to_string(), RunnerStatus::Running);
    }

    /// Drive a job to a terminal status
    pub fn complete(&self, job_id: &str, status: RunnerStatus) {
        assert!(status.is_terminal());
        let mut inner = self.inner.lock().unwrap();
        inner.jobs.insert(job_id.to_string(), status);
    }

    fn make_error(mode: FailureMode) -> DispatchError {
        match mode {
            FailureMode::Capacity => {
                DispatchError::CapacityUnavailable("no compute capacity".to_string())
            }
            FailureMode::Permission => DispatchError::PermissionDenied("access denied".to_string()),
            FailureMode::Invalid => DispatchError::InvalidSpec("rejected by cluster".to_string()),
        }
    }
}

#[async_trait]
impl JobRunner for InMemoryRunner {
    async fn submit(&self, spec: &JobSpec) -> Result<JobHandle, DispatchError> {
        let delay = self.inner.lock().unwrap().submit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().unwrap();
        inner.submit_attempts += 1;

        if let Some(error) = inner.submit_errors.pop_front() {
            return Err(error);
        }
        if let Some(mode) = inner.failure_mode {
            return Err(Self::make_error(mode));
        }

        inner.next_id += 1;
        let job_id = format!("fake-{}", inner.next_id);
        inner.jobs.insert(job_id.clone(), RunnerStatus::Queued);
        inner.specs.push(spec.clone());
        Ok(JobHandle { job_id })
    }

    async fn poll(&self, job_id: &str) -> Result<RunnerStatus, DispatchError> {
        let inner = self.inner.lock().unwrap();
        inner
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| DispatchError::JobNotFound(job_id.to_string()))
    }

    async fn cancel(&self, job_id: &str) -> Result<(), DispatchError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.jobs.get_mut(job_id) {
            Some(status) if !status.is_terminal() => {
                *status = RunnerStatus::Cancelled;
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(DispatchError::JobNotFound(job_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TargetType;

    fn spec() -> JobSpec {
        JobSpec {
            target_url: "https://example.com".to_string(),
            target_type: TargetType::Website,
            max_requests: 0,
            max_files: 0,
            download_files: true,
            file_types: Vec::new(),
            ignore_robots_txt: false,
            data_prefix: "crawl-data/".to_string(),
            notify_url: None,
            timeout_hours: 24,
        }
    }

    #[tokio::test]
    async fn test_submit_then_drive_to_completion() {
        let runner = InMemoryRunner::new();
        let handle = runner.submit(&spec()).await.unwrap();

        assert_eq!(runner.poll(&handle.job_id).await.unwrap(), RunnerStatus::Queued);

        runner.start(&handle.job_id);
        assert_eq!(runner.poll(&handle.job_id).await.unwrap(), RunnerStatus::Running);

        runner.complete(&handle.job_id, RunnerStatus::Succeeded);
        assert_eq!(runner.poll(&handle.job_id).await.unwrap(), RunnerStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_queued_errors_fire_in_order() {
        let runner = InMemoryRunner::new();
        runner.fail_next_submit(DispatchError::CapacityUnavailable("busy".to_string()));

        assert!(runner.submit(&spec()).await.is_err());
        assert!(runner.submit(&spec()).await.is_ok());
        assert_eq!(runner.submit_attempts(), 2);
    }

    #[tokio::test]
    async fn test_cancel_terminal_is_noop() {
        let runner = InMemoryRunner::new();
        let handle = runner.submit(&spec()).await.unwrap();
        runner.complete(&handle.job_id, RunnerStatus::Succeeded);

        runner.cancel(&handle.job_id).await.unwrap();
        assert_eq!(runner.poll(&handle.job_id).await.unwrap(), RunnerStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_poll_unknown_job() {
        let runner = InMemoryRunner::new();
        assert!(matches!(
            runner.poll("ghost").await,
            Err(DispatchError::JobNotFound(_))
        ));
    }
}
