//! Cluster runner trait and wire types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Target, TargetType};

use super::error::DispatchError;

/// Everything the worker needs to execute one crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub target_url: String,
    pub target_type: TargetType,
    pub max_requests: u32,
    pub max_files: u32,
    pub download_files: bool,
    pub file_types: Vec<String>,
    pub ignore_robots_txt: bool,
    /// Key prefix the worker writes crawl output under
    pub data_prefix: String,
    /// Where the worker announces completion, when configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_url: Option<String>,
    /// Kill the worker after this many hours
    pub timeout_hours: u32,
}

impl JobSpec {
    /// Build a spec from a registered target
    pub fn from_target(
        target: &Target,
        data_prefix: &str,
        notify_url: Option<&str>,
        timeout_hours: u32,
    ) -> Self {
        Self {
            target_url: target.url.clone(),
            target_type: target.target_type,
            max_requests: target.max_requests,
            max_files: target.max_files,
            download_files: target.download_files,
            file_types: target.file_types.clone(),
            ignore_robots_txt: target.ignore_robots_txt,
            data_prefix: data_prefix.to_string(),
            notify_url: notify_url.map(str::to_string),
            timeout_hours,
        }
    }
}

/// Handle returned by a successful submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHandle {
    /// Opaque identifier assigned by the cluster
    pub job_id: String,
}

/// Status reported by the cluster for a submitted job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum RunnerStatus {
    /// Accepted, waiting for a worker slot
    Queued,
    /// Worker is executing
    Running,
    /// Worker exited cleanly
    Succeeded,
    /// Worker failed; `exit_reason` classifies the failure
    Failed { exit_reason: String },
    /// Withdrawn before completion
    Cancelled,
}

impl RunnerStatus {
    /// Whether the cluster will report nothing further for this job
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. } | Self::Cancelled)
    }
}

/// Seam to the compute cluster. Implementations submit crawl workers and
/// report their lifecycle; they never touch the scheduler's own state.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Submit a job for execution
    async fn submit(&self, spec: &JobSpec) -> Result<JobHandle, DispatchError>;

    /// Poll the status of a previously submitted job
    async fn poll(&self, job_id: &str) -> Result<RunnerStatus, DispatchError>;

    /// Cancel a previously submitted job. Cancelling a terminal job is a
    /// no-op on the cluster side.
    async fn cancel(&self, job_id: &str) -> Result<(), DispatchError>;
}
