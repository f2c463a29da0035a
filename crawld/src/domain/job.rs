//! Job domain type
//!
//! A Job is one dispatched execution attempt of the crawl worker against a
//! Target. Jobs are keyed by `(target_url, job_id)` and, once terminal, are
//! never mutated again - the ledger keeps history even after a target is
//! deregistered.

use crawlstore::{IndexValue, Record, now_ms};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted by the compute cluster, not yet started
    #[default]
    Submitted,
    /// Worker is executing
    Running,
    /// Worker finished successfully
    Succeeded,
    /// Worker or dispatch failed
    Failed,
    /// Withdrawn before completion
    Cancelled,
}

impl JobStatus {
    /// Whether no further transition can occur
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submitted => write!(f, "submitted"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "submitted" => Ok(Self::Submitted),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!(
                "Unknown job status: {}. Use: submitted, running, succeeded, failed, or cancelled",
                s
            )),
        }
    }
}

/// Ledger key for a job: job ids are only unique per target
pub fn job_key(target_url: &str, job_id: &str) -> String {
    format!("{}::{}", target_url, job_id)
}

/// Generate an opaque job id for jobs that never reached the cluster
/// (dispatch failures still get a ledger entry)
pub fn generate_job_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// One dispatched execution attempt against a target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Ledger key, `{target_url}::{job_id}`
    pub key: String,

    /// Owning target URL
    pub target_url: String,

    /// Opaque identifier assigned at submission time
    pub job_id: String,

    /// Current lifecycle status
    pub status: JobStatus,

    /// Which submission attempt this job represents (1-based); retryable
    /// worker exits are resubmitted at most once
    pub attempt: u32,

    /// Submission timestamp (Unix milliseconds)
    pub submitted_at: i64,

    /// Completion timestamp, unset while non-terminal
    pub finished_at: Option<i64>,

    /// Failure classification, present only on Failed
    pub exit_reason: Option<String>,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Job {
    /// Create a freshly submitted job
    pub fn new(target_url: impl Into<String>, job_id: impl Into<String>, attempt: u32) -> Self {
        let target_url = target_url.into();
        let job_id = job_id.into();
        let now = now_ms();
        Self {
            key: job_key(&target_url, &job_id),
            target_url,
            job_id,
            status: JobStatus::Submitted,
            attempt,
            submitted_at: now,
            finished_at: None,
            exit_reason: None,
            updated_at: now,
        }
    }

    /// Create a ledger entry for a dispatch that failed before any worker
    /// ran; terminal from birth
    pub fn failed_dispatch(target_url: impl Into<String>, exit_reason: impl Into<String>) -> Self {
        let mut job = Self::new(target_url, generate_job_id(), 1);
        job.status = JobStatus::Failed;
        job.finished_at = Some(job.submitted_at);
        job.exit_reason = Some(exit_reason.into());
        job
    }

    /// Mark the worker as running
    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.updated_at = now_ms();
    }

    /// Transition to a terminal status
    pub fn finish(&mut self, status: JobStatus, exit_reason: Option<String>) {
        debug_assert!(status.is_terminal());
        let now = now_ms();
        self.status = status;
        self.finished_at = Some(now);
        self.exit_reason = exit_reason;
        self.updated_at = now;
    }

    /// Whether this job still occupies the target's scheduling slot
    pub fn is_outstanding(&self) -> bool {
        matches!(self.status, JobStatus::Submitted | JobStatus::Running)
    }

    /// Whether this job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl Record for Job {
    fn id(&self) -> &str {
        &self.key
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "jobs"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("target_url".to_string(), IndexValue::String(self.target_url.clone()));
        fields.insert("status".to_string(), IndexValue::String(self.status.to_string()));
        fields
    }
}
