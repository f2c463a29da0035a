//! Completion notifications
//!
//! Best-effort fan-out of job completion events. Delivery failures are
//! logged and never affect scheduling state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::NotifyConfig;
use crate::domain::{Job, JobStatus};

/// Event published when a job reaches a terminal status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub target_url: String,
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_reason: Option<String>,
    pub finished_at: i64,
}

impl CompletionEvent {
    /// Build an event from a terminal job
    pub fn from_job(job: &Job) -> Self {
        debug_assert!(job.is_terminal());
        Self {
            target_url: job.target_url.clone(),
            job_id: job.job_id.clone(),
            status: job.status,
            exit_reason: job.exit_reason.clone(),
            finished_at: job.finished_at.unwrap_or(job.updated_at),
        }
    }
}

/// Completion event sink. Publish errors mean the event was not delivered;
/// the caller logs and moves on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, event: &CompletionEvent) -> eyre::Result<()>;
}

/// POSTs completion events to a configured webhook
pub struct WebhookNotifier {
    url: String,
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn from_config(config: &NotifyConfig) -> eyre::Result<Option<Self>> {
        let Some(url) = config.webhook_url.clone() else {
            return Ok(None);
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Some(Self { url, http }))
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn publish(&self, event: &CompletionEvent) -> eyre::Result<()> {
        debug!(target_url = %event.target_url, job_id = %event.job_id, "publish: called");
        let response = self.http.post(&self.url).json(event).send().await?;
        response.error_for_status()?;
        Ok(())
    }
}

/// Logs completion events; the default sink when no webhook is configured
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, event: &CompletionEvent) -> eyre::Result<()> {
        info!(
            target_url = %event.target_url,
            job_id = %event.job_id,
            status = %event.status,
            exit_reason = ?event.exit_reason,
            "Job completed"
        );
        Ok(())
    }
}

/// Sends completion events down a channel; used by tests to assert on
/// exactly which completions were surfaced
pub struct ChannelNotifier {
    tx: tokio::sync::mpsc::UnboundedSender<CompletionEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<CompletionEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn publish(&self, event: &CompletionEvent) -> eyre::Result<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| eyre::eyre!("notification channel closed"))
    }
}
