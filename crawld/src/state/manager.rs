//! StateManager - actor that owns the record store
//!
//! Processes commands via channels for thread-safe access to persistent state.

use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crawlstore::{Filter, IndexValue, Store, StoreError};

use crate::domain::{Job, Target, TargetConfig, job_key, normalize_url};

use super::messages::{StateCommand, StateError, StateResponse};

fn store_err(e: StoreError) -> StateError {
    match e {
        StoreError::Conflict { id, .. } => StateError::Conflict(id),
        StoreError::NotFound(what) => StateError::NotFound(what),
        other => StateError::StoreError(other.to_string()),
    }
}

/// Handle to send commands to the StateManager
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
}

impl StateManager {
    /// Spawn a new StateManager actor
    pub fn spawn(store_path: impl AsRef<Path>) -> eyre::Result<Self> {
        debug!(store_path = %store_path.as_ref().display(), "spawn: called");
        let mut store = Store::open(store_path.as_ref())?;

        // Rebuild indexes for all record types after open so status-based
        // queries work correctly
        let target_count = store.rebuild_indexes::<Target>()?;
        let job_count = store.rebuild_indexes::<Job>()?;
        info!(target_count, job_count, "Rebuilt indexes for Target and Job records");

        let (tx, rx) = mpsc::channel(256);

        // Spawn the actor task
        tokio::spawn(actor_loop(store, rx));

        info!("StateManager spawned");

        Ok(Self { tx })
    }

    // === Target operations ===

    /// Register a target, or overwrite the configuration of an existing one.
    /// Crawl history (sitemaps, last finished job, creation time) survives
    /// re-registration. Returns the stored target.
    pub async fn upsert_target(&self, config: TargetConfig) -> StateResponse<Target> {
        debug!(url = %config.url, "upsert_target: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::UpsertTarget {
                config,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Get a target by URL (normalized before lookup)
    pub async fn get_target(&self, url: &str) -> StateResponse<Option<Target>> {
        debug!(%url, "get_target: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::GetTarget {
                url: url.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Get a target by URL, returning error if not found
    pub async fn get_target_required(&self, url: &str) -> Result<Target, StateError> {
        debug!(%url, "get_target_required: called");
        self.get_target(url)
            .await?
            .ok_or_else(|| StateError::NotFound(format!("Target {}", url)))
    }

    /// List all registered targets
    pub async fn list_targets(&self) -> StateResponse<Vec<Target>> {
        debug!("list_targets: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::ListTargets { reply: reply_tx })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Deregister a target. The job ledger keeps that target's history.
    /// Deleting an unknown target is a no-op.
    pub async fn delete_target(&self, url: &str) -> StateResponse<()> {
        debug!(%url, "delete_target: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::DeleteTarget {
                url: url.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Write a target only if nobody else has updated it since it was read.
    /// `expected_updated_at` is the timestamp the caller read; a mismatch
    /// returns [`StateError::Conflict`] and leaves the stored target alone.
    pub async fn update_target_checked(
        &self,
        target: Target,
        expected_updated_at: i64,
    ) -> StateResponse<()> {
        debug!(url = %target.url, expected_updated_at, "update_target_checked: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::UpdateTargetChecked {
                target,
                expected_updated_at,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    // === Job ledger operations ===

    /// Create a new job ledger entry
    pub async fn create_job(&self, job: Job) -> StateResponse<String> {
        debug!(key = %job.key, status = %job.status, "create_job: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::CreateJob {
                job,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Get a job by its composite key
    pub async fn get_job(&self, target_url: &str, job_id: &str) -> StateResponse<Option<Job>> {
        debug!(%target_url, %job_id, "get_job: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::GetJob {
                target_url: target_url.to_string(),
                job_id: job_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Update a job ledger entry
    pub async fn update_job(&self, job: Job) -> StateResponse<()> {
        debug!(key = %job.key, status = %job.status, "update_job: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::UpdateJob {
                job,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// List jobs with optional filters
    pub async fn list_jobs(
        &self,
        target_filter: Option<String>,
        status_filter: Option<String>,
    ) -> StateResponse<Vec<Job>> {
        debug!(?target_filter, ?status_filter, "list_jobs: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::ListJobs {
                target_filter,
                status_filter,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Get the target's outstanding job, if any. At most one job per target
    /// is ever non-terminal, so this returns at most one entry.
    pub async fn outstanding_job(&self, target_url: &str) -> StateResponse<Option<Job>> {
        debug!(%target_url, "outstanding_job: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::OutstandingJob {
                target_url: target_url.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Shutdown the StateManager
    pub async fn shutdown(&self) -> Result<(), StateError> {
        debug!("shutdown: called");
        self.tx
            .send(StateCommand::Shutdown)
            .await
            .map_err(|_| StateError::ChannelError)
    }
}

/// The actor loop that owns the Store and processes commands
async fn actor_loop(mut store: Store, mut rx: mpsc::Receiver<StateCommand>) {
    debug!("StateManager actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            // Target operations
            StateCommand::UpsertTarget { config, reply } => {
                debug!(url = %config.url, "actor_loop: UpsertTarget command");
                let _ = reply.send(upsert_target(&mut store, config));
            }

            StateCommand::GetTarget { url, reply } => {
                debug!(%url, "actor_loop: GetTarget command");
                let result = match normalize_url(&url) {
                    Ok(normalized) => store.get::<Target>(&normalized).map_err(store_err),
                    Err(e) => Err(StateError::InvalidTarget(e.to_string())),
                };
                let _ = reply.send(result);
            }

            StateCommand::ListTargets { reply } => {
                debug!("actor_loop: ListTargets command");
                let result = store.list::<Target>(&[]).map_err(store_err);
                let _ = reply.send(result);
            }

            StateCommand::DeleteTarget { url, reply } => {
                debug!(%url, "actor_loop: DeleteTarget command");
                let result = match normalize_url(&url) {
                    Ok(normalized) => store.delete::<Target>(&normalized).map_err(store_err),
                    Err(e) => Err(StateError::InvalidTarget(e.to_string())),
                };
                let _ = reply.send(result);
            }

            StateCommand::UpdateTargetChecked {
                target,
                expected_updated_at,
                reply,
            } => {
                debug!(url = %target.url, "actor_loop: UpdateTargetChecked command");
                let result = store
                    .update_checked(target, expected_updated_at)
                    .map_err(store_err);
                let _ = reply.send(result);
            }

            // Job ledger operations
            StateCommand::CreateJob { job, reply } => {
                debug!(key = %job.key, "actor_loop: CreateJob command");
                let result = store.create(job).map_err(store_err);
                let _ = reply.send(result);
            }

            StateCommand::GetJob {
                target_url,
                job_id,
                reply,
            } => {
                debug!(%target_url, %job_id, "actor_loop: GetJob command");
                let result = store
                    .get::<Job>(&job_key(&target_url, &job_id))
                    .map_err(store_err);
                let _ = reply.send(result);
            }

            StateCommand::UpdateJob { job, reply } => {
                debug!(key = %job.key, "actor_loop: UpdateJob command");
                let result = store.update(job).map_err(store_err);
                let _ = reply.send(result);
            }

            StateCommand::ListJobs {
                target_filter,
                status_filter,
                reply,
            } => {
                debug!(?target_filter, ?status_filter, "actor_loop: ListJobs command");
                let mut filters = Vec::new();
                if let Some(target_url) = target_filter {
                    filters.push(Filter::eq("target_url", IndexValue::String(target_url)));
                }
                if let Some(status) = status_filter {
                    filters.push(Filter::eq("status", IndexValue::String(status)));
                }

                let result = store.list::<Job>(&filters).map_err(store_err);
                let _ = reply.send(result);
            }

            StateCommand::OutstandingJob { target_url, reply } => {
                debug!(%target_url, "actor_loop: OutstandingJob command");
                let result = outstanding_job(&store, &target_url);
                let _ = reply.send(result);
            }

            StateCommand::Shutdown => {
                debug!("actor_loop: Shutdown command");
                break;
            }
        }
    }

    debug!("StateManager actor stopped");
}

/// Upsert: overwrite the configuration of an existing target or create a
/// fresh one. History fields are merged, never reset.
fn upsert_target(store: &mut Store, config: TargetConfig) -> StateResponse<Target> {
    let url =
        normalize_url(&config.url).map_err(|e| StateError::InvalidTarget(e.to_string()))?;

    match store.get::<Target>(&url).map_err(store_err)? {
        Some(mut existing) => {
            existing.apply_registration(config);
            store.update(existing.clone()).map_err(store_err)?;
            Ok(existing)
        }
        None => {
            let target = Target::new(config).map_err(|e| StateError::InvalidTarget(e.to_string()))?;
            store.create(target.clone()).map_err(store_err)?;
            Ok(target)
        }
    }
}

/// Find the non-terminal job for a target. Checks both indexed statuses so
/// a job submitted on a previous tick is still found once it starts running.
fn outstanding_job(store: &Store, target_url: &str) -> StateResponse<Option<Job>> {
    for status in ["submitted", "running"] {
        let jobs = store
            .list::<Job>(&[
                Filter::eq("target_url", IndexValue::String(target_url.to_string())),
                Filter::eq("status", IndexValue::String(status.to_string())),
            ])
            .map_err(store_err)?;
        if let Some(job) = jobs.into_iter().next() {
            return Ok(Some(job));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobStatus, TargetType};
    use tempfile::tempdir;

    fn config(url: &str, interval: u32) -> TargetConfig {
        TargetConfig {
            url: url.to_string(),
            target_type: TargetType::Website,
            max_requests: 0,
            max_files: 0,
            download_files: true,
            file_types: Vec::new(),
            ignore_robots_txt: false,
            crawl_interval_hours: interval,
        }
    }

    #[tokio::test]
    async fn test_upsert_creates_then_merges() {
        let temp = tempdir().unwrap();
        let state = StateManager::spawn(temp.path()).unwrap();

        let created = state.upsert_target(config("example.com", 24)).await.unwrap();
        assert_eq!(created.url, "https://example.com");
        assert_eq!(created.crawl_interval_hours, 24);

        // Simulate crawl history, then re-register with new config
        let mut target = state.get_target_required("example.com").await.unwrap();
        target.set_last_finished_job("job-1");
        state
            .update_target_checked(target.clone(), created.updated_at)
            .await
            .unwrap();

        let merged = state.upsert_target(config("example.com", 6)).await.unwrap();
        assert_eq!(merged.crawl_interval_hours, 6);
        assert_eq!(merged.last_finished_job_id, Some("job-1".to_string()));
        assert_eq!(merged.created_at, created.created_at);

        let all = state.list_targets().await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_rejects_invalid_url() {
        let temp = tempdir().unwrap();
        let state = StateManager::spawn(temp.path()).unwrap();

        let result = state.upsert_target(config("   ", 24)).await;
        assert!(matches!(result, Err(StateError::InvalidTarget(_))));
    }

    #[tokio::test]
    async fn test_delete_target_keeps_ledger() {
        let temp = tempdir().unwrap();
        let state = StateManager::spawn(temp.path()).unwrap();

        state.upsert_target(config("example.com", 24)).await.unwrap();
        let mut job = Job::new("https://example.com", "job-1", 1);
        job.finish(JobStatus::Succeeded, None);
        state.create_job(job).await.unwrap();

        state.delete_target("example.com").await.unwrap();
        assert!(state.get_target("example.com").await.unwrap().is_none());

        // History survives deregistration
        let jobs = state
            .list_jobs(Some("https://example.com".to_string()), None)
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);

        // Deleting again is a no-op
        state.delete_target("example.com").await.unwrap();
    }

    #[tokio::test]
    async fn test_update_target_checked_conflict() {
        let temp = tempdir().unwrap();
        let state = StateManager::spawn(temp.path()).unwrap();

        let original = state.upsert_target(config("example.com", 24)).await.unwrap();

        // First writer wins
        let mut first = original.clone();
        first.set_last_finished_job("job-1");
        state
            .update_target_checked(first, original.updated_at)
            .await
            .unwrap();

        // Second writer with the stale timestamp is rejected
        let mut second = original.clone();
        second.set_last_finished_job("job-2");
        let result = state.update_target_checked(second, original.updated_at).await;
        assert!(matches!(result, Err(StateError::Conflict(_))));

        let stored = state.get_target_required("example.com").await.unwrap();
        assert_eq!(stored.last_finished_job_id, Some("job-1".to_string()));
    }

    #[tokio::test]
    async fn test_outstanding_job_lookup() {
        let temp = tempdir().unwrap();
        let state = StateManager::spawn(temp.path()).unwrap();

        assert!(state.outstanding_job("https://example.com").await.unwrap().is_none());

        state
            .create_job(Job::new("https://example.com", "job-1", 1))
            .await
            .unwrap();
        let outstanding = state.outstanding_job("https://example.com").await.unwrap();
        assert_eq!(outstanding.unwrap().job_id, "job-1");

        // Running jobs still occupy the slot
        let mut job = state.get_job("https://example.com", "job-1").await.unwrap().unwrap();
        job.mark_running();
        state.update_job(job).await.unwrap();
        assert!(state.outstanding_job("https://example.com").await.unwrap().is_some());

        // Terminal jobs free it
        let mut job = state.get_job("https://example.com", "job-1").await.unwrap().unwrap();
        job.finish(JobStatus::Succeeded, None);
        state.update_job(job).await.unwrap();
        assert!(state.outstanding_job("https://example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_job_key_fails() {
        let temp = tempdir().unwrap();
        let state = StateManager::spawn(temp.path()).unwrap();

        state
            .create_job(Job::new("https://example.com", "job-1", 1))
            .await
            .unwrap();
        let result = state
            .create_job(Job::new("https://example.com", "job-1", 1))
            .await;
        assert!(result.is_err());

        // Same job id under a different target is a distinct ledger entry
        state
            .create_job(Job::new("https://other.com", "job-1", 1))
            .await
            .unwrap();
    }
}
