//! Scheduler loop implementation
//!
//! Each tick walks every registered target exactly once. A target with an
//! occupied scheduling slot gets its cluster status polled and settled; a
//! target with a free slot gets a new job if its interval has elapsed.
//! Per-target errors are logged and never abort the tick.
//!
//! The slot (`Target::outstanding_job_id`) is the synchronization point:
//! every occupant change goes through a conditional write, so two schedulers
//! over the same store (the daemon loop plus a cron `tick`, say) cannot both
//! submit for one target.

use std::sync::Arc;

use crawlstore::now_ms;
use eyre::{Context, Result};
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::dispatch::{Dispatcher, MAX_SUBMIT_ATTEMPTS, RunnerStatus, is_retryable_exit};
use crate::domain::{Job, JobStatus, Target, generate_job_id};
use crate::notify::{CompletionEvent, Notifier};
use crate::state::{StateError, StateManager};

use super::config::SchedulerConfig;

/// What became of one dispatch attempt
enum DispatchOutcome {
    /// The cluster accepted the job; a Submitted ledger entry records it
    Submitted(String),
    /// Submission failed terminally; a Failed ledger entry records it
    Failed { reason: String },
    /// Another scheduler claimed the slot first
    Skipped,
}

/// The periodic crawl scheduler
pub struct SchedulerLoop {
    config: SchedulerConfig,
    state: StateManager,
    dispatcher: Arc<Dispatcher>,
    notifier: Arc<dyn Notifier>,
}

impl SchedulerLoop {
    pub fn new(
        config: SchedulerConfig,
        state: StateManager,
        dispatcher: Arc<Dispatcher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            state,
            dispatcher,
            notifier,
        }
    }

    /// Run ticks forever at the configured interval. A slow tick delays the
    /// next one instead of bunching missed ticks together.
    pub async fn run(&self) -> Result<()> {
        info!(interval_secs = self.config.tick_interval_secs, "Scheduler loop started");
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(e) = self.tick().await {
                error!(error = %e, "Scheduler tick failed");
            }
        }
    }

    /// Run one scheduling pass over all targets
    pub async fn tick(&self) -> Result<()> {
        debug!("tick: called");
        let targets = self.state.list_targets().await.context("listing targets")?;
        debug!(target_count = targets.len(), "tick: walking targets");

        let results = join_all(targets.iter().map(|target| self.process_target(target))).await;

        for (target, result) in targets.iter().zip(results) {
            if let Err(e) = result {
                error!(url = %target.url, error = %e, "Failed to process target");
            }
        }
        Ok(())
    }

    /// Dispatch a crawl for a target immediately, bypassing the interval
    /// check. Fails if the target is unknown, already has a job in flight,
    /// or the submission itself fails.
    pub async fn trigger(&self, url: &str) -> Result<String> {
        debug!(%url, "trigger: called");
        let target = self.state.get_target_required(url).await?;

        if let Some(slot_id) = &target.outstanding_job_id {
            return Err(eyre::eyre!(
                "Target {} already has job {} in flight",
                target.url,
                slot_id
            ));
        }
        if let Some(job) = self.state.outstanding_job(&target.url).await? {
            return Err(eyre::eyre!(
                "Target {} already has job {} in flight",
                target.url,
                job.job_id
            ));
        }

        match self.dispatch(&target, 1, None).await? {
            DispatchOutcome::Submitted(job_id) => Ok(job_id),
            DispatchOutcome::Failed { reason } => {
                Err(eyre::eyre!("Dispatch for {} failed: {}", target.url, reason))
            }
            DispatchOutcome::Skipped => {
                Err(eyre::eyre!("Target {} is already being scheduled", target.url))
            }
        }
    }

    /// One target, one action: settle the slot occupant if there is one,
    /// otherwise dispatch if due.
    async fn process_target(&self, target: &Target) -> Result<()> {
        if let Some(slot_id) = &target.outstanding_job_id {
            return match self.state.get_job(&target.url, slot_id).await? {
                Some(job) if job.is_outstanding() => self.check_outstanding(target, job).await,
                Some(job) => self.reconcile_settled(target, &job).await,
                None => {
                    // A dispatch claim that never became a job (interrupted
                    // between claim and submit); release it and retry next tick
                    warn!(url = %target.url, %slot_id, "Releasing stale scheduling claim");
                    self.transition_slot(&target.url, Some(slot_id.as_str()), None, None).await?;
                    Ok(())
                }
            };
        }

        if let Some(job) = self.state.outstanding_job(&target.url).await? {
            // Outstanding ledger entry without a claim; re-attach it so the
            // slot keeps excluding new dispatches
            warn!(url = %target.url, job_id = %job.job_id, "Adopting outstanding job into slot");
            self.transition_slot(&target.url, None, Some(job.job_id.clone()), None).await?;
            return Ok(());
        }

        let last_finished = self.last_finished_job(target).await?;
        if super::due::is_due(target, last_finished.as_ref(), now_ms()) {
            debug!(url = %target.url, "process_target: due, dispatching");
            self.dispatch(target, 1, None).await?;
        }
        Ok(())
    }

    /// Resolve the job behind `last_finished_job_id`, warning when the
    /// ledger no longer has it
    async fn last_finished_job(&self, target: &Target) -> Result<Option<Job>> {
        let Some(job_id) = &target.last_finished_job_id else {
            return Ok(None);
        };
        let job = self.state.get_job(&target.url, job_id).await?;
        if job.is_none() {
            warn!(url = %target.url, %job_id, "Last finished job missing from ledger");
        }
        Ok(job)
    }

    /// Poll an outstanding job and settle it if the cluster says it is done
    async fn check_outstanding(&self, target: &Target, mut job: Job) -> Result<()> {
        debug!(url = %target.url, job_id = %job.job_id, "check_outstanding: called");
        let status = match self.dispatcher.poll(&job.job_id).await {
            Ok(status) => status,
            Err(crate::dispatch::DispatchError::JobNotFound(_)) => {
                // The cluster lost the job; surface it as a failure
                warn!(url = %target.url, job_id = %job.job_id, "Outstanding job unknown to cluster");
                RunnerStatus::Failed {
                    exit_reason: "job not found on cluster".to_string(),
                }
            }
            Err(e) => {
                // Transient poll failure, try again next tick
                warn!(url = %target.url, job_id = %job.job_id, error = %e, "Failed to poll job");
                return Ok(());
            }
        };

        match status {
            RunnerStatus::Queued => Ok(()),
            RunnerStatus::Running => {
                if job.status == JobStatus::Submitted {
                    job.mark_running();
                    self.state.update_job(job).await?;
                }
                Ok(())
            }
            RunnerStatus::Succeeded => self.settle(target, job, JobStatus::Succeeded, None).await,
            RunnerStatus::Failed { exit_reason } => {
                if is_retryable_exit(&exit_reason) && job.attempt < MAX_SUBMIT_ATTEMPTS {
                    self.resubmit(target, job, exit_reason).await
                } else {
                    self.settle(target, job, JobStatus::Failed, Some(exit_reason)).await
                }
            }
            RunnerStatus::Cancelled => self.settle(target, job, JobStatus::Cancelled, None).await,
        }
    }

    /// Surface a finished job: finalize the ledger entry first, so the
    /// target never references a non-terminal job, then release the slot and
    /// record the finish in one conditional write, then notify. Cancelled
    /// jobs free the slot but never advance the due-ness clock. A settlement
    /// cut short between the two writes leaves a terminal job in the slot,
    /// which the next tick finishes via [`Self::reconcile_settled`].
    async fn settle(
        &self,
        target: &Target,
        mut job: Job,
        status: JobStatus,
        exit_reason: Option<String>,
    ) -> Result<()> {
        debug!(url = %target.url, job_id = %job.job_id, %status, "settle: called");
        let slot = job.job_id.clone();
        job.finish(status, exit_reason);
        self.state.update_job(job.clone()).await?;

        let last_finished = (status != JobStatus::Cancelled).then_some(job.job_id.as_str());
        if !self.transition_slot(&target.url, Some(slot.as_str()), None, last_finished).await? {
            warn!(url = %target.url, job_id = %job.job_id, "Deferring slot release to next tick");
        }
        self.publish(&job).await;
        Ok(())
    }

    /// The ledger entry is terminal but the slot was never released (a
    /// settlement or retry interrupted between its two writes). Finish the
    /// target half; the completion event is not replayed.
    async fn reconcile_settled(&self, target: &Target, job: &Job) -> Result<()> {
        warn!(url = %target.url, job_id = %job.job_id, status = %job.status, "Finishing interrupted settlement");
        let retried_quietly = job.status == JobStatus::Failed
            && job.attempt < MAX_SUBMIT_ATTEMPTS
            && job.exit_reason.as_deref().is_some_and(is_retryable_exit);
        let last_finished = (job.status != JobStatus::Cancelled && !retried_quietly)
            .then_some(job.job_id.as_str());
        self.transition_slot(&target.url, Some(job.job_id.as_str()), None, last_finished).await?;
        Ok(())
    }

    /// A worker exit we treat as transient: finalize this attempt quietly
    /// and submit a replacement into the same slot. The intermediate failure
    /// never touches the target's due-ness clock and is never notified.
    async fn resubmit(&self, target: &Target, mut job: Job, exit_reason: String) -> Result<()> {
        info!(
            url = %target.url,
            job_id = %job.job_id,
            attempt = job.attempt,
            %exit_reason,
            "Retrying job after transient worker failure"
        );
        let slot = job.job_id.clone();
        let next_attempt = job.attempt + 1;
        job.finish(JobStatus::Failed, Some(exit_reason));
        self.state.update_job(job).await?;

        self.dispatch(target, next_attempt, Some(slot.as_str())).await?;
        Ok(())
    }

    /// Claim the target's slot, submit, and record the job in the ledger.
    /// The claim happens before submission, so a competing scheduler that
    /// loses the conditional write skips instead of double-dispatching. A
    /// dispatch failure gets a terminal ledger entry and frees the slot but
    /// leaves the due-ness clock alone, so the next tick tries again.
    async fn dispatch(
        &self,
        target: &Target,
        attempt: u32,
        expected_slot: Option<&str>,
    ) -> Result<DispatchOutcome> {
        let claim = format!("pending:{}", generate_job_id());
        if !self.transition_slot(&target.url, expected_slot, Some(claim.clone()), None).await? {
            debug!(url = %target.url, "dispatch: slot already claimed");
            return Ok(DispatchOutcome::Skipped);
        }

        match self.dispatcher.submit(target).await {
            Ok(handle) => {
                let job = Job::new(&target.url, &handle.job_id, attempt);
                self.state.create_job(job).await?;
                if !self.transition_slot(&target.url, Some(claim.as_str()), Some(handle.job_id.clone()), None).await? {
                    warn!(url = %target.url, job_id = %handle.job_id, "Lost scheduling claim after submission");
                }
                info!(url = %target.url, job_id = %handle.job_id, attempt, "Dispatched crawl job");
                Ok(DispatchOutcome::Submitted(handle.job_id))
            }
            Err(e) => {
                error!(url = %target.url, attempt, error = %e, "Failed to dispatch crawl job");
                let reason = e.to_string();
                let mut job = Job::failed_dispatch(&target.url, reason.as_str());
                job.attempt = attempt;
                self.state.create_job(job).await?;
                self.transition_slot(&target.url, Some(claim.as_str()), None, None).await?;
                Ok(DispatchOutcome::Failed { reason })
            }
        }
    }

    /// Compare-and-set the slot occupant, optionally recording a finished
    /// job in the same write. Re-reads on write conflicts (re-registration
    /// bumps `updated_at` without touching the slot) and gives up once the
    /// slot no longer holds `expected`. Returns whether the write landed; a
    /// deregistered target counts as landed, there is nothing left to hold.
    async fn transition_slot(
        &self,
        url: &str,
        expected: Option<&str>,
        next: Option<String>,
        last_finished: Option<&str>,
    ) -> Result<bool> {
        for attempt in 0..=self.config.update_retries {
            let Some(mut current) = self.state.get_target(url).await? else {
                debug!(%url, "transition_slot: target gone");
                return Ok(true);
            };
            if current.outstanding_job_id.as_deref() != expected {
                return Ok(false);
            }

            let expected_updated_at = current.updated_at;
            current.set_outstanding_job(next.clone());
            if let Some(job_id) = last_finished {
                current.set_last_finished_job(job_id);
            }
            match self.state.update_target_checked(current, expected_updated_at).await {
                Ok(()) => return Ok(true),
                Err(StateError::Conflict(_)) => {
                    debug!(%url, attempt, "transition_slot: conflict, re-reading");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(false)
    }

    async fn publish(&self, job: &Job) {
        let event = CompletionEvent::from_job(job);
        if let Err(e) = self.notifier.publish(&event).await {
            // Best effort only
            warn!(job_id = %job.job_id, error = %e, "Failed to publish completion event");
        }
    }
}
