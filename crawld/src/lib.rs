//! crawld - crawl target scheduler and job orchestrator
//!
//! crawld periodically decides which registered crawl targets are due for a
//! run, dispatches bounded crawl jobs to a compute cluster, tracks each job's
//! lifecycle in a durable ledger, and publishes completion events. The page
//! fetching itself, artifact storage, and the notification transport are
//! external collaborators; this crate owns the scheduling decisions, the
//! retry policy, and the persisted target/job state.
//!
//! # Modules
//!
//! - [`domain`] - Target and Job record types
//! - [`state`] - StateManager actor owning the target store and job ledger
//! - [`dispatch`] - job runner interface, cluster adapter, and retry policy
//! - [`scheduler`] - due-ness evaluation and the periodic scheduling loop
//! - [`notify`] - best-effort completion event publishing
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod notify;
pub mod scheduler;
pub mod state;

// Re-export commonly used types
pub use config::{ClusterConfig, Config, NotifyConfig, StorageConfig};
pub use dispatch::{
    DispatchError, Dispatcher, HttpRunner, InMemoryRunner, JobHandle, JobRunner, JobSpec, RunnerStatus,
    is_retryable_exit,
};
pub use domain::{Job, JobStatus, Target, TargetConfig, TargetError, TargetType};
pub use notify::{ChannelNotifier, CompletionEvent, LogNotifier, Notifier, WebhookNotifier};
pub use scheduler::{SchedulerConfig, SchedulerLoop, is_due};
pub use state::{StateCommand, StateError, StateManager, StateResponse};
