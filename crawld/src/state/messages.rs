//! State manager messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{Job, Target, TargetConfig};

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Concurrent update detected: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Channel error")]
    ChannelError,
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

/// Commands sent to the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    // Target operations
    UpsertTarget {
        config: TargetConfig,
        reply: oneshot::Sender<StateResponse<Target>>,
    },
    GetTarget {
        url: String,
        reply: oneshot::Sender<StateResponse<Option<Target>>>,
    },
    ListTargets {
        reply: oneshot::Sender<StateResponse<Vec<Target>>>,
    },
    DeleteTarget {
        url: String,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    UpdateTargetChecked {
        target: Target,
        expected_updated_at: i64,
        reply: oneshot::Sender<StateResponse<()>>,
    },

    // Job ledger operations
    CreateJob {
        job: Job,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    GetJob {
        target_url: String,
        job_id: String,
        reply: oneshot::Sender<StateResponse<Option<Job>>>,
    },
    UpdateJob {
        job: Job,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    ListJobs {
        target_filter: Option<String>,
        status_filter: Option<String>,
        reply: oneshot::Sender<StateResponse<Vec<Job>>>,
    },
    OutstandingJob {
        target_url: String,
        reply: oneshot::Sender<StateResponse<Option<Job>>>,
    },

    // Shutdown
    Shutdown,
}
