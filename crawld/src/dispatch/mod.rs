//! Job dispatch
//!
//! Submits crawl jobs to the compute cluster and polls their status. The
//! [`JobRunner`] trait is the cluster seam: [`HttpRunner`] talks to a real
//! cluster API, [`InMemoryRunner`] drives tests.

mod dispatcher;
mod error;
mod fake;
mod http;
mod runner;

pub use dispatcher::{Dispatcher, MAX_SUBMIT_ATTEMPTS};
pub use error::{DispatchError, is_retryable_exit};
pub use fake::{FailureMode, InMemoryRunner};
pub use http::HttpRunner;
pub use runner::{JobHandle, JobRunner, JobSpec, RunnerStatus};
