//! Domain types for crawl scheduling

mod job;
mod target;

pub use job::{Job, JobStatus, generate_job_id, job_key};
pub use target::{Target, TargetConfig, TargetError, TargetType, normalize_url};
