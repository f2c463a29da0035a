//! Crawl scheduler
//!
//! Periodic loop that polls outstanding jobs, settles completions, and
//! dispatches new crawls for targets whose interval has elapsed.

mod config;
mod core;
mod due;

pub use config::SchedulerConfig;
pub use core::SchedulerLoop;
pub use due::is_due;
