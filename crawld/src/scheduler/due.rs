//! Due-ness evaluation
//!
//! Pure decision: should this target be crawled now? Callers resolve the
//! last finished job from the ledger and pass it in, so the rule itself
//! touches no state and is trivially testable.

use crate::domain::{Job, Target};

/// Decide whether a target's crawl interval has elapsed.
///
/// Rules, in order:
/// - interval of 0 means manual-only, never due
/// - a target that has never finished a crawl is due immediately
/// - a recorded job id that resolves to nothing (dangling reference) counts
///   as never crawled, so the target is due rather than stuck forever
/// - otherwise due once `interval` hours have passed since the last finish
pub fn is_due(target: &Target, last_finished: Option<&Job>, now_ms: i64) -> bool {
    if target.crawl_interval_hours == 0 {
        return false;
    }

    if target.last_finished_job_id.is_none() {
        return true;
    }

    let Some(job) = last_finished else {
        // Dangling reference
        return true;
    };

    let Some(finished_at) = job.finished_at else {
        return true;
    };

    let interval_ms = target.crawl_interval_hours as i64 * 60 * 60 * 1000;
    now_ms - finished_at >= interval_ms
}
