//! Dispatch error types

use thiserror::Error;

/// Errors that can occur while talking to the compute cluster
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Compute capacity unavailable: {0}")]
    CapacityUnavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid job spec: {0}")]
    InvalidSpec(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl DispatchError {
    /// Check if this submission error is retryable. Capacity shortfalls and
    /// network failures are transient; permission and spec errors never
    /// resolve by retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::CapacityUnavailable(_) => true,
            DispatchError::Network(_) => true,
            DispatchError::PermissionDenied(_) => false,
            DispatchError::InvalidSpec(_) => false,
            DispatchError::JobNotFound(_) => false,
        }
    }
}

/// Check if a worker exit reason warrants resubmitting the job. Matches the
/// transient failure modes seen in practice: the node could not pull the
/// worker image, or the container was OOM-killed (exit code 137).
pub fn is_retryable_exit(reason: &str) -> bool {
    let reason = reason.to_lowercase();
    reason.contains("cannot pull") || reason.contains("exit code 137")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(DispatchError::CapacityUnavailable("no hosts".to_string()).is_retryable());
        assert!(!DispatchError::PermissionDenied("bad token".to_string()).is_retryable());
        assert!(!DispatchError::InvalidSpec("missing url".to_string()).is_retryable());
        assert!(!DispatchError::JobNotFound("job-1".to_string()).is_retryable());
    }

    #[test]
    fn test_is_retryable_exit() {
        assert!(is_retryable_exit("cannot pull execution image"));
        assert!(is_retryable_exit("Cannot Pull execution image: registry timeout"));
        assert!(is_retryable_exit("worker killed: exit code 137"));
        assert!(!is_retryable_exit("exit code 1"));
        assert!(!is_retryable_exit("crawl failed: too many 404s"));
    }
}
