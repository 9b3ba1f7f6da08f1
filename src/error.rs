//! Error types for the retry controller and its configuration.
use crate::status::Status;
use std::time::Duration;

/// Failure Outcome of a logical call.
///
/// Exactly one of these (or a response) is produced per call. Both variants carry the final
/// terminal status observed on the last attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    /// A non-retryable status, surfaced unchanged.
    #[error("call failed: {0}")]
    Status(Status),
    /// The drain signature recurred after the retry budget was spent.
    #[error("retry exhausted after {attempts} attempts; last status: {status}")]
    RetryExhausted { attempts: usize, status: Status },
}

impl CallError {
    /// Final terminal status, whichever way the call failed.
    pub fn status(&self) -> &Status {
        match self {
            Self::Status(status) => status,
            Self::RetryExhausted { status, .. } => status,
        }
    }

    pub fn into_status(self) -> Status {
        match self {
            Self::Status(status) => status,
            Self::RetryExhausted { status, .. } => status,
        }
    }

    /// Check if this error is due to retry exhaustion
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::RetryExhausted { .. })
    }

    /// Total attempts run before giving up, when the budget was exhausted.
    pub fn attempts(&self) -> Option<usize> {
        match self {
            Self::RetryExhausted { attempts, .. } => Some(*attempts),
            Self::Status(_) => None,
        }
    }
}

/// Errors produced while building a policy or backoff.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("backoff cap must be greater than zero")]
    MaxMustBePositive,
    #[error("backoff cap ({max:?}) must be >= base ({base:?})")]
    MaxLessThanBase { base: Duration, max: Duration },
    #[error("backoff cap is only valid for exponential backoff")]
    MaxRequiresExponential,
}
