//! Retry policy: the retry budget, the retry predicate, and the optional backoff.
//!
//! Semantics:
//! - `max_retries` counts retries only, so a call runs at most `max_retries + 1` attempts.
//! - Only the exact drain signature (`UNAVAILABLE` + `"GOAWAY received"`) is retryable. Every
//!   other failing status, including `UNAVAILABLE` with a different detail, resolves the call.
//!
//! ```rust
//! use redial::{Code, RetryPolicy, Status};
//!
//! let policy = RetryPolicy::new(1);
//! assert!(policy.should_retry(&Status::drain(), 1));
//! assert!(!policy.should_retry(&Status::drain(), 2));
//! assert!(!policy.should_retry(&Status::new(Code::Unavailable, "connection reset"), 1));
//! ```

use crate::backoff::Backoff;
use crate::error::BuildError;
use crate::status::Status;
use std::time::Duration;

/// Retry budget used by [`RetryPolicy::default`].
pub const DEFAULT_MAX_RETRIES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: usize,
    backoff: Backoff,
}

impl RetryPolicy {
    /// Policy with the given retry budget and no backoff.
    pub fn new(max_retries: usize) -> Self {
        Self { max_retries, backoff: Backoff::none() }
    }

    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Whether a failed attempt should be followed by attempt number `next_attempt`.
    ///
    /// `next_attempt` is the index the retry would carry: `1` for the first retry.
    pub fn should_retry(&self, status: &Status, next_attempt: usize) -> bool {
        next_attempt <= self.max_retries && status.is_drain()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: usize,
    backoff: Backoff,
}

impl RetryPolicyBuilder {
    pub fn new() -> Self {
        Self { max_retries: DEFAULT_MAX_RETRIES, backoff: Backoff::none() }
    }

    /// Number of retries allowed after the initial attempt. Zero disables retry.
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn build(self) -> RetryPolicy {
        RetryPolicy { max_retries: self.max_retries, backoff: self.backoff }
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Declarative form of a [`RetryPolicy`], suitable for config files.
///
/// With the `serde` feature enabled this deserializes from e.g.
/// `{"max_retries": 2, "backoff_ms": 50, "max_backoff_ms": 400, "jitter": true}`; every field is
/// optional. `backoff_ms = 0` means no backoff. A `max_backoff_ms` turns the schedule
/// exponential, otherwise it is constant.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RetrySettings {
    pub max_retries: usize,
    pub backoff_ms: u64,
    pub max_backoff_ms: Option<u64>,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_ms: 0,
            max_backoff_ms: None,
            jitter: false,
        }
    }
}

impl TryFrom<RetrySettings> for RetryPolicy {
    type Error = BuildError;

    fn try_from(settings: RetrySettings) -> Result<Self, Self::Error> {
        let base = Duration::from_millis(settings.backoff_ms);
        let mut backoff = match (settings.backoff_ms, settings.max_backoff_ms) {
            (0, _) => Backoff::none(),
            (_, Some(max)) => Backoff::exponential(base).with_max(Duration::from_millis(max))?,
            (_, None) => Backoff::constant(base),
        };
        if settings.jitter {
            backoff = backoff.with_full_jitter();
        }
        Ok(RetryPolicy::builder().max_retries(settings.max_retries).backoff(backoff).build())
    }
}
