//! Optional pause between a drained attempt and its retry.
//!
//! The transport's own reconnection strategy usually governs timing, so the default is
//! [`Backoff::none`]: the retry is issued as soon as the drain is classified. Retry index `0` is the
//! initial attempt and never waits; the first retry is index `1`.
//!
//! ```rust
//! use std::time::Duration;
//! use redial::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_millis(10))
//!     .with_max(Duration::from_millis(50))
//!     .unwrap();
//! assert_eq!(backoff.delay(0), Duration::ZERO);
//! assert_eq!(backoff.delay(1), Duration::from_millis(10));
//! assert_eq!(backoff.delay(3), Duration::from_millis(40));
//! assert_eq!(backoff.delay(4), Duration::from_millis(50)); // capped
//! ```

use crate::error::BuildError;
use rand::Rng;
use std::time::Duration;

/// Saturation point for overflowing computations (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Schedule {
    None,
    Constant(Duration),
    Exponential { base: Duration, max: Option<Duration> },
}

/// Delay schedule applied before each retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    schedule: Schedule,
    full_jitter: bool,
}

impl Backoff {
    /// Retry immediately.
    pub fn none() -> Self {
        Self { schedule: Schedule::None, full_jitter: false }
    }

    pub fn constant(delay: Duration) -> Self {
        Self { schedule: Schedule::Constant(delay), full_jitter: false }
    }

    /// `base * 2^(retry - 1)`, saturating at [`MAX_BACKOFF`].
    pub fn exponential(base: Duration) -> Self {
        Self { schedule: Schedule::Exponential { base, max: None }, full_jitter: false }
    }

    /// Cap an exponential schedule.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BuildError> {
        if max.is_zero() {
            return Err(BuildError::MaxMustBePositive);
        }
        match &mut self.schedule {
            Schedule::Exponential { base, max: cap } => {
                if max < *base {
                    return Err(BuildError::MaxLessThanBase { base: *base, max });
                }
                *cap = Some(max);
                Ok(self)
            }
            _ => Err(BuildError::MaxRequiresExponential),
        }
    }

    /// Draw each delay uniformly from `[0, computed]`.
    pub fn with_full_jitter(mut self) -> Self {
        self.full_jitter = true;
        self
    }

    pub fn is_none(&self) -> bool {
        matches!(self.schedule, Schedule::None)
    }

    /// Delay before retry number `retry`.
    pub fn delay(&self, retry: usize) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let computed = match self.schedule {
            Schedule::None => Duration::ZERO,
            Schedule::Constant(delay) => delay.min(MAX_BACKOFF),
            Schedule::Exponential { base, max } => {
                let exponent = (retry - 1).min(u32::MAX as usize) as u32;
                let nanos = base.as_nanos().saturating_mul(2u128.saturating_pow(exponent));
                let delay = Duration::from_nanos(nanos.min(MAX_BACKOFF.as_nanos()) as u64);
                max.map_or(delay, |cap| delay.min(cap))
            }
        };
        if self.full_jitter && !computed.is_zero() {
            let upper = computed.as_nanos() as u64;
            Duration::from_nanos(rand::rng().random_range(0..=upper))
        } else {
            computed
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::none()
    }
}
