//! Convenient re-exports for common redial types.
pub use crate::{
    attempt::{AttemptCall, AttemptListener, Transport},
    backoff::Backoff,
    controller::{Outcome, RetryController},
    error::CallError,
    metadata::{Metadata, RETRIES_KEY},
    policy::RetryPolicy,
    service::{RetryLayer, UnaryRequest},
    status::{Code, Status, DRAIN_MARKER},
    telemetry::{LogSink, MemorySink, NullSink},
};
