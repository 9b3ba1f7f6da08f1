//! Retry controller: drives the attempts of one logical call to exactly one Outcome.
//!
//! Per-call state machine:
//!
//! ```text
//! STARTED -> ATTEMPT_PENDING -> { RETRYING -> ATTEMPT_PENDING }* -> RESOLVED
//! ```
//!
//! Semantics:
//! - Attempt #0 starts immediately with the caller's metadata. Attempt *k* (k >= 1) carries
//!   `retries = k` and the original request bytes.
//! - Attempt *n + 1* starts only after attempt *n*'s terminal status was observed and classified
//!   as a drain with budget remaining.
//! - A response message is held until its attempt's terminal status. On OK it becomes the
//!   Outcome; on a drain it is discarded with the attempt.
//! - Each attempt reports into its own channel, dropped when the attempt is settled. Signals from
//!   a superseded attempt therefore reach nobody.
//! - An attempt whose listener disappears without a status ends with `INTERNAL`.
//! - Dropping the future returned by [`RetryController::execute`] before it resolves abandons the
//!   call: the active attempt is cancelled and no Outcome is produced.
//!
//! Calls share nothing with each other. Each `execute` owns its metadata and its attempts.

use crate::attempt::{
    Attempt, AttemptCall, AttemptEvent, AttemptListener, Transport, DROPPED_WITHOUT_STATUS,
};
use crate::error::CallError;
use crate::metadata::Metadata;
use crate::policy::RetryPolicy;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::status::{Code, Status};
use crate::telemetry::{emit_best_effort, CallEvent, NullSink, TelemetrySink};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;

/// Detail of the failure produced when an attempt ends OK without a response.
pub const NO_MESSAGE_RECEIVED: &str = "no message received";
/// Detail of the failure produced when a unary attempt delivers a second response.
pub const TOO_MANY_RESPONSES: &str = "too many responses received";

/// The single value delivered to the caller of a logical call.
pub type Outcome = Result<Bytes, CallError>;

/// Position of a logical call in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Started,
    AttemptPending { attempt: usize },
    Retrying { attempt: usize },
    Resolved,
}

impl CallState {
    fn can_become(self, next: CallState) -> bool {
        use CallState::*;
        match (self, next) {
            (Started, AttemptPending { attempt }) => attempt == 0,
            (AttemptPending { attempt: a }, Retrying { attempt: b }) => b == a + 1,
            (Retrying { attempt: a }, AttemptPending { attempt: b }) => a == b,
            (AttemptPending { .. }, Resolved) => true,
            _ => false,
        }
    }
}

enum Decision {
    Resolve(Outcome),
    Retry(usize),
}

/// Everything the controller knows about one logical call.
struct LogicalCall {
    request: Bytes,
    metadata: Metadata,
    attempts: usize,
    state: CallState,
}

impl LogicalCall {
    fn new(request: Bytes, metadata: Metadata) -> Self {
        Self { request, metadata, attempts: 0, state: CallState::Started }
    }

    fn transition(&mut self, next: CallState) {
        debug_assert!(
            self.state.can_become(next),
            "invalid call transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(from = ?self.state, to = ?next, "call state transition");
        self.state = next;
    }
}

impl Drop for LogicalCall {
    fn drop(&mut self) {
        if self.state != CallState::Resolved {
            tracing::debug!(attempt = self.attempts, state = ?self.state, "logical call abandoned");
        }
    }
}

/// Issues logical calls over a [`Transport`], re-issuing them when a connection drains.
///
/// ```rust
/// # use redial::{AttemptCall, AttemptListener, Metadata, Status, Transport};
/// # use async_trait::async_trait;
/// # use bytes::Bytes;
/// # struct Echo;
/// # struct EchoCall(Option<AttemptListener>);
/// # impl AttemptCall for EchoCall {
/// #     fn send_message(&mut self, p: Bytes) { if let Some(l) = &self.0 { l.on_message(p) } }
/// #     fn half_close(&mut self) { if let Some(l) = self.0.take() { l.on_status(Status::ok()) } }
/// #     fn cancel(&mut self) {}
/// # }
/// # #[async_trait]
/// # impl Transport for Echo {
/// #     type Call = EchoCall;
/// #     async fn new_attempt(&self, _: &Metadata, l: AttemptListener) -> Result<EchoCall, Status> {
/// #         Ok(EchoCall(Some(l)))
/// #     }
/// # }
/// use redial::{RetryController, RetryPolicy};
///
/// # #[tokio::main]
/// # async fn main() {
/// let controller = RetryController::new(Echo);
/// let outcome = controller
///     .execute(Bytes::from_static(b"{\"seq\":1}"), Metadata::new(), &RetryPolicy::new(1))
///     .await;
/// assert_eq!(outcome.unwrap(), Bytes::from_static(b"{\"seq\":1}"));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RetryController<T, S = NullSink> {
    transport: T,
    sleeper: Arc<dyn Sleeper>,
    sink: S,
}

impl<T> RetryController<T, NullSink> {
    pub fn new(transport: T) -> Self {
        Self { transport, sleeper: Arc::new(TokioSleeper), sink: NullSink }
    }
}

impl<T, S> RetryController<T, S> {
    pub(crate) fn from_parts(transport: T, sleeper: Arc<dyn Sleeper>, sink: S) -> Self {
        Self { transport, sleeper, sink }
    }

    /// Replace the telemetry sink.
    pub fn with_sink<S2>(self, sink: S2) -> RetryController<T, S2> {
        RetryController { transport: self.transport, sleeper: self.sleeper, sink }
    }

    /// Provide a custom sleeper for backoff delays.
    pub fn with_sleeper<Z>(mut self, sleeper: Z) -> Self
    where
        Z: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T, S> RetryController<T, S>
where
    T: Transport,
    S: TelemetrySink + Sync,
    S::Future: Send + 'static,
{
    /// Run one logical call to its Outcome.
    ///
    /// Drains are retried invisibly while `policy` allows; any other failure resolves at once.
    pub async fn execute(
        &self,
        request: Bytes,
        metadata: Metadata,
        policy: &RetryPolicy,
    ) -> Outcome {
        let started = Instant::now();
        let mut call = LogicalCall::new(request, metadata);

        loop {
            let (status, response) = match self.begin_attempt(&mut call).await {
                Ok(mut attempt) => {
                    let status = await_terminal(&mut attempt).await;
                    (status, attempt.take_response())
                }
                Err(status) => (status, None),
            };

            match decide(status, response, call.attempts, policy) {
                Decision::Resolve(outcome) => {
                    call.transition(CallState::Resolved);
                    return self.resolve(call.attempts + 1, outcome, started).await;
                }
                Decision::Retry(next) => {
                    call.transition(CallState::Retrying { attempt: next });
                    let delay = policy.backoff().delay(next);
                    tracing::info!(
                        attempt = next,
                        max_retries = policy.max_retries(),
                        ?delay,
                        "connection drained; retrying call"
                    );
                    self.emit(CallEvent::DrainRetry { attempt: next, delay }).await;
                    if !delay.is_zero() {
                        self.sleeper.sleep(delay).await;
                    }
                    call.attempts = next;
                    call.metadata.set_retries(next);
                }
            }
        }
    }

    /// Start the attempt numbered `call.attempts` and send the request on it.
    async fn begin_attempt(&self, call: &mut LogicalCall) -> Result<Attempt<T::Call>, Status> {
        let index = call.attempts;
        call.transition(CallState::AttemptPending { attempt: index });
        tracing::debug!(attempt = index, retries = ?call.metadata.retries(), "starting attempt");
        self.emit(CallEvent::AttemptStarted { attempt: index }).await;

        let (listener, events) = AttemptListener::channel(index);
        match self.transport.new_attempt(&call.metadata, listener).await {
            Ok(mut handle) => {
                handle.send_message(call.request.clone());
                handle.half_close();
                Ok(Attempt::new(index, handle, events))
            }
            Err(status) => {
                tracing::debug!(attempt = index, %status, "transport refused attempt");
                Err(status)
            }
        }
    }

    async fn resolve(&self, attempts: usize, outcome: Outcome, started: Instant) -> Outcome {
        let duration = started.elapsed();
        match &outcome {
            Ok(_) => tracing::debug!(attempts, ?duration, "call resolved"),
            Err(CallError::RetryExhausted { status, .. }) => {
                tracing::warn!(attempts, %status, "retry budget exhausted");
                self.emit(CallEvent::Exhausted { attempts }).await;
            }
            Err(err) => tracing::debug!(attempts, error = %err, "call failed"),
        }
        self.emit(CallEvent::Resolved { attempts, success: outcome.is_ok(), duration }).await;
        outcome
    }

    async fn emit(&self, event: CallEvent) {
        emit_best_effort(self.sink.clone(), event).await;
    }
}

/// Wait for the attempt's terminal status, holding its response if one arrives.
async fn await_terminal<C: AttemptCall>(attempt: &mut Attempt<C>) -> Status {
    loop {
        match attempt.next_event().await {
            Some(AttemptEvent::Status(status)) => {
                attempt.finish();
                return status;
            }
            Some(AttemptEvent::Message(payload)) => {
                if attempt.hold_response(payload).is_err() {
                    tracing::warn!(
                        attempt = attempt.index(),
                        "unary attempt delivered a second response"
                    );
                    attempt.cancel();
                    return Status::new(Code::Internal, TOO_MANY_RESPONSES);
                }
            }
            None => {
                tracing::warn!(attempt = attempt.index(), "listener dropped without status");
                attempt.finish();
                return Status::new(Code::Internal, DROPPED_WITHOUT_STATUS);
            }
        }
    }
}

/// Classify the terminal status of attempt `attempt`.
fn decide(
    status: Status,
    response: Option<Bytes>,
    attempt: usize,
    policy: &RetryPolicy,
) -> Decision {
    if status.is_ok() {
        return Decision::Resolve(match response {
            Some(payload) => Ok(payload),
            None => Err(CallError::Status(Status::new(Code::Internal, NO_MESSAGE_RECEIVED))),
        });
    }
    let next = attempt + 1;
    if policy.should_retry(&status, next) {
        return Decision::Retry(next);
    }
    if status.is_drain() {
        Decision::Resolve(Err(CallError::RetryExhausted { attempts: next, status }))
    } else {
        Decision::Resolve(Err(CallError::Status(status)))
    }
}
