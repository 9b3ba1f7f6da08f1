//! One transport-level execution of a call, and the adapter contract a transport implements.
//!
//! A transport hands the controller a fresh attempt per [`Transport::new_attempt`]. The attempt
//! reports back through its [`AttemptListener`]: at most one response message, then exactly one
//! terminal status. Each listener reports into a channel of its own attempt. Once that attempt
//! is superseded, its channel is closed and late callbacks go nowhere.
//!
//! Implementing a transport:
//!
//! ```rust
//! use async_trait::async_trait;
//! use bytes::Bytes;
//! use redial::{AttemptCall, AttemptListener, Metadata, Status, Transport};
//!
//! /// Answers every request with its own payload.
//! struct Loopback;
//!
//! struct LoopbackCall {
//!     listener: Option<AttemptListener>,
//! }
//!
//! impl AttemptCall for LoopbackCall {
//!     fn send_message(&mut self, payload: Bytes) {
//!         if let Some(listener) = &self.listener {
//!             listener.on_message(payload);
//!         }
//!     }
//!     fn half_close(&mut self) {
//!         if let Some(listener) = self.listener.take() {
//!             listener.on_status(Status::ok());
//!         }
//!     }
//!     fn cancel(&mut self) {
//!         self.listener = None;
//!     }
//! }
//!
//! #[async_trait]
//! impl Transport for Loopback {
//!     type Call = LoopbackCall;
//!
//!     async fn new_attempt(
//!         &self,
//!         _metadata: &Metadata,
//!         listener: AttemptListener,
//!     ) -> Result<LoopbackCall, Status> {
//!         Ok(LoopbackCall { listener: Some(listener) })
//!     }
//! }
//! ```

use crate::metadata::Metadata;
use crate::status::Status;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Status reported for an attempt whose listener was dropped before it reported one.
pub const DROPPED_WITHOUT_STATUS: &str = "attempt dropped without terminal status";

/// Factory for attempts. Supplied by the RPC transport / load-balancer layer, which owns the
/// connection pool; the controller only ever asks it for a new attempt.
#[async_trait]
pub trait Transport: Send + Sync {
    type Call: AttemptCall + 'static;

    /// Begin one attempt on a fresh transport call with the given metadata.
    ///
    /// An `Err` is that attempt's terminal status; the listener may be dropped in that case.
    async fn new_attempt(
        &self,
        metadata: &Metadata,
        listener: AttemptListener,
    ) -> Result<Self::Call, Status>;
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    type Call = T::Call;

    async fn new_attempt(
        &self,
        metadata: &Metadata,
        listener: AttemptListener,
    ) -> Result<Self::Call, Status> {
        (**self).new_attempt(metadata, listener).await
    }
}

/// Capabilities of a started attempt. Unary only: one message, then half-close.
pub trait AttemptCall: Send {
    fn send_message(&mut self, payload: Bytes);

    /// Signal that no more request messages follow.
    fn half_close(&mut self);

    /// Best-effort abort. Only used when the caller abandons the logical call.
    fn cancel(&mut self);
}

/// Something an attempt reported to its listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AttemptEvent {
    Message(Bytes),
    Status(Status),
}

/// Callback handle for one attempt.
///
/// `on_status` consumes the listener, so an attempt cannot report two terminal statuses. A
/// listener dropped without reporting one ends its attempt with `INTERNAL` and
/// [`DROPPED_WITHOUT_STATUS`]. Once the attempt is superseded, or its call resolved or abandoned,
/// callbacks are no-ops.
#[derive(Debug)]
pub struct AttemptListener {
    attempt: usize,
    tx: mpsc::UnboundedSender<AttemptEvent>,
}

impl AttemptListener {
    /// Listener for attempt `attempt` and the receiving end of its channel.
    pub(crate) fn channel(attempt: usize) -> (Self, mpsc::UnboundedReceiver<AttemptEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { attempt, tx }, rx)
    }

    /// Index of the attempt this listener belongs to (0 for the initial attempt).
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// True once nobody is waiting on this attempt any more.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn on_message(&self, payload: Bytes) {
        self.send(AttemptEvent::Message(payload));
    }

    pub fn on_status(self, status: Status) {
        self.send(AttemptEvent::Status(status));
    }

    fn send(&self, event: AttemptEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!(attempt = self.attempt, "attempt no longer observed; signal dropped");
        }
    }
}

/// Controller-side record of a started attempt.
///
/// Dropped before its terminal status was observed, the attempt is cancelled.
pub(crate) struct Attempt<C: AttemptCall> {
    index: usize,
    call: C,
    events: mpsc::UnboundedReceiver<AttemptEvent>,
    response: Option<Bytes>,
    finished: bool,
}

impl<C: AttemptCall> Attempt<C> {
    pub(crate) fn new(
        index: usize,
        call: C,
        events: mpsc::UnboundedReceiver<AttemptEvent>,
    ) -> Self {
        Self { index, call, events, response: None, finished: false }
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    /// Next callback of this attempt. `None` once its listener is gone.
    pub(crate) async fn next_event(&mut self) -> Option<AttemptEvent> {
        self.events.recv().await
    }

    /// Hold a response pending the terminal status. Returns the payload back if one is already
    /// held: a unary attempt delivers at most one.
    pub(crate) fn hold_response(&mut self, payload: Bytes) -> Result<(), Bytes> {
        if self.response.is_some() {
            return Err(payload);
        }
        self.response = Some(payload);
        Ok(())
    }

    pub(crate) fn finish(&mut self) {
        self.finished = true;
    }

    pub(crate) fn take_response(&mut self) -> Option<Bytes> {
        self.response.take()
    }

    pub(crate) fn cancel(&mut self) {
        self.finished = true;
        self.call.cancel();
    }
}

impl<C: AttemptCall> Drop for Attempt<C> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(attempt = self.index, "cancelling unfinished attempt");
            self.call.cancel();
        }
    }
}
