//! Scripted transports for driving the retry controller in tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use redial::telemetry::{CallEvent, TelemetrySink};
use redial::{AttemptCall, AttemptListener, Metadata, Status, Transport, RETRIES_KEY};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

/// What one attempt does once the request is half-closed.
#[derive(Debug, Clone)]
pub enum Script {
    /// Deliver the response, then OK.
    Respond(Bytes),
    /// Terminal status only.
    Fail(Status),
    /// Deliver a response, then a failing status (e.g. drain after the reply was written).
    MessageThenFail(Bytes, Status),
    /// OK without any response message.
    OkWithoutMessage,
    /// Two responses on a unary call, then OK.
    TwoMessages(Bytes, Bytes),
    /// `new_attempt` itself fails with this status.
    Refuse(Status),
    /// Respond from a spawned task after a delay.
    DelayedRespond(Duration, Bytes),
    /// From a spawned task after a delay: deliver a response, then drain.
    LateMessageThenDrain(Duration, Bytes),
    /// `new_attempt` fails with a drain but keeps the listener, answering OK with the payload
    /// after the delay.
    RefuseThenRespondLate(Duration, Bytes),
    /// Drop the listener without reporting anything.
    DropListener,
    /// Never answer; the listener is held until cancel.
    Hang,
}

pub fn drain() -> Script {
    Script::Fail(Status::drain())
}

pub fn respond(body: &'static str) -> Script {
    Script::Respond(Bytes::from_static(body.as_bytes()))
}

/// Everything observed about one attempt.
#[derive(Debug, Clone, Default)]
pub struct AttemptRecord {
    pub index: usize,
    pub metadata: Metadata,
    pub payloads: Vec<Bytes>,
    pub half_closed: bool,
    pub cancelled: bool,
}

#[derive(Debug, Default)]
struct Shared {
    scripts: VecDeque<Script>,
    records: Vec<AttemptRecord>,
}

/// Transport that plays one [`Script`] per attempt, in order, and records each attempt.
///
/// Running out of scripts fails the attempt with `INTERNAL`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    shared: Arc<Mutex<Shared>>,
}

impl ScriptedTransport {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        let shared = Shared { scripts: scripts.into_iter().collect(), records: Vec::new() };
        Self { shared: Arc::new(Mutex::new(shared)) }
    }

    pub fn records(&self) -> Vec<AttemptRecord> {
        self.shared.lock().unwrap().records.clone()
    }

    pub fn attempts(&self) -> usize {
        self.shared.lock().unwrap().records.len()
    }

    pub fn cancels(&self) -> usize {
        self.shared.lock().unwrap().records.iter().filter(|r| r.cancelled).count()
    }

    pub fn remaining_scripts(&self) -> usize {
        self.shared.lock().unwrap().scripts.len()
    }
}

pub struct ScriptedCall {
    slot: usize,
    script: Script,
    listener: Option<AttemptListener>,
    shared: Arc<Mutex<Shared>>,
}

impl AttemptCall for ScriptedCall {
    fn send_message(&mut self, payload: Bytes) {
        self.shared.lock().unwrap().records[self.slot].payloads.push(payload);
    }

    fn half_close(&mut self) {
        self.shared.lock().unwrap().records[self.slot].half_closed = true;
        let Some(listener) = self.listener.take() else {
            return;
        };
        match self.script.clone() {
            Script::Respond(body) => {
                listener.on_message(body);
                listener.on_status(Status::ok());
            }
            Script::Fail(status) => listener.on_status(status),
            Script::MessageThenFail(body, status) => {
                listener.on_message(body);
                listener.on_status(status);
            }
            Script::OkWithoutMessage => listener.on_status(Status::ok()),
            Script::TwoMessages(first, second) => {
                listener.on_message(first);
                listener.on_message(second);
                listener.on_status(Status::ok());
            }
            Script::DelayedRespond(delay, body) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    listener.on_message(body);
                    listener.on_status(Status::ok());
                });
            }
            Script::LateMessageThenDrain(delay, body) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    listener.on_message(body);
                    listener.on_status(Status::drain());
                });
            }
            Script::DropListener => drop(listener),
            Script::Hang => self.listener = Some(listener),
            Script::Refuse(_) | Script::RefuseThenRespondLate(..) => {
                unreachable!("refused attempts never start")
            }
        }
    }

    fn cancel(&mut self) {
        self.shared.lock().unwrap().records[self.slot].cancelled = true;
        self.listener = None;
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    type Call = ScriptedCall;

    async fn new_attempt(
        &self,
        metadata: &Metadata,
        listener: AttemptListener,
    ) -> Result<ScriptedCall, Status> {
        let mut shared = self.shared.lock().unwrap();
        let slot = shared.records.len();
        shared.records.push(AttemptRecord {
            index: listener.attempt(),
            metadata: metadata.clone(),
            ..AttemptRecord::default()
        });
        let script = shared
            .scripts
            .pop_front()
            .unwrap_or_else(|| Script::Fail(Status::new(redial::Code::Internal, "no script")));
        drop(shared);

        match script {
            Script::Refuse(status) => return Err(status),
            Script::RefuseThenRespondLate(delay, body) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    listener.on_message(body);
                    listener.on_status(Status::ok());
                });
                return Err(Status::drain());
            }
            _ => {}
        }
        Ok(ScriptedCall { slot, script, listener: Some(listener), shared: self.shared.clone() })
    }
}

/// Transport that drains every first attempt after `delay` and echoes the request on retries.
///
/// Decisions depend only on the attempt's own metadata, so any number of calls may share it.
#[derive(Debug, Clone)]
pub struct DrainOnceEcho {
    delay: Duration,
    started: Arc<Mutex<Vec<Option<usize>>>>,
}

impl DrainOnceEcho {
    pub fn new(delay: Duration) -> Self {
        Self { delay, started: Arc::new(Mutex::new(Vec::new())) }
    }

    /// The `retries` value of every attempt started, in start order.
    pub fn started(&self) -> Vec<Option<usize>> {
        self.started.lock().unwrap().clone()
    }
}

pub struct EchoCall {
    retried: bool,
    delay: Duration,
    payload: Option<Bytes>,
    listener: Option<AttemptListener>,
}

impl AttemptCall for EchoCall {
    fn send_message(&mut self, payload: Bytes) {
        self.payload = Some(payload);
    }

    fn half_close(&mut self) {
        let (Some(listener), Some(payload)) = (self.listener.take(), self.payload.take()) else {
            return;
        };
        let retried = self.retried;
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if retried {
                listener.on_message(payload);
                listener.on_status(Status::ok());
            } else {
                listener.on_status(Status::drain());
            }
        });
    }

    fn cancel(&mut self) {
        self.listener = None;
    }
}

#[async_trait]
impl Transport for DrainOnceEcho {
    type Call = EchoCall;

    async fn new_attempt(
        &self,
        metadata: &Metadata,
        listener: AttemptListener,
    ) -> Result<EchoCall, Status> {
        let retries = metadata.retries();
        self.started.lock().unwrap().push(retries);
        Ok(EchoCall {
            retried: metadata.contains_key(RETRIES_KEY),
            delay: self.delay,
            payload: None,
            listener: Some(listener),
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("sink unavailable")]
pub struct SinkDown;

/// Telemetry sink that is never ready. Counts how often it was polled.
#[derive(Debug, Clone, Default)]
pub struct FailingSink {
    polls: Arc<AtomicUsize>,
}

impl FailingSink {
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

impl tower::Service<CallEvent> for FailingSink {
    type Response = ();
    type Error = SinkDown;
    type Future = futures::future::Ready<Result<(), SinkDown>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Err(SinkDown))
    }

    fn call(&mut self, _event: CallEvent) -> Self::Future {
        futures::future::ready(Err(SinkDown))
    }
}

impl TelemetrySink for FailingSink {
    type SinkError = SinkDown;
}

/// Route controller logs to the test harness output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
