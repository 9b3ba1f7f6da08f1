#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # redial
//!
//! Drain-aware retry for unary RPC calls.
//!
//! When a load-balanced server retires a connection (HTTP/2 GOAWAY) while a request is in flight,
//! the call fails with `UNAVAILABLE: GOAWAY received` even though the application never answered.
//! [`RetryController`] sits between the caller and the transport and transparently re-issues such
//! calls on a fresh attempt, while guaranteeing the caller sees exactly one Outcome.
//!
//! ## Features
//!
//! - **Exact drain matching**: only `UNAVAILABLE` with the `GOAWAY received` detail is retried
//! - **Bounded retries** with the attempt number tagged into metadata as `retries`
//! - **Byte-identical resends** of the captured request
//! - **Stale-callback isolation**: a superseded attempt can never affect the Outcome
//! - **Tower integration** via [`RetryLayer`]
//! - **Telemetry** through pluggable sinks
//!
//! ## Quick Start
//!
//! ```rust
//! use redial::{Metadata, RetryController, RetryPolicy};
//! # use redial::{AttemptCall, AttemptListener, Status, Transport};
//! # use async_trait::async_trait;
//! use bytes::Bytes;
//! # struct MyTransport;
//! # struct Call(Option<AttemptListener>);
//! # impl AttemptCall for Call {
//! #     fn send_message(&mut self, p: Bytes) { if let Some(l) = &self.0 { l.on_message(p) } }
//! #     fn half_close(&mut self) { if let Some(l) = self.0.take() { l.on_status(Status::ok()) } }
//! #     fn cancel(&mut self) {}
//! # }
//! # #[async_trait]
//! # impl Transport for MyTransport {
//! #     type Call = Call;
//! #     async fn new_attempt(&self, _: &Metadata, l: AttemptListener) -> Result<Call, Status> {
//! #         Ok(Call(Some(l)))
//! #     }
//! # }
//!
//! #[tokio::main]
//! async fn main() {
//!     let controller = RetryController::new(MyTransport);
//!     let outcome = controller
//!         .execute(Bytes::from_static(b"{\"seq\":0}"), Metadata::new(), &RetryPolicy::new(3))
//!         .await;
//!     assert!(outcome.is_ok());
//! }
//! ```

pub mod attempt;
pub mod backoff;
pub mod controller;
pub mod error;
pub mod metadata;
pub mod policy;
pub mod prelude;
pub mod service;
pub mod sleeper;
pub mod status;
pub mod telemetry;

// Re-exports
pub use attempt::{AttemptCall, AttemptListener, Transport};
pub use backoff::Backoff;
pub use controller::{CallState, Outcome, RetryController};
pub use error::{BuildError, CallError};
pub use metadata::{Metadata, RETRIES_KEY};
pub use policy::{RetryPolicy, RetryPolicyBuilder, RetrySettings};
pub use service::{RetryLayer, RetryService, UnaryRequest};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use status::{Code, Status, DRAIN_MARKER};
