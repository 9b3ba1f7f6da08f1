//! Tower-native drain retry layer.
//!
//! [`RetryLayer`] wraps a [`Transport`] into a `tower::Service<UnaryRequest>` whose response is
//! the Outcome of one logical call.
//!
//! ```rust
//! # use redial::{AttemptCall, AttemptListener, Metadata, Status, Transport};
//! # use async_trait::async_trait;
//! # use bytes::Bytes;
//! # struct Echo;
//! # struct EchoCall(Option<AttemptListener>);
//! # impl AttemptCall for EchoCall {
//! #     fn send_message(&mut self, p: Bytes) { if let Some(l) = &self.0 { l.on_message(p) } }
//! #     fn half_close(&mut self) { if let Some(l) = self.0.take() { l.on_status(Status::ok()) } }
//! #     fn cancel(&mut self) {}
//! # }
//! # #[async_trait]
//! # impl Transport for Echo {
//! #     type Call = EchoCall;
//! #     async fn new_attempt(&self, _: &Metadata, l: AttemptListener) -> Result<EchoCall, Status> {
//! #         Ok(EchoCall(Some(l)))
//! #     }
//! # }
//! use redial::{RetryLayer, RetryPolicy, UnaryRequest};
//! use tower::{Service, ServiceBuilder, ServiceExt};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut svc = ServiceBuilder::new().layer(RetryLayer::new(RetryPolicy::new(2))).service(Echo);
//! let response = svc
//!     .ready()
//!     .await
//!     .unwrap()
//!     .call(UnaryRequest::new(Bytes::from_static(b"ping")))
//!     .await
//!     .unwrap();
//! assert_eq!(response, Bytes::from_static(b"ping"));
//! # }
//! ```

use crate::attempt::Transport;
use crate::controller::RetryController;
use crate::error::CallError;
use crate::metadata::Metadata;
use crate::policy::RetryPolicy;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::telemetry::{NullSink, TelemetrySink};
use bytes::Bytes;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// Request for one logical unary call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnaryRequest {
    pub payload: Bytes,
    pub metadata: Metadata,
}

impl UnaryRequest {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self { payload: payload.into(), metadata: Metadata::new() }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Layer producing [`RetryService`]s.
#[derive(Debug, Clone)]
pub struct RetryLayer<S = NullSink> {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    sink: S,
}

impl RetryLayer<NullSink> {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, sleeper: Arc::new(TokioSleeper), sink: NullSink }
    }
}

impl<S> RetryLayer<S> {
    /// Attach a telemetry sink to every service this layer produces.
    pub fn with_sink<S2>(self, sink: S2) -> RetryLayer<S2> {
        RetryLayer { policy: self.policy, sleeper: self.sleeper, sink }
    }

    pub fn with_sleeper<Z>(mut self, sleeper: Z) -> Self
    where
        Z: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl<T, S> Layer<T> for RetryLayer<S>
where
    S: Clone,
{
    type Service = RetryService<T, S>;

    fn layer(&self, transport: T) -> Self::Service {
        let controller =
            RetryController::from_parts(transport, self.sleeper.clone(), self.sink.clone());
        RetryService { controller: Arc::new(controller), policy: self.policy }
    }
}

/// Service produced by [`RetryLayer`]. Always ready; each call is an independent logical call.
#[derive(Debug)]
pub struct RetryService<T, S = NullSink> {
    controller: Arc<RetryController<T, S>>,
    policy: RetryPolicy,
}

impl<T, S> Clone for RetryService<T, S> {
    fn clone(&self) -> Self {
        Self { controller: self.controller.clone(), policy: self.policy }
    }
}

impl<T, S> RetryService<T, S> {
    pub fn controller(&self) -> &RetryController<T, S> {
        &self.controller
    }
}

impl<T, S> Service<UnaryRequest> for RetryService<T, S>
where
    T: Transport + 'static,
    S: TelemetrySink + Sync,
    S::Future: Send + 'static,
{
    type Response = Bytes;
    type Error = CallError;
    type Future = BoxFuture<'static, Result<Bytes, CallError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: UnaryRequest) -> Self::Future {
        let controller = self.controller.clone();
        let policy = self.policy;
        Box::pin(async move { controller.execute(req.payload, req.metadata, &policy).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unary_request_builder_keeps_metadata() {
        let mut md = Metadata::new();
        md.insert("x-seq", "7");
        let req = UnaryRequest::new(Bytes::from_static(b"{}")).with_metadata(md.clone());
        assert_eq!(req.metadata, md);
        assert_eq!(req.payload, Bytes::from_static(b"{}"));
    }

    #[test]
    fn layer_exposes_policy() {
        let layer = RetryLayer::new(RetryPolicy::new(4));
        assert_eq!(layer.policy().max_retries(), 4);
    }
}
