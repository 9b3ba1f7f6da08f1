//! Terminal status of a transport attempt.
//!
//! Every attempt ends with exactly one [`Status`]: a gRPC [`Code`] plus an optional detail
//! message. The detail acts as a secondary discriminator: the connection-drain signature is
//! `UNAVAILABLE` *and* the literal message [`DRAIN_MARKER`].
//!
//! ```rust
//! use redial::{Code, Status};
//!
//! assert!(Status::drain().is_drain());
//! assert!(!Status::new(Code::Unavailable, "connection refused").is_drain());
//! assert!(!Status::code_only(Code::Unavailable).is_drain());
//!
//! let remote = tonic::Status::unavailable("GOAWAY received");
//! assert!(Status::from(remote).is_drain());
//! ```

use std::fmt;

pub use tonic::Code;

/// Detail text the transport reports when a connection is retired with GOAWAY before the
/// server's application logic responded.
pub const DRAIN_MARKER: &str = "GOAWAY received";

/// Terminal status of one attempt: code plus optional human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    code: Code,
    message: Option<String>,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self { code, message: Some(message.into()) }
    }

    /// Status with no detail string.
    pub fn code_only(code: Code) -> Self {
        Self { code, message: None }
    }

    pub fn ok() -> Self {
        Self::code_only(Code::Ok)
    }

    /// The exact connection-drain signature: `UNAVAILABLE` + [`DRAIN_MARKER`].
    pub fn drain() -> Self {
        Self::new(Code::Unavailable, DRAIN_MARKER)
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }

    /// True only for an exact match of code *and* detail. `UNAVAILABLE` with any other detail
    /// (or none) is not a drain.
    pub fn is_drain(&self) -> bool {
        self.code == Code::Unavailable && self.message.as_deref() == Some(DRAIN_MARKER)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{:?}: {}", self.code, message),
            None => write!(f, "{:?}", self.code),
        }
    }
}

/// An empty tonic message becomes "no detail".
impl From<tonic::Status> for Status {
    fn from(status: tonic::Status) -> Self {
        let message = status.message();
        Self {
            code: status.code(),
            message: (!message.is_empty()).then(|| message.to_owned()),
        }
    }
}

impl From<Status> for tonic::Status {
    fn from(status: Status) -> Self {
        tonic::Status::new(status.code, status.message.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_requires_exact_code_and_detail() {
        assert!(Status::drain().is_drain());
        assert!(Status::new(Code::Unavailable, "GOAWAY received").is_drain());
        assert!(!Status::new(Code::Unavailable, "goaway received").is_drain());
        assert!(!Status::new(Code::Unavailable, "GOAWAY received ").is_drain());
        assert!(!Status::code_only(Code::Unavailable).is_drain());
        assert!(!Status::new(Code::Internal, DRAIN_MARKER).is_drain());
    }

    #[test]
    fn tonic_statuses_convert_both_ways() {
        let drained = Status::from(tonic::Status::unavailable(DRAIN_MARKER));
        assert_eq!(drained, Status::drain());

        let bare = Status::from(tonic::Status::new(Code::DeadlineExceeded, ""));
        assert_eq!(bare, Status::code_only(Code::DeadlineExceeded));

        let back = tonic::Status::from(Status::drain());
        assert_eq!(back.code(), Code::Unavailable);
        assert_eq!(back.message(), DRAIN_MARKER);
    }

    #[test]
    fn display_includes_detail_when_present() {
        assert_eq!(Status::drain().to_string(), "Unavailable: GOAWAY received");
        assert_eq!(Status::code_only(Code::DeadlineExceeded).to_string(), "DeadlineExceeded");
    }

    #[test]
    fn ok_status_is_ok() {
        assert!(Status::ok().is_ok());
        assert!(!Status::drain().is_ok());
        assert_eq!(Status::ok().message(), None);
    }
}
