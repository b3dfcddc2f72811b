//! Client-side error types.
//!
//! [`ClientError`] covers everything that goes wrong below the level of an
//! HTTP status: connection failures, timeouts, unreadable upload files and
//! malformed bodies. Failures that reach the caller of an API method are
//! wrapped into an [`ApiFailure`] via [`ClientError::into_failure`];
//! precondition violations (invalid uploads, unencodable queries) are
//! returned as `Err(ClientError)` before any request is sent.

use std::time::Duration;

use http::StatusCode;
use socket_sdk_core::{ApiFailure, ErrorDescription, FailureKind};

/// Client-side error variants.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level error (connection refused, reset, TLS failure, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The call did not complete within its timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Reading a local file failed while streaming a request body.
    #[error("i/o error: {0}")]
    Io(String),

    /// An upload file is missing or unreadable.
    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    /// The request could not be constructed (bad path, header or query).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Request body or query encoding error.
    #[error("encode error: {0}")]
    Encode(String),

    /// Response body decoding error.
    #[error("decode error: {0}")]
    Decode(String),

    /// Unexpected protocol data.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// The failure classification used when this error ends an API call.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ClientError::Timeout(_) => FailureKind::Timeout,
            ClientError::Decode(_) | ClientError::Protocol(_) => FailureKind::Decode,
            ClientError::Transport(_) | ClientError::Io(_) => FailureKind::Transport,
            ClientError::InvalidUpload(_)
            | ClientError::InvalidRequest(_)
            | ClientError::Encode(_) => FailureKind::Client,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.failure_kind().is_retryable()
    }

    /// Wrap this error as the failure branch of an API result.
    ///
    /// `status` is the response status when one was received (for example a
    /// 2xx whose body failed to decode).
    pub fn into_failure(self, status: Option<StatusCode>) -> ApiFailure {
        let kind = self.failure_kind();
        ApiFailure::new(status, kind, ErrorDescription::new(self.to_string())).with_cause(self)
    }
}

/// Render an error and its `source()` chain on one line.
///
/// hyper's client errors carry the useful detail (e.g. "connection refused")
/// in their sources rather than their own message.
pub(crate) fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = inner.source();
    }
    out
}

/// Errors returned by [`ClientBuilder::build`](crate::ClientBuilder::build).
#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    /// No API key was supplied.
    #[error("API key must not be empty")]
    MissingApiKey,

    /// The base URL is not an absolute http(s) URL.
    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// A configured value cannot be sent as an HTTP header.
    #[error("invalid value for header {0}")]
    InvalidHeader(&'static str),

    /// The retry policy parameters are inconsistent.
    #[error("invalid retry policy: {0}")]
    InvalidRetryPolicy(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        assert_eq!(
            ClientError::Transport("refused".into()).failure_kind(),
            FailureKind::Transport
        );
        assert_eq!(
            ClientError::Timeout(Duration::from_secs(1)).failure_kind(),
            FailureKind::Timeout
        );
        assert_eq!(
            ClientError::Decode("bad json".into()).failure_kind(),
            FailureKind::Decode
        );
        assert_eq!(
            ClientError::InvalidUpload("missing".into()).failure_kind(),
            FailureKind::Client
        );
    }

    #[test]
    fn test_retryable() {
        assert!(ClientError::Transport("reset".into()).is_retryable());
        assert!(ClientError::Io("read failed".into()).is_retryable());
        assert!(ClientError::Timeout(Duration::from_millis(5)).is_retryable());
        assert!(!ClientError::Protocol("garbage".into()).is_retryable());
        assert!(!ClientError::Decode("bad json".into()).is_retryable());
        assert!(!ClientError::InvalidRequest("bad path".into()).is_retryable());
    }

    #[test]
    fn test_into_failure_keeps_cause() {
        let failure = ClientError::Timeout(Duration::from_millis(250)).into_failure(None);
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(failure.status, None);
        assert_eq!(failure.error.message, "request timed out after 250ms");
        assert!(std::error::Error::source(&failure).is_some());
    }

    #[test]
    fn test_error_chain() {
        #[derive(Debug, thiserror::Error)]
        #[error("client error (Connect)")]
        struct Outer(#[source] std::io::Error);

        let err = Outer(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert_eq!(
            error_chain(&err),
            "client error (Connect): connection refused"
        );
    }
}
