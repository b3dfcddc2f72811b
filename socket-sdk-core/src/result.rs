//! The discriminated result type returned by Socket API calls.
//!
//! Every call that can fail for environmental reasons (network errors,
//! non-2xx responses, malformed bodies) returns an [`ApiResult`] instead of
//! an `Err` from an outer `Result`. Precondition violations such as an
//! unreadable upload file are reported separately, before any request is
//! sent.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use http::StatusCode;

use crate::error::ErrorDescription;

/// Shared, type-erased underlying cause of a failure.
pub type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// Classification of a failed API call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The request never produced a response (connection refused, reset, ...).
    Transport,
    /// The call exceeded its timeout and was aborted.
    Timeout,
    /// The server answered with a 5xx status.
    Server,
    /// The server answered with a 4xx status other than 401/403.
    Client,
    /// The server rejected the credentials (401 or 403).
    Auth,
    /// A 2xx response body could not be decoded.
    Decode,
}

impl FailureKind {
    /// Classify a non-success HTTP status.
    ///
    /// Returns `None` for 2xx statuses. Informational and redirect statuses
    /// are treated as client errors since they are never followed.
    pub fn for_status(status: StatusCode) -> Option<Self> {
        if status.is_success() {
            return None;
        }
        Some(match status.as_u16() {
            401 | 403 => FailureKind::Auth,
            500..=599 => FailureKind::Server,
            _ => FailureKind::Client,
        })
    }

    /// Returns whether a failure of this kind is transient and may succeed
    /// when the request is attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::Transport | FailureKind::Timeout | FailureKind::Server
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Transport => "transport",
            FailureKind::Timeout => "timeout",
            FailureKind::Server => "server",
            FailureKind::Client => "client",
            FailureKind::Auth => "auth",
            FailureKind::Decode => "decode",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The failure branch of an [`ApiResult`].
#[derive(Clone)]
pub struct ApiFailure {
    /// HTTP status of the response, or `None` when no response was received.
    pub status: Option<StatusCode>,
    /// What went wrong.
    pub kind: FailureKind,
    /// Human-readable description, extracted from the response body when possible.
    pub error: ErrorDescription,
    /// The underlying error, if any.
    pub cause: Option<Cause>,
}

impl ApiFailure {
    pub fn new(status: Option<StatusCode>, kind: FailureKind, error: ErrorDescription) -> Self {
        Self {
            status,
            kind,
            error,
            cause: None,
        }
    }

    /// Build a failure for a non-2xx response from its status and body.
    pub fn from_response(status: StatusCode, body: &[u8]) -> Self {
        let kind = FailureKind::for_status(status).unwrap_or(FailureKind::Decode);
        Self::new(
            Some(status),
            kind,
            ErrorDescription::from_response_body(status, body),
        )
    }

    /// Attach the underlying error.
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Debug for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiFailure")
            .field("status", &self.status)
            .field("kind", &self.kind)
            .field("error", &self.error)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .finish()
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} error ({}): {}", self.kind, status.as_u16(), self.error),
            None => write!(f, "{} error: {}", self.kind, self.error),
        }
    }
}

impl StdError for ApiFailure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn StdError + 'static))
    }
}

/// Outcome of a Socket API call.
///
/// Exactly one of `data` and `error` exists, selected by the variant.
///
/// # Example
///
/// ```
/// use http::StatusCode;
/// use socket_sdk_core::ApiResult;
///
/// let result = ApiResult::ok(StatusCode::OK, 42);
/// match result {
///     ApiResult::Ok { status, data } => assert_eq!((status.as_u16(), data), (200, 42)),
///     ApiResult::Err(failure) => panic!("unexpected failure: {failure}"),
/// }
/// ```
#[must_use]
#[derive(Debug, Clone)]
pub enum ApiResult<T> {
    /// The call succeeded with a 2xx status.
    Ok { status: StatusCode, data: T },
    /// The call failed.
    Err(ApiFailure),
}

impl<T> ApiResult<T> {
    pub fn ok(status: StatusCode, data: T) -> Self {
        ApiResult::Ok { status, data }
    }

    pub fn err(failure: ApiFailure) -> Self {
        ApiResult::Err(failure)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ApiResult::Ok { .. })
    }

    /// HTTP status of the call, if a response was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiResult::Ok { status, .. } => Some(*status),
            ApiResult::Err(failure) => failure.status,
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            ApiResult::Ok { data, .. } => Some(data),
            ApiResult::Err(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorDescription> {
        match self {
            ApiResult::Ok { .. } => None,
            ApiResult::Err(failure) => Some(&failure.error),
        }
    }

    pub fn failure(&self) -> Option<&ApiFailure> {
        match self {
            ApiResult::Ok { .. } => None,
            ApiResult::Err(failure) => Some(failure),
        }
    }

    /// Transform the success payload, preserving the status.
    pub fn map<U, F>(self, f: F) -> ApiResult<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            ApiResult::Ok { status, data } => ApiResult::Ok {
                status,
                data: f(data),
            },
            ApiResult::Err(failure) => ApiResult::Err(failure),
        }
    }

    /// Convert into a standard `Result`, for use with `?`.
    pub fn into_result(self) -> Result<T, ApiFailure> {
        match self {
            ApiResult::Ok { data, .. } => Ok(data),
            ApiResult::Err(failure) => Err(failure),
        }
    }
}

impl<T> From<ApiFailure> for ApiResult<T> {
    fn from(failure: ApiFailure) -> Self {
        ApiResult::Err(failure)
    }
}
