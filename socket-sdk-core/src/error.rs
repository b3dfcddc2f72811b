//! Error descriptions extracted from failed API responses.
//!
//! The Socket API reports failures with a JSON body of the form:
//!
//! ```json
//! {
//!   "error": {
//!     "message": "Organization not found",
//!     "details": { "org": "acme" }
//!   }
//! }
//! ```
//!
//! [`ErrorDescription::from_response_body`] pulls `message` and `details` out of
//! that shape and falls back to a generic status-based message for anything
//! else. It never panics: it runs on the failure path.

use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Description of a failed API call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorDescription {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

impl ErrorDescription {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Map<String, Value>) -> Self {
        self.details = Some(details);
        self
    }

    /// Generic description used when a response body carries no usable error.
    pub fn generic(status: StatusCode) -> Self {
        let message = match status.canonical_reason() {
            Some(reason) => format!(
                "Socket API request failed ({} {})",
                status.as_u16(),
                reason
            ),
            None => format!("Socket API request failed ({})", status.as_u16()),
        };
        Self::new(message)
    }

    /// Extract a description from a non-2xx response body.
    ///
    /// Accepts `{"error": {"message": ..., "details": {...}}}` and the
    /// shorthand `{"error": "message"}`. Any other body, including invalid
    /// JSON, yields [`ErrorDescription::generic`].
    pub fn from_response_body(status: StatusCode, body: &[u8]) -> Self {
        let Ok(parsed) = serde_json::from_slice::<ErrorEnvelope>(body) else {
            return Self::generic(status);
        };

        match parsed.error {
            Some(ErrorField::Object(obj)) => match obj.message {
                Some(message) if !message.is_empty() => Self {
                    message,
                    details: obj.details.and_then(into_object),
                },
                _ => Self::generic(status),
            },
            Some(ErrorField::Message(message)) if !message.is_empty() => Self::new(message),
            _ => Self::generic(status),
        }
    }
}

impl fmt::Display for ErrorDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<ErrorField>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Object(ErrorObject),
    Message(String),
}

#[derive(Deserialize)]
struct ErrorObject {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<Value>,
}

fn into_object(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}
