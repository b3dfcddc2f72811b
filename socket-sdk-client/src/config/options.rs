//! Per-call overrides of the client defaults.

use std::time::Duration;

use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HOST, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue};

use super::retry::RetryPolicy;

/// Headers the client always sets itself.
fn is_reserved(name: &HeaderName) -> bool {
    [AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HOST, USER_AGENT].contains(name)
}

/// Options for a single API call.
///
/// Anything left unset falls back to the value configured on the client.
///
/// # Example
///
/// ```ignore
/// use socket_sdk_client::{ApiRequest, CallOptions};
/// use std::time::Duration;
///
/// let options = CallOptions::new()
///     .timeout(Duration::from_secs(120))
///     .retries(3)
///     .header("x-request-id", "scan-42");
///
/// let result = client
///     .send_json::<serde_json::Value>(ApiRequest::get("orgs/acme/full-scans"), options)
///     .await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub(crate) timeout: Option<Duration>,
    pub(crate) retries: Option<u32>,
    pub(crate) retry_delay: Option<Duration>,
    pub(crate) headers: HeaderMap,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort each attempt of this call after `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Maximum number of retries for this call.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Base delay of the exponential backoff for this call.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Add a custom header for this call.
    ///
    /// `authorization`, `content-length`, `content-type`, `host` and
    /// `user-agent` are managed by the client and are ignored here.
    ///
    /// # Panics
    ///
    /// Panics if the header name or value is invalid.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        K::Error: std::fmt::Debug,
        V: TryInto<HeaderValue>,
        V::Error: std::fmt::Debug,
    {
        let name = name.try_into().expect("invalid header name");
        let value = value.try_into().expect("invalid header value");
        self.headers.insert(name, value);
        self
    }

    /// Like [`header`](Self::header), returning `None` for an invalid name or value.
    pub fn try_header<K, V>(mut self, name: K, value: V) -> Option<Self>
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        let name = name.try_into().ok()?;
        let value = value.try_into().ok()?;
        self.headers.insert(name, value);
        Some(self)
    }

    pub fn get_headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The retry policy for this call, starting from the client's.
    pub(crate) fn retry_policy(&self, base: &RetryPolicy) -> RetryPolicy {
        let mut policy = base.clone();
        if let Some(retries) = self.retries {
            policy.max_retries = retries;
        }
        if let Some(delay) = self.retry_delay {
            policy.base_delay = delay;
            if let Some(max) = policy.max_delay
                && max < delay
            {
                policy.max_delay = Some(delay);
            }
        }
        policy
    }

    /// Custom headers minus the reserved ones.
    pub(crate) fn custom_headers(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.headers
            .iter()
            .filter(|(name, _)| !is_reserved(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_options_default() {
        let options = CallOptions::new();
        assert!(options.timeout.is_none());
        assert!(options.retries.is_none());
        assert!(options.headers.is_empty());
    }

    #[test]
    fn test_call_options_header() {
        let options = CallOptions::new()
            .header("x-request-id", "abc-123")
            .timeout(Duration::from_secs(30));

        assert_eq!(options.headers.get("x-request-id").unwrap(), "abc-123");
        assert_eq!(options.get_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_call_options_try_header_invalid() {
        assert!(CallOptions::new().try_header("invalid\0name", "value").is_none());
        assert!(CallOptions::new().try_header("x-ok", "bad\nvalue").is_none());
    }

    #[test]
    fn test_reserved_headers_filtered() {
        let options = CallOptions::new()
            .header("authorization", "Bearer other")
            .header("user-agent", "spoofed")
            .header("x-trace", "1");

        let names: Vec<&str> = options.custom_headers().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["x-trace"]);
    }

    #[test]
    fn test_retry_policy_overrides() {
        let base = RetryPolicy::new()
            .max_retries(1)
            .max_delay(Duration::from_millis(200));

        let unchanged = CallOptions::new().retry_policy(&base);
        assert_eq!(unchanged, base);

        let policy = CallOptions::new()
            .retries(4)
            .retry_delay(Duration::from_millis(500))
            .retry_policy(&base);
        assert_eq!(policy.max_retries, 4);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Some(Duration::from_millis(500)));
        assert!(policy.validate().is_ok());
    }
}
