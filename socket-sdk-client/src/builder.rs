//! Client builder for the Socket API client.
//!
//! Provides a fluent API for configuring and building a [`SocketClient`].

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use http::{HeaderValue, Uri};

use crate::client::{ClientInner, SocketClient};
use crate::config::RetryPolicy;
use crate::error::ClientBuildError;
use crate::transport::{HyperTransport, HyperTransportBuilder};

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://api.socket.dev/v0/";

/// `User-Agent` sent with every request, before any appended product token.
pub const DEFAULT_USER_AGENT: &str = concat!("socket-sdk-rust/", env!("CARGO_PKG_VERSION"));

/// Builder for creating a [`SocketClient`].
///
/// # Example
///
/// ```ignore
/// use socket_sdk_client::{RetryPolicy, SocketClient};
/// use std::time::Duration;
///
/// let client = SocketClient::builder(std::env::var("SOCKET_API_KEY")?)
///     .timeout(Duration::from_secs(30))
///     .retry_policy(RetryPolicy::aggressive())
///     .user_agent("my-scanner/1.2.0")
///     .build()?;
/// ```
pub struct ClientBuilder {
    api_key: String,
    /// API root every request path is resolved against.
    base_url: String,
    /// Default timeout for each attempt of a call.
    timeout: Option<Duration>,
    retry: RetryPolicy,
    /// Product token appended to the default `User-Agent`.
    user_agent: Option<String>,
    /// Caller-supplied transport, used as is.
    transport: Option<HyperTransport>,
    /// Settings for the transport created on first use.
    transport_config: HyperTransportBuilder,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("user_agent", &self.user_agent)
            .field("transport", &self.transport.is_some())
            .field("transport_config", &self.transport_config)
            .finish()
    }
}

impl ClientBuilder {
    /// Create a builder for a client authenticating with `api_key`.
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: None,
            retry: RetryPolicy::default(),
            user_agent: None,
            transport: None,
            transport_config: HyperTransportBuilder::new(),
        }
    }

    /// Override the API root, e.g. for a staging deployment or a local mock.
    ///
    /// A trailing slash is added when missing so that request paths resolve
    /// below it.
    pub fn base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the default timeout for each attempt.
    ///
    /// Can be overridden per call with
    /// [`CallOptions::timeout`](crate::CallOptions::timeout). Without a
    /// timeout, calls wait as long as the connection stays open.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Number of retries after the first attempt for transient failures.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retry.max_retries = retries;
        self
    }

    /// Base delay of the exponential backoff between retries.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry.base_delay = delay;
        self
    }

    /// Replace the whole retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Append a product token to the `User-Agent` header.
    pub fn user_agent<S: Into<String>>(mut self, product: S) -> Self {
        self.user_agent = Some(product.into());
        self
    }

    /// Use an existing transport.
    ///
    /// The transport is cloned per client and never reconfigured; settings
    /// passed to [`transport_config`](Self::transport_config) are ignored.
    pub fn transport(mut self, transport: HyperTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Configure the transport the client creates on its first request.
    pub fn transport_config(mut self, config: HyperTransportBuilder) -> Self {
        self.transport_config = config;
        self
    }

    /// Build the client.
    ///
    /// No connection is opened here: the connection pool is created on the
    /// first request.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is empty, the base URL is not an
    /// absolute http(s) URL, the user agent is not a valid header value, or
    /// the retry policy is inconsistent.
    pub fn build(self) -> Result<SocketClient, ClientBuildError> {
        if self.api_key.trim().is_empty() {
            return Err(ClientBuildError::MissingApiKey);
        }

        let base_url = normalize_base_url(&self.base_url)?;
        let authorization = basic_auth(&self.api_key)?;

        let user_agent = match self.user_agent.as_deref().map(str::trim) {
            Some(product) if !product.is_empty() => format!("{DEFAULT_USER_AGENT} {product}"),
            _ => DEFAULT_USER_AGENT.to_owned(),
        };
        let user_agent_header = HeaderValue::from_str(&user_agent)
            .map_err(|_| ClientBuildError::InvalidHeader("user-agent"))?;

        self.retry
            .validate()
            .map_err(ClientBuildError::InvalidRetryPolicy)?;

        Ok(SocketClient::from_inner(ClientInner::new(
            base_url,
            authorization,
            user_agent,
            user_agent_header,
            self.timeout,
            self.retry,
            self.transport,
            self.transport_config,
        )))
    }
}

/// Validate an API root and make sure it ends with `/`.
fn normalize_base_url(url: &str) -> Result<String, ClientBuildError> {
    let invalid = |reason: &str| ClientBuildError::InvalidBaseUrl {
        url: url.to_owned(),
        reason: reason.to_owned(),
    };

    let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;
    match uri.scheme_str() {
        Some("http" | "https") => {}
        Some(_) => return Err(invalid("scheme must be http or https")),
        None => return Err(invalid("missing scheme")),
    }
    if uri.authority().is_none() {
        return Err(invalid("missing host"));
    }
    if uri.query().is_some() {
        return Err(invalid("must not contain a query string"));
    }

    let mut normalized = url.to_owned();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Ok(normalized)
}

/// `Basic` credentials with the API key as user name and an empty password.
fn basic_auth(api_key: &str) -> Result<HeaderValue, ClientBuildError> {
    let token = STANDARD.encode(format!("{api_key}:"));
    let mut value = HeaderValue::from_str(&format!("Basic {token}"))
        .map_err(|_| ClientBuildError::InvalidHeader("authorization"))?;
    value.set_sensitive(true);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = ClientBuilder::new("sktsec_test");
        assert_eq!(builder.base_url, DEFAULT_BASE_URL);
        assert!(builder.timeout.is_none());
        assert!(builder.transport.is_none());
        assert_eq!(builder.retry, RetryPolicy::default());
    }

    #[test]
    fn test_builder_build() {
        let client = ClientBuilder::new("sktsec_test").build().unwrap();
        assert_eq!(client.base_url(), DEFAULT_BASE_URL);
        assert_eq!(client.user_agent(), DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_builder_rejects_empty_key() {
        assert!(matches!(
            ClientBuilder::new("").build(),
            Err(ClientBuildError::MissingApiKey)
        ));
        assert!(matches!(
            ClientBuilder::new("   ").build(),
            Err(ClientBuildError::MissingApiKey)
        ));
    }

    #[test]
    fn test_builder_normalizes_url() {
        let client = ClientBuilder::new("k")
            .base_url("http://localhost:3000/v0")
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000/v0/");

        let client = ClientBuilder::new("k")
            .base_url("http://localhost:3000/v0/")
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000/v0/");
    }

    #[test]
    fn test_builder_rejects_bad_urls() {
        for url in ["localhost:3000", "ftp://example.com/", "/v0/", "http://x/?a=1", ""] {
            let err = ClientBuilder::new("k").base_url(url).build().unwrap_err();
            assert!(
                matches!(err, ClientBuildError::InvalidBaseUrl { .. }),
                "{url:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_builder_user_agent_appended() {
        let client = ClientBuilder::new("k")
            .user_agent("socket-cli/1.0.0")
            .build()
            .unwrap();
        assert_eq!(
            client.user_agent(),
            format!("{DEFAULT_USER_AGENT} socket-cli/1.0.0")
        );

        let err = ClientBuilder::new("k").user_agent("bad\nagent").build().unwrap_err();
        assert!(matches!(err, ClientBuildError::InvalidHeader("user-agent")));
    }

    #[test]
    fn test_basic_auth_header() {
        let value = basic_auth("sktsec_abc").unwrap();
        assert!(value.is_sensitive());
        assert_eq!(value, format!("Basic {}", STANDARD.encode("sktsec_abc:")).as_str());
    }

    #[test]
    fn test_builder_retry_settings() {
        let client = ClientBuilder::new("k")
            .retries(3)
            .retry_delay(Duration::from_millis(250))
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        assert_eq!(client.retry_policy().max_retries, 3);
        assert_eq!(client.retry_policy().base_delay, Duration::from_millis(250));
        assert_eq!(client.timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_builder_debug_redacts_key() {
        let debug = format!("{:?}", ClientBuilder::new("sktsec_secret"));
        assert!(!debug.contains("sktsec_secret"));
    }
}
