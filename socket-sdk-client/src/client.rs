//! Socket API client implementation.
//!
//! This module provides the main [`SocketClient`] type. Every call goes
//! through the same dispatcher: resolve the URL against the base URL, attach
//! the client headers, send under the per-attempt timeout, classify the
//! response and retry transient failures according to the call's
//! [`RetryPolicy`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HOST, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use serde::de::DeserializeOwned;
use serde_json::Value;
use socket_sdk_core::{ApiFailure, ApiResult};
use tokio::sync::OnceCell;

use crate::ClientError;
use crate::builder::ClientBuilder;
use crate::config::{CallOptions, RetryController, RetryPolicy};
use crate::error::error_chain;
use crate::request::{ApiRequest, RequestBody};
use crate::response::{NdjsonResponse, NdjsonStream, body_to_stream};
use crate::transport::{HyperTransport, HyperTransportBuilder, TransportBody};

const ACCEPT_JSON: &str = "application/json";
const ACCEPT_NDJSON: &str = "application/x-ndjson";
const ACCEPT_ANY: &str = "*/*";

/// Client for the Socket security API.
///
/// Cloning is cheap: clones share configuration and the connection pool.
///
/// Each `send_*` method returns `Err(ClientError)` only when the request
/// itself is unusable, for example a path that is not a valid URL. That
/// check happens before anything is sent. Transport failures, timeouts, error
/// statuses and undecodable bodies arrive as [`ApiResult::Err`].
///
/// # Example
///
/// ```ignore
/// use socket_sdk_client::{ApiRequest, ApiResult, CallOptions, SocketClient};
///
/// let client = SocketClient::builder(api_key).retries(2).build()?;
///
/// match client
///     .send_json::<serde_json::Value>(ApiRequest::get("quota"), CallOptions::new())
///     .await?
/// {
///     ApiResult::Ok { data, .. } => println!("quota: {}", data["quota"]),
///     ApiResult::Err(failure) => eprintln!("{}: {}", failure.kind, failure.error.message),
/// }
/// ```
#[derive(Clone)]
pub struct SocketClient {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    /// Always ends with `/`.
    base_url: String,
    authorization: HeaderValue,
    user_agent: String,
    user_agent_header: HeaderValue,
    timeout: Option<Duration>,
    retry: RetryPolicy,
    /// Created on first use unless supplied to the builder.
    transport: OnceCell<HyperTransport>,
    transport_config: HyperTransportBuilder,
}

impl ClientInner {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        base_url: String,
        authorization: HeaderValue,
        user_agent: String,
        user_agent_header: HeaderValue,
        timeout: Option<Duration>,
        retry: RetryPolicy,
        transport: Option<HyperTransport>,
        transport_config: HyperTransportBuilder,
    ) -> Self {
        Self {
            base_url,
            authorization,
            user_agent,
            user_agent_header,
            timeout,
            retry,
            transport: OnceCell::new_with(transport),
            transport_config,
        }
    }

    /// Resolve a request path (and query) against the base URL.
    fn url_for(&self, path: &str, query: Option<&str>) -> Result<Uri, ClientError> {
        let path = path.trim_start_matches('/');
        let mut url = String::with_capacity(
            self.base_url.len() + path.len() + query.map_or(0, |q| q.len() + 1),
        );
        url.push_str(&self.base_url);
        url.push_str(path);
        if let Some(query) = query {
            url.push('?');
            url.push_str(query);
        }

        url.parse()
            .map_err(|e| ClientError::InvalidRequest(format!("invalid URL {url:?}: {e}")))
    }
}

impl std::fmt::Debug for SocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketClient")
            .field("base_url", &self.inner.base_url)
            .field("user_agent", &self.inner.user_agent)
            .field("timeout", &self.inner.timeout)
            .field("retry", &self.inner.retry)
            .field("transport_initialized", &self.inner.transport.initialized())
            .finish_non_exhaustive()
    }
}

/// A request with client defaults and call options applied.
#[derive(Debug)]
struct RequestConfig {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: RequestBody,
    timeout: Option<Duration>,
    retry: RetryPolicy,
}

impl RequestConfig {
    /// A fresh HTTP request for one attempt.
    fn to_http_request(&self) -> http::Request<TransportBody> {
        let mut request = http::Request::new(self.body.to_transport_body());
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();
        *request.headers_mut() = self.headers.clone();
        request
    }
}

impl SocketClient {
    /// Create a [`ClientBuilder`] for the given API key.
    pub fn builder<S: Into<String>>(api_key: S) -> ClientBuilder {
        ClientBuilder::new(api_key)
    }

    /// Create a client with default settings.
    pub fn new<S: Into<String>>(api_key: S) -> Result<Self, crate::ClientBuildError> {
        ClientBuilder::new(api_key).build()
    }

    pub(crate) fn from_inner(inner: ClientInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// The API root, always ending with `/`.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn user_agent(&self) -> &str {
        &self.inner.user_agent
    }

    /// Default per-attempt timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry
    }

    /// Whether the connection pool exists yet.
    pub fn is_transport_initialized(&self) -> bool {
        self.inner.transport.initialized()
    }

    /// Send a request and decode the JSON response body.
    ///
    /// An empty 2xx body decodes as JSON `null`, so `Option<T>` and
    /// `serde_json::Value` accept it.
    pub async fn send_json<T>(
        &self,
        request: ApiRequest,
        options: CallOptions,
    ) -> Result<ApiResult<T>, ClientError>
    where
        T: DeserializeOwned,
    {
        self.execute(request, options, ACCEPT_JSON, |status, response| async move {
            let body = collect_body(response.into_body())
                .await
                .map_err(|e| e.into_failure(Some(status)))?;
            decode_json(status, &body)
        })
        .await
    }

    /// Send a request and stream the NDJSON response body.
    ///
    /// The timeout covers the response head. After that it bounds each wait
    /// for the next chunk: a body that stalls for longer ends the stream with
    /// [`ClientError::Timeout`].
    pub async fn send_ndjson<T>(
        &self,
        request: ApiRequest,
        options: CallOptions,
    ) -> Result<ApiResult<NdjsonResponse<T>>, ClientError>
    where
        T: DeserializeOwned,
    {
        let idle_timeout = options.timeout.or(self.inner.timeout);
        self.execute(request, options, ACCEPT_NDJSON, move |_, response| async move {
            Ok(NdjsonStream::new(body_to_stream(response.into_body()))
                .with_idle_timeout(idle_timeout))
        })
        .await
    }

    /// Send a request and return the response body as text.
    pub async fn send_text(
        &self,
        request: ApiRequest,
        options: CallOptions,
    ) -> Result<ApiResult<String>, ClientError> {
        self.execute(request, options, ACCEPT_ANY, |status, response| async move {
            let body = collect_body(response.into_body())
                .await
                .map_err(|e| e.into_failure(Some(status)))?;
            String::from_utf8(body.to_vec()).map_err(|e| {
                ClientError::Decode(format!("response body is not UTF-8: {e}"))
                    .into_failure(Some(status))
            })
        })
        .await
    }

    /// Send a request and return the successful response unread.
    ///
    /// Error statuses are still turned into [`ApiResult::Err`]. The timeout
    /// covers the response head only.
    pub async fn send_raw(
        &self,
        request: ApiRequest,
        options: CallOptions,
    ) -> Result<ApiResult<http::Response<Incoming>>, ClientError> {
        self.execute(request, options, ACCEPT_ANY, |_, response| async move {
            Ok(response)
        })
        .await
    }

    async fn transport(&self) -> Result<&HyperTransport, ClientError> {
        self.inner
            .transport
            .get_or_try_init(|| async { self.inner.transport_config.clone().build() })
            .await
    }

    fn prepare(
        &self,
        request: ApiRequest,
        options: &CallOptions,
        accept: &'static str,
    ) -> Result<RequestConfig, ClientError> {
        let (method, path, query, request_headers, body) = request.into_parts();
        let uri = self.inner.url_for(&path, query.as_deref())?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        for (name, value) in &request_headers {
            headers.insert(name.clone(), value.clone());
        }
        for (name, value) in options.custom_headers() {
            headers.insert(name.clone(), value.clone());
        }

        // Client-managed headers win over anything set above.
        headers.remove(HOST);
        headers.insert(AUTHORIZATION, self.inner.authorization.clone());
        headers.insert(USER_AGENT, self.inner.user_agent_header.clone());
        match body.content_type() {
            Some(content_type) => {
                let value = HeaderValue::from_str(&content_type).map_err(|_| {
                    ClientError::InvalidRequest(format!("invalid content type {content_type:?}"))
                })?;
                headers.insert(CONTENT_TYPE, value);
                headers.insert(CONTENT_LENGTH, HeaderValue::from(body.content_length()));
            }
            None => {
                headers.remove(CONTENT_TYPE);
                headers.remove(CONTENT_LENGTH);
            }
        }

        let retry = options.retry_policy(&self.inner.retry);
        retry
            .validate()
            .map_err(|msg| ClientError::InvalidRequest(format!("invalid retry policy: {msg}")))?;

        Ok(RequestConfig {
            method,
            uri,
            headers,
            body,
            timeout: options.timeout.or(self.inner.timeout),
            retry,
        })
    }

    async fn execute<R, F, Fut>(
        &self,
        request: ApiRequest,
        options: CallOptions,
        accept: &'static str,
        read: F,
    ) -> Result<ApiResult<R>, ClientError>
    where
        F: Fn(StatusCode, http::Response<Incoming>) -> Fut,
        Fut: Future<Output = Result<R, ApiFailure>>,
    {
        let call = self.prepare(request, &options, accept)?;

        #[cfg(feature = "tracing")]
        let span = tracing::info_span!(
            "api.call",
            http.method = %call.method,
            url.path = %call.uri.path(),
            otel.kind = "client",
        );

        let dispatch = self.dispatch(&call, read);

        #[cfg(feature = "tracing")]
        let dispatch = tracing::Instrument::instrument(dispatch, span);

        Ok(dispatch.await)
    }

    async fn dispatch<R, F, Fut>(&self, call: &RequestConfig, read: F) -> ApiResult<R>
    where
        F: Fn(StatusCode, http::Response<Incoming>) -> Fut,
        Fut: Future<Output = Result<R, ApiFailure>>,
    {
        // Not retried: building the pool again would fail the same way.
        let transport = match self.transport().await {
            Ok(transport) => transport,
            Err(e) => return ApiResult::err(e.into_failure(None)),
        };

        let outcome = RetryController::new(call.retry.clone())
            .run(|_| attempt(transport, call, &read))
            .await;

        #[cfg(feature = "tracing")]
        {
            if let Err(failure) = &outcome.result {
                tracing::debug!(attempts = outcome.attempts, error = %failure, "api call failed");
            }
        }

        match outcome.result {
            Ok((status, data)) => ApiResult::ok(status, data),
            Err(failure) => ApiResult::err(failure),
        }
    }
}

/// One attempt: send, check the status, read the body under the timeout.
async fn attempt<R, F, Fut>(
    transport: &HyperTransport,
    call: &RequestConfig,
    read: &F,
) -> Result<(StatusCode, R), ApiFailure>
where
    F: Fn(StatusCode, http::Response<Incoming>) -> Fut,
    Fut: Future<Output = Result<R, ApiFailure>>,
{
    let exchange = async {
        let response = transport
            .request(call.to_http_request())
            .await
            .map_err(|e| e.into_failure(None))?;

        let status = response.status();
        if !status.is_success() {
            // An unreadable error body still yields the generic description.
            let body = collect_body(response.into_body()).await.unwrap_or_default();
            return Err(ApiFailure::from_response(status, &body));
        }

        read(status, response).await.map(|data| (status, data))
    };

    match call.timeout {
        Some(limit) => tokio::time::timeout(limit, exchange)
            .await
            .unwrap_or_else(|_| Err(ClientError::Timeout(limit).into_failure(None))),
        None => exchange.await,
    }
}

async fn collect_body(body: Incoming) -> Result<Bytes, ClientError> {
    body.collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| {
            ClientError::Transport(format!("failed to read response body: {}", error_chain(&e)))
        })
}

fn decode_json<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T, ApiFailure> {
    let decoded = if body.trim_ascii().is_empty() {
        serde_json::from_value(Value::Null)
    } else {
        serde_json::from_slice(body)
    };
    decoded.map_err(|e| {
        ClientError::Decode(format!("invalid JSON in response: {e}")).into_failure(Some(status))
    })
}
