//! HTTP client for the Socket security analysis API.
//!
//! This crate sends authenticated requests to the Socket API and turns every
//! outcome into an [`ApiResult`]: success with the HTTP status and decoded
//! data, or a classified [`ApiFailure`] with a human-readable description.
//! A request that cannot be sent at all (a path that is not a valid URL, a
//! query that is not a map) is rejected with `Err(ClientError)` instead,
//! before any network traffic.
//!
//! ## Features
//!
//! - JSON, text, raw and NDJSON (newline-delimited JSON) responses
//! - Streaming multipart uploads of local files, validated before sending
//! - Retries with exponential backoff for transient failures
//! - Per-call timeouts, retry settings and custom headers
//! - A lazily created, shared connection pool
//!
//! ## Example
//!
//! ```ignore
//! use socket_sdk_client::{ApiResult, SocketClient};
//!
//! let client = SocketClient::builder(std::env::var("SOCKET_API_KEY")?)
//!     .retries(2)
//!     .build()?;
//!
//! match client.get_quota().await? {
//!     ApiResult::Ok { data, .. } => println!("{} requests left", data.quota),
//!     ApiResult::Err(failure) => eprintln!("quota lookup failed: {failure}"),
//! }
//! ```
//!
//! ## NDJSON Example
//!
//! Batch endpoints answer with one JSON document per line. The stream yields
//! items as the body arrives; a malformed line is reported in place and the
//! stream continues.
//!
//! ```ignore
//! use futures::StreamExt;
//! use socket_sdk_client::{BatchPackageQuery, PurlComponent};
//!
//! let components = [
//!     PurlComponent::new("pkg:npm/express@4.19.2"),
//!     PurlComponent::new("pkg:pypi/django@5.0.6"),
//! ];
//!
//! let mut artifacts = client
//!     .batch_package_fetch(&components, &BatchPackageQuery::default())
//!     .await?
//!     .into_result()?;
//!
//! while let Some(item) = artifacts.next().await {
//!     match item {
//!         Ok(artifact) => println!("{}", artifact["name"]),
//!         Err(e) => eprintln!("{e}"),
//!     }
//! }
//! ```
//!
//! Dropping the stream closes the response body. The call's timeout also
//! bounds each wait for the next chunk, so a stalled body ends the stream
//! with a timeout error.
//!
//! ## Upload Example
//!
//! ```ignore
//! use socket_sdk_client::{FullScanParams, MultipartForm};
//!
//! let files = MultipartForm::new()
//!     .files_relative_to("/work/app", ["/work/app/package.json", "/work/app/package-lock.json"])?
//!     .build()
//!     .await?;
//!
//! let scan = client
//!     .create_org_full_scan("acme", &FullScanParams::new("app"), files)
//!     .await?;
//! ```
//!
//! [`MultipartForm::build`] checks that every file exists and is readable,
//! so a missing file fails before any network traffic. The body streams file
//! contents in fixed-size chunks and can be replayed for each retry.
//!
//! ## Retry Logic
//!
//! Transport errors, timeouts and 5xx responses are retried with exponential
//! backoff. 401/403 and other 4xx responses are returned at once.
//!
//! ```ignore
//! use socket_sdk_client::{ApiRequest, CallOptions};
//! use std::time::Duration;
//!
//! let options = CallOptions::new()
//!     .retries(3)
//!     .retry_delay(Duration::from_millis(200));
//!
//! let scans = client
//!     .send_json::<serde_json::Value>(ApiRequest::get("orgs/acme/full-scans"), options)
//!     .await?;
//! ```
//!
//! With `retries = N` a persistently failing call makes `N + 1` attempts.
//! Delays grow as `base * multiplier^k`, plus up to `jitter` of extra random
//! delay, capped by `max_delay` when set.
//!
//! For retry decisions that need more than the response head, wrap the whole
//! call with [`retry_with_policy`].
//!
//! ## Feature Flags
//!
//! | Feature | Description | Dependencies |
//! |---------|-------------|--------------|
//! | `tls` (default) | `tls-ring` + `tls-native-roots` | |
//! | `tls-ring` / `tls-aws-lc` | rustls crypto provider | `rustls` |
//! | `tls-native-roots` | System root certificates | `rustls-native-certs` |
//! | `tls-webpki-roots` | Bundled Mozilla root certificates | `webpki-roots` |
//! | `tracing` | Spans and retry events | `tracing` |
//!
//! With `tracing` enabled each call runs in an `api.call` span carrying
//! `http.method`, `url.path` and `otel.kind = "client"`, and every retry
//! emits a `debug` event with the attempt number, delay and error.

mod api;
mod builder;
mod client;
pub mod config;
mod error;
pub mod request;
pub mod response;
pub mod transport;

pub use api::{BatchPackageQuery, FullScanParams, PurlComponent, QuotaResponse};
pub use builder::{ClientBuilder, DEFAULT_BASE_URL, DEFAULT_USER_AGENT};
pub use client::SocketClient;
pub use error::{ClientBuildError, ClientError};

// Re-export from config module
pub use config::{
    CallOptions, ExponentialBackoff, RetryController, RetryOutcome, RetryPolicy, retry,
    retry_with_policy,
};

// Re-export from request module
pub use request::{ApiRequest, MultipartBody, MultipartForm, RequestBody};

// Re-export from response module
pub use response::{NdjsonError, NdjsonResponse, NdjsonStream};

// Re-export transport types at the top level for convenience
pub use transport::{HyperTransport, HyperTransportBuilder, TlsClientConfig};

// Re-export core types that users need
pub use socket_sdk_core::{ApiFailure, ApiResult, ErrorDescription, FailureKind, LineError};
