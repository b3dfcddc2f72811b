//! HTTP transport layer.
//!
//! [`HyperTransport`] wraps hyper_util's legacy client and provides:
//!
//! - HTTP/1.1 and HTTP/2 with ALPN negotiation
//! - TLS with rustls (feature-gated)
//! - Connection pooling shared by every clone
//! - A `tower_service::Service` implementation
//!
//! # Feature Flags
//!
//! - `tls` (default) - Enables `tls-ring` + `tls-native-roots`
//! - `tls-ring` / `tls-aws-lc` - Crypto providers
//! - `tls-native-roots` / `tls-webpki-roots` - Root certificates

mod body;
mod connector;
mod hyper;

pub use body::TransportBody;
pub use connector::{build_https_connector, default_tls_config, has_tls_support};
pub use hyper::{HyperTransport, HyperTransportBuilder};

pub use rustls::ClientConfig as TlsClientConfig;
