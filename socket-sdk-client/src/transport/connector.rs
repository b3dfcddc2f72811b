//! TLS connector setup for the hyper client.
//!
//! TLS needs both a crypto provider and root certificates:
//!
//! - Crypto providers: `tls-ring` (default) or `tls-aws-lc`. Without either,
//!   a globally installed rustls `CryptoProvider` is used if present.
//! - Root certificates: `tls-native-roots` (default) or `tls-webpki-roots`.

use std::sync::Arc;

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::ClientConfig;

use crate::ClientError;

/// Returns true if both a crypto provider feature and a root certificate
/// feature are enabled.
#[inline]
pub const fn has_tls_support() -> bool {
    cfg!(any(feature = "tls-ring", feature = "tls-aws-lc"))
        && cfg!(any(
            feature = "tls-native-roots",
            feature = "tls-webpki-roots"
        ))
}

/// Pick a crypto provider: feature-gated first, then the process-wide default.
fn crypto_provider() -> Option<Arc<rustls::crypto::CryptoProvider>> {
    #[cfg(feature = "tls-ring")]
    return Some(Arc::new(rustls::crypto::ring::default_provider()));

    #[cfg(all(feature = "tls-aws-lc", not(feature = "tls-ring")))]
    return Some(Arc::new(rustls::crypto::aws_lc_rs::default_provider()));

    #[cfg(not(any(feature = "tls-ring", feature = "tls-aws-lc")))]
    rustls::crypto::CryptoProvider::get_default().cloned()
}

/// Build the default TLS configuration from the enabled features.
pub fn default_tls_config() -> Result<ClientConfig, ClientError> {
    let provider = crypto_provider().ok_or_else(|| {
        ClientError::Transport(
            "HTTPS requires a crypto provider: enable `tls-ring` or `tls-aws-lc`, \
             or install a global rustls CryptoProvider"
                .into(),
        )
    })?;

    let roots = build_root_store()?;

    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ClientError::Transport(format!("invalid TLS configuration: {e}")))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(config)
}

#[cfg(any(feature = "tls-native-roots", feature = "tls-webpki-roots"))]
fn build_root_store() -> Result<rustls::RootCertStore, ClientError> {
    let mut roots = rustls::RootCertStore::empty();

    // Prefer native roots when both features are on.
    #[cfg(feature = "tls-native-roots")]
    {
        let native_certs = rustls_native_certs::load_native_certs();
        if !native_certs.errors.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::debug!("errors loading native certs: {:?}", native_certs.errors);
        }
        roots.add_parsable_certificates(native_certs.certs);
    }

    #[cfg(all(feature = "tls-webpki-roots", not(feature = "tls-native-roots")))]
    {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    Ok(roots)
}

#[cfg(not(any(feature = "tls-native-roots", feature = "tls-webpki-roots")))]
fn build_root_store() -> Result<rustls::RootCertStore, ClientError> {
    Err(ClientError::Transport(
        "HTTPS requires TLS root certificates: enable `tls-native-roots` or `tls-webpki-roots`, \
         or supply a TLS configuration"
            .into(),
    ))
}

/// Build an HTTPS connector that also accepts plain `http://` URLs.
///
/// Without an explicit configuration, [`default_tls_config`] is used.
pub fn build_https_connector(
    tls_config: Option<ClientConfig>,
) -> Result<HttpsConnector<HttpConnector>, ClientError> {
    let config = match tls_config {
        Some(config) => config,
        None => default_tls_config()?,
    };

    Ok(HttpsConnectorBuilder::new()
        .with_tls_config(config)
        .https_or_http()
        .enable_all_versions()
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_tls_support_matches_features() {
        let expected = cfg!(any(feature = "tls-ring", feature = "tls-aws-lc"))
            && cfg!(any(feature = "tls-native-roots", feature = "tls-webpki-roots"));
        assert_eq!(has_tls_support(), expected);
    }

    #[cfg(all(feature = "tls-ring", feature = "tls-native-roots"))]
    #[test]
    fn test_default_connector_builds() {
        assert!(default_tls_config().is_ok());
        assert!(build_https_connector(None).is_ok());
    }
}
