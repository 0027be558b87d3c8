//! Root stores and crypto provider for the HTTPS connector.

use std::sync::{Arc, OnceLock};

use rustls::crypto::CryptoProvider;
use rustls_pki_types::CertificateDer;

use crate::error::HttpError;

static OS_ROOTS: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

/// Certificates from the OS trust store, read on first use and cached for the
/// life of the process. Empty when the store has nothing usable.
pub fn os_roots() -> &'static [CertificateDer<'static>] {
    OS_ROOTS.get_or_init(|| {
        let loaded = rustls_native_certs::load_native_certs();
        for err in &loaded.errors {
            tracing::warn!(error = %err, "skipping unreadable OS root certificate");
        }
        tracing::debug!(count = loaded.certs.len(), "read OS root certificates");
        loaded.certs
    })
}

/// The installed process default, or aws-lc-rs when none is installed.
pub fn crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// Client config trusting only the OS roots.
///
/// # Errors
///
/// `HttpError::Tls` when no OS root parses. The failure surfaces at build
/// time instead of on the first handshake.
pub fn native_roots_client_config() -> Result<rustls::ClientConfig, HttpError> {
    let mut store = rustls::RootCertStore::empty();
    let (added, ignored) = store.add_parsable_certificates(os_roots().iter().cloned());
    if ignored > 0 {
        tracing::warn!(added, ignored, "ignored unparsable OS root certificates");
    }
    if added == 0 {
        return Err(HttpError::Tls(
            format!("OS trust store yielded no usable roots ({ignored} rejected)").into(),
        ));
    }

    let config = rustls::ClientConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| HttpError::Tls(Box::new(e)))?
        .with_root_certificates(store)
        .with_no_client_auth();
    Ok(config)
}
