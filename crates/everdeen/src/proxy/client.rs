//! Upstream HTTP client used for pass-through forwarding.

use super::tls::{crypto_provider, NoVerifier};
use crate::body::ProxyBody;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use tracing::{info, warn};

/// Type alias for the HTTP client used by the proxy.
pub type HttpClient = Client<HttpsConnector<HttpConnector>, ProxyBody>;

/// Create the shared pooled client.
///
/// With `skip_tls_verify` upstream certificates are not checked at all.
/// Otherwise the platform roots are trusted; if none can be loaded, HTTPS
/// pass-through will fail certificate checks and a warning is logged.
pub fn create_http_client(skip_tls_verify: bool) -> Result<HttpClient, rustls::Error> {
    let mut http_connector = HttpConnector::new();
    http_connector.enforce_http(false);

    let provider = crypto_provider();
    let https_connector = if skip_tls_verify {
        warn!("Upstream TLS certificate verification DISABLED (testing only)");
        let tls = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier::new(&provider)))
            .with_no_client_auth();
        HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector)
    } else {
        match HttpsConnectorBuilder::new().with_provider_and_native_roots(Arc::clone(&provider)) {
            Ok(builder) => builder.https_or_http().enable_http1().wrap_connector(http_connector),
            Err(e) => {
                warn!("No native root certificates available ({e}); HTTPS upstreams will be untrusted");
                let tls = rustls::ClientConfig::builder_with_provider(provider)
                    .with_safe_default_protocol_versions()?
                    .with_root_certificates(rustls::RootCertStore::empty())
                    .with_no_client_auth();
                HttpsConnectorBuilder::new()
                    .with_tls_config(tls)
                    .https_or_http()
                    .enable_http1()
                    .wrap_connector(http_connector)
            }
        }
    };

    info!(skip_tls_verify, "Upstream client configured (HTTP/1.1)");
    Ok(Client::builder(TokioExecutor::new()).build(https_connector))
}
