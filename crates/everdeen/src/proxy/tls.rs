//! TLS plumbing for the proxy: MITM acceptors and the upstream client config.

use crate::ca::{CaError, CertificateAuthority};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::DigitallySignedStruct;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

/// The one crypto provider every rustls config in the crate is built with.
pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Accepts any upstream certificate. Only used with `--upstream-insecure`.
#[derive(Debug)]
pub struct NoVerifier {
    schemes: Vec<rustls::SignatureScheme>,
}

impl NoVerifier {
    pub fn new(provider: &CryptoProvider) -> Self {
        Self {
            schemes: provider
                .signature_verification_algorithms
                .supported_schemes(),
        }
    }
}

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.schemes.clone()
    }
}

/// Build a TLS acceptor presenting a freshly issued leaf for `authority`.
///
/// Leaf issuance generates an RSA key, so it runs on the blocking pool.
pub async fn mitm_acceptor(
    ca: Arc<CertificateAuthority>,
    authority: &str,
) -> Result<TlsAcceptor, CaError> {
    let host = authority.to_string();
    let config = tokio::task::spawn_blocking(move || ca.server_config(&host))
        .await
        .map_err(|e| CaError::Task(e.to_string()))??;
    Ok(TlsAcceptor::from(config))
}
