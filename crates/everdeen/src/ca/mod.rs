//! TLS certificate authority used to terminate intercepted HTTPS.

mod authority;

pub use authority::{
    strip_port, CertificateAuthority, LeafCertificate, DEFAULT_CA_NAME, DEFAULT_CA_ORGANIZATION,
};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CaError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid private key: {0}")]
    Key(String),
    #[error("invalid certificate PEM: {0}")]
    Pem(String),
    #[error("no certificate found in PEM input")]
    NoCertificate,
    #[error("certificate generation failed: {0}")]
    Certificate(#[from] rcgen::Error),
    #[error("TLS configuration failed: {0}")]
    Tls(#[from] rustls::Error),
    #[error("invalid hostname '{0}'")]
    InvalidHostname(String),
    #[error("blocking task failed: {0}")]
    Task(String),
}

impl CaError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        CaError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
