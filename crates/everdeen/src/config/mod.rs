//! Runtime configuration.
//!
//! Assembled from command-line flags and `EVERDEEN_*` environment variables
//! in `main`, then validated before anything is bound.

use crate::ca::{CaError, CertificateAuthority, DEFAULT_CA_NAME, DEFAULT_CA_ORGANIZATION};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::warn;

pub const DEFAULT_PROXY_ADDR: &str = "0.0.0.0:4321";
pub const DEFAULT_CONTROL_ADDR: &str = "0.0.0.0:4322";
pub const DEFAULT_CA_VALIDITY_DAYS: u32 = 365;

/// Where the CA comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaSource {
    /// Certificate and key PEM files on disk.
    Files { cert: PathBuf, key: PathBuf },
    /// A CA generated at startup and never written out.
    Ephemeral,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub proxy_addr: SocketAddr,
    pub control_addr: SocketAddr,
    pub ca: CaSource,
    /// Validity applied to generated CAs and to issued leaves.
    pub ca_validity_days: u32,
    /// Base directory of the request store.
    pub request_store_dir: PathBuf,
    /// Skip certificate verification when passing HTTPS requests through.
    pub upstream_insecure: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proxy_addr: SocketAddr::from(([0, 0, 0, 0], 4321)),
            control_addr: SocketAddr::from(([0, 0, 0, 0], 4322)),
            ca: CaSource::Ephemeral,
            ca_validity_days: DEFAULT_CA_VALIDITY_DAYS,
            request_store_dir: default_request_store_dir(),
            upstream_insecure: false,
        }
    }
}

/// `<tmp>/everdeen`
pub fn default_request_store_dir() -> PathBuf {
    std::env::temp_dir().join("everdeen")
}

impl Config {
    /// Pick the CA source from optional certificate and key paths. Both or
    /// neither must be given.
    pub fn ca_source(
        cert: Option<PathBuf>,
        key: Option<PathBuf>,
    ) -> Result<CaSource, anyhow::Error> {
        match (cert, key) {
            (Some(cert), Some(key)) => Ok(CaSource::Files { cert, key }),
            (None, None) => Ok(CaSource::Ephemeral),
            (Some(_), None) => anyhow::bail!("--ca-cert requires --ca-key"),
            (None, Some(_)) => anyhow::bail!("--ca-key requires --ca-cert"),
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.ca_validity_days == 0 {
            anyhow::bail!("CA validity must be at least one day");
        }

        if self.proxy_addr == self.control_addr && self.proxy_addr.port() != 0 {
            anyhow::bail!(
                "Proxy and control API cannot share the address {}",
                self.proxy_addr
            );
        }

        if let CaSource::Files { cert, key } = &self.ca {
            for path in [cert, key] {
                if !path.is_file() {
                    anyhow::bail!("CA file not found: {}", path.display());
                }
            }
        }

        if self.request_store_dir.as_os_str().is_empty() {
            anyhow::bail!("Request store directory must not be empty");
        }

        Ok(())
    }

    pub fn ca_validity(&self) -> time::Duration {
        time::Duration::days(i64::from(self.ca_validity_days))
    }

    /// Load the configured CA, or generate an ephemeral one.
    pub async fn load_ca(&self) -> Result<CertificateAuthority, CaError> {
        match &self.ca {
            CaSource::Files { cert, key } => {
                CertificateAuthority::load(cert, key, self.ca_validity()).await
            }
            CaSource::Ephemeral => {
                warn!(
                    "No CA certificate configured; using a generated CA for this run only. \
                     Fetch it from GET /ca.pem or pass --ca-cert/--ca-key"
                );
                let validity = self.ca_validity();
                tokio::task::spawn_blocking(move || {
                    CertificateAuthority::generate(
                        DEFAULT_CA_NAME,
                        DEFAULT_CA_ORGANIZATION,
                        validity,
                    )
                })
                .await
                .map_err(|e| CaError::Task(e.to_string()))?
            }
        }
    }
}
