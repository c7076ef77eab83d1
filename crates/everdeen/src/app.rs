//! Wires the engine, store and CA into the two listeners.

use crate::admin_api::{AdminApiServer, AdminState};
use crate::ca::CertificateAuthority;
use crate::config::Config;
use crate::expectation::ExpectationEngine;
use crate::proxy::ProxyServer;
use crate::recording::RequestStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// A bound proxy plus control API sharing one engine, store and CA.
pub struct Everdeen {
    proxy: ProxyServer,
    admin: AdminApiServer,
    proxy_listener: TcpListener,
    control_listener: TcpListener,
}

impl Everdeen {
    /// Load the CA, prepare the store and bind both listeners.
    pub async fn bind(config: &Config) -> Result<Self, anyhow::Error> {
        let ca = Arc::new(config.load_ca().await?);
        Self::bind_with_ca(config, ca).await
    }

    /// Like [`Everdeen::bind`] with an already constructed CA.
    pub async fn bind_with_ca(
        config: &Config,
        ca: Arc<CertificateAuthority>,
    ) -> Result<Self, anyhow::Error> {
        let store = Arc::new(RequestStore::new(config.request_store_dir.clone()));
        store.init().await?;

        let engine = Arc::new(ExpectationEngine::default());

        let proxy_listener = TcpListener::bind(config.proxy_addr).await.map_err(|e| {
            anyhow::anyhow!("Failed to bind proxy listener to {}: {e}", config.proxy_addr)
        })?;
        let control_listener = TcpListener::bind(config.control_addr).await.map_err(|e| {
            anyhow::anyhow!("Failed to bind control API to {}: {e}", config.control_addr)
        })?;

        let proxy = ProxyServer::new(
            proxy_listener.local_addr()?,
            Arc::clone(&engine),
            Arc::clone(&store),
            Arc::clone(&ca),
            config.upstream_insecure,
        )?;
        let admin = AdminApiServer::new(
            control_listener.local_addr()?,
            AdminState {
                engine,
                store,
                ca,
            },
        );

        Ok(Self {
            proxy,
            admin,
            proxy_listener,
            control_listener,
        })
    }

    pub fn proxy_addr(&self) -> SocketAddr {
        self.proxy.addr()
    }

    pub fn control_addr(&self) -> SocketAddr {
        self.admin.addr()
    }

    /// Serve both listeners until either fails.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        tokio::try_join!(
            self.proxy.serve(self.proxy_listener),
            self.admin.serve(self.control_listener),
        )?;
        Ok(())
    }
}
