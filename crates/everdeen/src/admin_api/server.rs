//! Control API server.

use crate::admin_api::router::route_request;
use crate::ca::CertificateAuthority;
use crate::expectation::ExpectationEngine;
use crate::recording::RequestStore;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Shared state the handlers work against.
pub struct AdminState {
    pub engine: Arc<ExpectationEngine>,
    pub store: Arc<RequestStore>,
    pub ca: Arc<CertificateAuthority>,
}

/// Control API server for Everdeen
pub struct AdminApiServer {
    addr: SocketAddr,
    state: Arc<AdminState>,
}

impl AdminApiServer {
    pub fn new(addr: SocketAddr, state: AdminState) -> Self {
        Self {
            addr,
            state: Arc::new(state),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), anyhow::Error> {
        info!("Control API listening on http://{}", listener.local_addr()?);

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { route_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Control API connection error: {}", e);
                }
            });
        }
    }
}
