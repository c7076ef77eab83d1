//! Proxy listener.
//!
//! Plain HTTP proxy requests go straight into the interception pipeline.
//! `CONNECT` tunnels are always intercepted: the tunnel is accepted, TLS is
//! terminated with a leaf issued by the CA, and every decrypted request is
//! fed through the same pipeline.

use super::client::create_http_client;
use super::interceptor::Interceptor;
use super::response::text_response;
use super::tls::mitm_acceptor;
use crate::body::{self, ProxyBody};
use crate::ca::CertificateAuthority;
use crate::expectation::ExpectationEngine;
use crate::recording::RequestStore;
use hyper::body::Incoming;
use hyper::header::HOST;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::upgrade::Upgraded;
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// The intercepting proxy.
pub struct ProxyServer {
    addr: SocketAddr,
    interceptor: Arc<Interceptor>,
    ca: Arc<CertificateAuthority>,
}

impl ProxyServer {
    pub fn new(
        addr: SocketAddr,
        engine: Arc<ExpectationEngine>,
        store: Arc<RequestStore>,
        ca: Arc<CertificateAuthority>,
        upstream_insecure: bool,
    ) -> Result<Self, anyhow::Error> {
        let client = create_http_client(upstream_insecure)?;
        Ok(Self {
            addr,
            interceptor: Arc::new(Interceptor::new(engine, store, client)),
            ca,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), anyhow::Error> {
        info!("Proxy listening on http://{}", listener.local_addr()?);
        let server = Arc::new(self);

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let server = Arc::clone(&server);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let server = Arc::clone(&server);
                    async move { server.handle(req).await }
                });

                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, service)
                    .with_upgrades()
                    .await
                {
                    debug!("Error serving proxy connection from {}: {}", remote_addr, err);
                }
            });
        }
    }

    async fn handle(
        self: Arc<Self>,
        req: Request<Incoming>,
    ) -> Result<Response<ProxyBody>, Infallible> {
        if req.method() == Method::CONNECT {
            return Ok(self.tunnel(req));
        }
        let req = req.map(body::boxed);
        Ok(self.interceptor.handle(req).await)
    }

    /// Accept a `CONNECT` and intercept the tunnel once it is upgraded.
    fn tunnel(self: Arc<Self>, req: Request<Incoming>) -> Response<ProxyBody> {
        let Some(authority) = req.uri().authority().map(|a| a.to_string()) else {
            warn!(uri = %req.uri(), "CONNECT without an authority");
            return text_response(StatusCode::BAD_REQUEST, "everdeen: CONNECT requires host:port");
        };

        tokio::spawn(async move {
            match hyper::upgrade::on(req).await {
                Ok(upgraded) => {
                    if let Err(e) = self.serve_tunnel(upgraded, &authority).await {
                        debug!(authority = %authority, "Intercepted tunnel closed: {e}");
                    }
                }
                Err(e) => warn!(authority = %authority, "CONNECT upgrade failed: {e}"),
            }
        });

        Response::new(body::empty())
    }

    async fn serve_tunnel(&self, upgraded: Upgraded, authority: &str) -> Result<(), anyhow::Error> {
        let acceptor = mitm_acceptor(Arc::clone(&self.ca), authority).await?;
        let tls = acceptor.accept(TokioIo::new(upgraded)).await?;
        debug!(authority = %authority, "TLS terminated for tunnel");

        let interceptor = Arc::clone(&self.interceptor);
        let authority = authority.to_string();
        let service = service_fn(move |req: Request<Incoming>| {
            let interceptor = Arc::clone(&interceptor);
            let rewritten = absolute_https(req, &authority);
            async move {
                match rewritten {
                    Ok(req) => Ok::<_, Infallible>(interceptor.handle(req).await),
                    Err(e) => {
                        warn!("Cannot rebuild tunnelled request URL: {e}");
                        Ok(text_response(
                            StatusCode::BAD_REQUEST,
                            format!("everdeen: {e}"),
                        ))
                    }
                }
            }
        });

        http1::Builder::new()
            .serve_connection(TokioIo::new(tls), service)
            .await?;
        Ok(())
    }
}

/// Rewrite a request read from inside a tunnel to `https://host/path?query`.
///
/// The host comes from the request's own `Host` header, falling back to the
/// `CONNECT` authority.
fn absolute_https(
    req: Request<Incoming>,
    authority: &str,
) -> Result<Request<ProxyBody>, hyper::http::Error> {
    let (mut parts, incoming) = req.into_parts();
    let host = parts
        .headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(authority)
        .to_string();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .to_string();

    parts.uri = Uri::builder()
        .scheme("https")
        .authority(host)
        .path_and_query(path_and_query)
        .build()?;
    Ok(Request::from_parts(parts, body::boxed(incoming)))
}
