#![allow(dead_code)]

use bytes::Bytes;
use everdeen::ca::{CertificateAuthority, DEFAULT_CA_NAME, DEFAULT_CA_ORGANIZATION};
use everdeen::config::{CaSource, Config};
use everdeen::Everdeen;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use serde_json::Value;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// RSA generation is slow; every test shares one CA.
pub fn test_ca() -> Arc<CertificateAuthority> {
    static CA: OnceLock<Arc<CertificateAuthority>> = OnceLock::new();
    CA.get_or_init(|| {
        Arc::new(
            CertificateAuthority::generate(
                DEFAULT_CA_NAME,
                DEFAULT_CA_ORGANIZATION,
                time::Duration::days(30),
            )
            .unwrap(),
        )
    })
    .clone()
}

pub struct Harness {
    pub proxy_addr: SocketAddr,
    pub control_addr: SocketAddr,
    pub store_dir: TempDir,
    /// Client routed through the proxy, trusting the test CA.
    pub proxied: reqwest::Client,
    /// Client talking to the control API directly.
    pub control: reqwest::Client,
}

impl Harness {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(configure: impl FnOnce(&mut Config)) -> Self {
        let store_dir = TempDir::new().unwrap();
        let mut config = Config {
            proxy_addr: "127.0.0.1:0".parse().unwrap(),
            control_addr: "127.0.0.1:0".parse().unwrap(),
            ca: CaSource::Ephemeral,
            request_store_dir: store_dir.path().to_path_buf(),
            ..Default::default()
        };
        configure(&mut config);

        let ca = test_ca();
        let app = Everdeen::bind_with_ca(&config, Arc::clone(&ca))
            .await
            .unwrap();
        let proxy_addr = app.proxy_addr();
        let control_addr = app.control_addr();
        tokio::spawn(app.run());

        let proxied = reqwest::Client::builder()
            .proxy(reqwest::Proxy::all(format!("http://{proxy_addr}")).unwrap())
            .add_root_certificate(reqwest::Certificate::from_pem(ca.cert_pem().as_bytes()).unwrap())
            .build()
            .unwrap();
        let control = reqwest::Client::builder().no_proxy().build().unwrap();

        Self {
            proxy_addr,
            control_addr,
            store_dir,
            proxied,
            control,
        }
    }

    pub fn control_url(&self, path: &str) -> String {
        format!("http://{}{}", self.control_addr, path)
    }

    /// Register expectations, returning the response body.
    pub async fn register(&self, expectations: Value) -> Vec<Value> {
        let response = self
            .control
            .post(self.control_url("/expectations"))
            .json(&serde_json::json!({ "expectations": expectations }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200, "registration failed");
        response.json().await.unwrap()
    }

    pub async fn recorded(&self, identity: &str) -> Value {
        let response = self
            .control
            .get(self.control_url(&format!("/expectations/{identity}/requests")))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        response.json().await.unwrap()
    }
}

/// A plain HTTP upstream answering every request with its method and path.
pub async fn start_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let service = service_fn(|req: Request<Incoming>| async move {
                    let method = req.method().clone();
                    let path = req.uri().path().to_string();
                    let seen_connection = req.headers().contains_key("proxy-connection");
                    let body = req.into_body().collect().await.unwrap().to_bytes();
                    let text = format!(
                        "upstream {method} {path} body={}",
                        String::from_utf8_lossy(&body)
                    );
                    let response = Response::builder()
                        .status(201)
                        .header("X-Upstream", "yes")
                        .header("X-Saw-Proxy-Connection", seen_connection.to_string())
                        .body(Full::new(Bytes::from(text)))
                        .unwrap();
                    Ok::<_, Infallible>(response)
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}
