//! Intercepting proxy.
//!
//! ## Module Structure
//!
//! - `server`: Listener, `CONNECT` handling and TLS termination
//! - `interceptor`: Match / record / respond pipeline run for every request
//! - `response`: Synthesized and error responses
//! - `forwarding`: Pass-through to the real destination
//! - `client`: Pooled upstream HTTP(S) client
//! - `tls`: rustls helpers (crypto provider, MITM acceptor, insecure verifier)

mod client;
mod forwarding;
mod interceptor;
mod response;
mod server;
mod tls;

pub use client::{create_http_client, HttpClient};
pub use forwarding::{forward, strip_hop_by_hop};
pub use interceptor::{Interception, Interceptor};
pub use response::{bad_gateway, no_match, synthesize, text_response, BASE64_ERROR_BODY, NO_MATCH_BODY};
pub use server::ProxyServer;
pub use tls::{crypto_provider, mitm_acceptor, NoVerifier};
