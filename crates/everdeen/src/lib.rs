//! Everdeen: a programmable HTTP/HTTPS intercepting proxy.
//!
//! Clients send their traffic through the proxy listener. Each request is
//! checked against the registered expectations in order and is either
//! answered with a canned response, recorded, or forwarded upstream.
//! HTTPS is intercepted by terminating `CONNECT` tunnels with certificates
//! issued on the fly by the configured CA.

pub mod admin_api;
pub mod app;
pub mod body;
pub mod ca;
pub mod config;
pub mod expectation;
pub mod proxy;
pub mod recording;

pub use app::Everdeen;
