//! Control API for registering expectations and inspecting recorded traffic.
//!
//! Endpoints:
//! - `GET /ping` - liveness probe
//! - `POST /expectations` - register a batch of expectations
//! - `GET /expectations` - list expectations with their match counts
//! - `GET /expectations/:uuid/requests` - requests recorded for an expectation
//! - `GET /ca.pem` - CA certificate used for HTTPS interception
//!
//! The API listens on a configurable address (default: 0.0.0.0:4322).

mod handlers;
mod router;
mod server;
mod types;

pub use server::{AdminApiServer, AdminState};
pub use types::{ErrorDetail, ErrorResponse};
