//! System handlers: liveness and CA certificate download.

use crate::admin_api::server::AdminState;
use crate::admin_api::types::*;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// GET /ping
pub fn handle_ping() -> Response<Full<Bytes>> {
    text_response(StatusCode::OK, "PONG")
}

/// GET /ca.pem - the CA certificate clients must trust for HTTPS interception
pub fn handle_ca_cert(state: &AdminState) -> Response<Full<Bytes>> {
    build_response_with_headers(
        StatusCode::OK,
        [("Content-Type", "application/x-pem-file")],
        state.ca.cert_pem().to_string(),
    )
}
