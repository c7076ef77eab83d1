//! Route dispatch logic for the control API.

use crate::admin_api::handlers::{expectations, system};
use crate::admin_api::server::AdminState;
use crate::admin_api::types::{method_not_allowed, not_found};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use std::sync::Arc;
use tracing::debug;

/// Known control API paths
#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
    /// GET /ping
    Ping,
    /// GET /ca.pem
    CaCert,
    /// GET/POST /expectations
    Expectations,
    /// GET /expectations/:uuid/requests
    RecordedRequests(&'a str),
}

impl<'a> Route<'a> {
    fn parse(path: &'a str) -> Option<Self> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match segments.as_slice() {
            ["ping"] => Some(Route::Ping),
            ["ca.pem"] => Some(Route::CaCert),
            ["expectations"] => Some(Route::Expectations),
            ["expectations", identity, "requests"] => Some(Route::RecordedRequests(*identity)),
            _ => None,
        }
    }
}

/// Main request router
pub async fn route_request(
    req: Request<Incoming>,
    state: Arc<AdminState>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("Control API: {} {}", method, path);

    Ok(route_by_path(&method, &path, req, &state).await)
}

async fn route_by_path(
    method: &Method,
    path: &str,
    req: Request<Incoming>,
    state: &AdminState,
) -> Response<Full<Bytes>> {
    let Some(route) = Route::parse(path) else {
        return not_found();
    };

    match (method, route) {
        (&Method::GET, Route::Ping) => system::handle_ping(),
        (&Method::GET, Route::CaCert) => system::handle_ca_cert(state),
        (&Method::GET, Route::Expectations) => expectations::handle_list(state).await,
        (&Method::POST, Route::Expectations) => expectations::handle_create(req, state).await,
        (&Method::GET, Route::RecordedRequests(identity)) => {
            expectations::handle_requests(identity, state).await
        }
        _ => method_not_allowed(),
    }
}
