//! Pass-through forwarding to the request's real destination.

use super::client::HttpClient;
use super::response::{bad_gateway, text_response};
use crate::body::{self, ProxyBody};
use crate::expectation::InterceptedRequest;
use hyper::header::{HeaderMap, HeaderName, CONNECTION};
use hyper::{Response, StatusCode, Uri};
use tracing::{debug, warn};

/// Headers that describe a single hop and must not be relayed.
static HOP_BY_HOP: [&str; 8] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Send the request upstream unchanged and relay whatever comes back.
pub async fn forward(client: &HttpClient, req: InterceptedRequest) -> Response<ProxyBody> {
    let url = req.url();
    let target: Uri = match url.parse() {
        Ok(uri) => uri,
        Err(e) => {
            warn!(url = %url, "Cannot forward request with invalid URL: {e}");
            return text_response(StatusCode::BAD_REQUEST, format!("everdeen: {e}"));
        }
    };

    let mut upstream_req = req.into_request();
    *upstream_req.uri_mut() = target;
    strip_hop_by_hop(upstream_req.headers_mut());

    debug!(url = %url, "Forwarding to upstream");
    match client.request(upstream_req).await {
        Ok(upstream_response) => {
            let (mut parts, incoming) = upstream_response.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            Response::from_parts(parts, body::boxed(incoming))
        }
        Err(e) => {
            warn!(url = %url, "Upstream request failed: {e}");
            bad_gateway(e)
        }
    }
}
