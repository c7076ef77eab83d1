//! Responses the proxy produces itself rather than relaying from upstream.

use crate::body::{self, ProxyBody};
use crate::expectation::{BodyEncoding, RespondWith};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use std::fmt::Display;
use tracing::warn;

pub const NO_MATCH_BODY: &str = "everdeen: no expectation matched request";
pub const BASE64_ERROR_BODY: &str = "everdeen: error decoding base64 encoded body";

/// Plain-text response.
pub fn text_response(status: StatusCode, message: impl Into<String>) -> Response<ProxyBody> {
    let mut response = Response::new(body::full(message.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// 404 for a request no expectation claimed.
pub fn no_match() -> Response<ProxyBody> {
    text_response(StatusCode::NOT_FOUND, NO_MATCH_BODY)
}

/// 502 carrying the error text.
pub fn bad_gateway(err: impl Display) -> Response<ProxyBody> {
    text_response(StatusCode::BAD_GATEWAY, format!("everdeen: {err}"))
}

/// Build the response an expectation is configured to return.
///
/// A body that fails base64 decoding turns the response into a 500, keeping
/// the configured headers.
pub fn synthesize(respond_with: &RespondWith) -> Response<ProxyBody> {
    let (status, payload) = match respond_with.body_encoding {
        BodyEncoding::None => (
            status_or_500(respond_with.status),
            Bytes::from(respond_with.body.clone()),
        ),
        BodyEncoding::Base64 => match BASE64.decode(respond_with.body.as_bytes()) {
            Ok(decoded) => (status_or_500(respond_with.status), Bytes::from(decoded)),
            Err(e) => {
                warn!("Configured base64 body does not decode: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Bytes::from_static(BASE64_ERROR_BODY.as_bytes()),
                )
            }
        },
    };

    let mut response = Response::new(body::full(payload));
    *response.status_mut() = status;
    for (name, value) in &respond_with.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().insert(name, value);
            }
            _ => warn!(header = %name, "Skipping invalid configured response header"),
        }
    }
    response
}

fn status_or_500(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
