//! Body type shared by the proxy listener, the interception pipeline and the
//! upstream client.

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use std::convert::Infallible;

/// Error type carried by proxied bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Boxed body used for both requests and responses flowing through the proxy.
pub type ProxyBody = BoxBody<Bytes, BoxError>;

/// Wrap a fully buffered payload.
pub fn full(bytes: impl Into<Bytes>) -> ProxyBody {
    BoxBody::new(Full::new(bytes.into()).map_err(|never: Infallible| match never {}))
}

/// An empty body.
pub fn empty() -> ProxyBody {
    BoxBody::new(Empty::<Bytes>::new().map_err(|never: Infallible| match never {}))
}

/// Box a hyper `Incoming` (or any other hyper-error body) into a [`ProxyBody`].
pub fn boxed<B>(body: B) -> ProxyBody
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<BoxError>,
{
    BoxBody::new(body.map_err(|e| -> BoxError { e.into() }))
}
