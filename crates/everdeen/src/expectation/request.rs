//! Request wrapper seen by criteria, the request store and the forwarder.

use crate::body::{self, BoxError, ProxyBody};
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::header::{HeaderMap, HOST};
use hyper::http::request::Parts;
use hyper::{Method, Request, Uri};
use std::collections::HashMap;

enum BodyState {
    Pending(ProxyBody),
    Buffered(Bytes),
}

/// A proxied request travelling through the interception pipeline.
///
/// The body is read lazily the first time something needs it and kept in
/// memory afterwards, so every criterion, the store and the upstream forward
/// all observe the same complete payload.
pub struct InterceptedRequest {
    parts: Parts,
    body: BodyState,
    query: Vec<(String, String)>,
}

impl InterceptedRequest {
    pub fn new(req: Request<ProxyBody>) -> Self {
        let (parts, body) = req.into_parts();
        let query = parse_query(parts.uri.query().unwrap_or(""));
        Self {
            parts,
            body: BodyState::Pending(body),
            query,
        }
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// Target host including any port, taken from the request target when it
    /// is absolute and from the `Host` header otherwise.
    pub fn host(&self) -> String {
        if let Some(authority) = self.parts.uri.authority() {
            return match authority.port() {
                Some(port) => format!("{}:{}", authority.host(), port),
                None => authority.host().to_string(),
            };
        }
        self.parts
            .headers
            .get(HOST)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        self.parts.uri.path()
    }

    /// First value of the named header, or an empty string.
    pub fn header(&self, name: &str) -> String {
        self.parts
            .headers
            .get(name)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .unwrap_or_default()
    }

    /// Value of the first occurrence of a query key.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a repeated query key, in request order.
    pub fn query_values(&self, key: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Absolute URL of the request as seen by the proxy.
    pub fn url(&self) -> String {
        let uri = &self.parts.uri;
        if uri.scheme().is_some() && uri.authority().is_some() {
            return uri.to_string();
        }
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        format!("http://{}{}", self.host(), path_and_query)
    }

    /// Full request body, reading it from the connection on first use.
    pub async fn body(&mut self) -> Result<Bytes, BoxError> {
        if let BodyState::Buffered(bytes) = &self.body {
            return Ok(bytes.clone());
        }
        let state = std::mem::replace(&mut self.body, BodyState::Buffered(Bytes::new()));
        if let BodyState::Pending(pending) = state {
            let bytes = pending.collect().await?.to_bytes();
            self.body = BodyState::Buffered(bytes.clone());
            return Ok(bytes);
        }
        Ok(Bytes::new())
    }

    /// Header multimap keyed by canonical `Title-Case` names.
    pub fn canonical_headers(&self) -> HashMap<String, Vec<String>> {
        let mut headers: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in self.parts.headers.iter() {
            headers
                .entry(canonical_header_name(name.as_str()))
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        headers
    }

    /// Hand the request back for forwarding, with whatever body state it has.
    pub fn into_request(self) -> Request<ProxyBody> {
        let body = match self.body {
            BodyState::Pending(pending) => pending,
            BodyState::Buffered(bytes) => body::full(bytes),
        };
        Request::from_parts(self.parts, body)
    }
}

/// `content-type` -> `Content-Type`
pub fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Split a raw query string into decoded key/value pairs.
///
/// `+` decodes to a space. Pairs that fail to decode are skipped, and a key
/// without `=` gets an empty value.
fn parse_query(raw: &str) -> Vec<(String, String)> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode_component(key)?;
            let value = decode_component(value)?;
            Some((key, value))
        })
        .collect()
}

fn decode_component(raw: &str) -> Option<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced).ok().map(|s| s.into_owned())
}
