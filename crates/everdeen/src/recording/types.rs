//! Recorded request shape and store errors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// A matched request as persisted by the request store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedRequest {
    /// Absolute URL as seen by the proxy
    pub url: String,
    pub method: String,
    /// Canonical header name to every value, in arrival order
    pub headers: HashMap<String, Vec<String>>,
    pub body_base64: String,
}

/// Body of `GET /expectations/{uuid}/requests`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedRequests {
    pub requests: Vec<RecordedRequest>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read request body: {0}")]
    BodyRead(#[source] crate::body::BoxError),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: invalid record: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}
