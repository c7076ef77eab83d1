//! Durable record of requests that matched recording-enabled expectations.
//!
//! # Module Structure
//!
//! - `types` - Recorded request shape and store errors
//! - `store` - File-backed store keyed by expectation identity

mod store;
mod types;

pub use store::RequestStore;
pub use types::{RecordedRequest, RecordedRequests, StoreError};
