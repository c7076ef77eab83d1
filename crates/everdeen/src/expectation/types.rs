//! Wire types for expectations.
//!
//! These are the shapes accepted by `POST /expectations` and echoed back by
//! `GET /expectations`. They carry no compiled state; see `criterion` and
//! `engine` for the runtime forms.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Criteria
// ============================================================================

/// Request dimension a criterion inspects.
///
/// Unrecognized values are kept verbatim in `Other` so they round-trip through
/// the API unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CriteriaType {
    Method,
    Host,
    Path,
    Header,
    Body,
    QueryParam,
    Other(String),
}

impl CriteriaType {
    pub fn as_str(&self) -> &str {
        match self {
            CriteriaType::Method => "method",
            CriteriaType::Host => "host",
            CriteriaType::Path => "path",
            CriteriaType::Header => "header",
            CriteriaType::Body => "body",
            CriteriaType::QueryParam => "query_param",
            CriteriaType::Other(other) => other,
        }
    }
}

impl From<String> for CriteriaType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "method" => CriteriaType::Method,
            "host" => CriteriaType::Host,
            "path" => CriteriaType::Path,
            "header" => CriteriaType::Header,
            "body" => CriteriaType::Body,
            "query_param" => CriteriaType::QueryParam,
            _ => CriteriaType::Other(value),
        }
    }
}

impl From<CriteriaType> for String {
    fn from(value: CriteriaType) -> Self {
        match value {
            CriteriaType::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for CriteriaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a criterion compares its value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    #[default]
    #[serde(alias = "")]
    Exact,
    Regex,
}

/// A single predicate within an expectation's request criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    #[serde(rename = "type")]
    pub criteria_type: CriteriaType,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl Criterion {
    /// Shorthand for an exact criterion without a key.
    pub fn exact(criteria_type: CriteriaType, value: impl Into<String>) -> Self {
        Self {
            criteria_type,
            key: String::new(),
            match_type: MatchType::Exact,
            value: value.into(),
            values: Vec::new(),
        }
    }

    /// Shorthand for a regex criterion without a key.
    pub fn regex(criteria_type: CriteriaType, pattern: impl Into<String>) -> Self {
        Self {
            match_type: MatchType::Regex,
            ..Self::exact(criteria_type, pattern)
        }
    }

    /// Set the header or query key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Encoding of `RespondWith::body`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyEncoding {
    #[default]
    #[serde(rename = "", alias = "none")]
    None,
    #[serde(rename = "base64")]
    Base64,
}

fn default_status() -> u16 {
    200
}

/// Template for a synthesized response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespondWith {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub body_encoding: BodyEncoding,
}

impl Default for RespondWith {
    fn default() -> Self {
        Self {
            status: default_status(),
            headers: HashMap::new(),
            body: String::new(),
            body_encoding: BodyEncoding::None,
        }
    }
}

// ============================================================================
// Expectations
// ============================================================================

/// Expectation as submitted to, and listed by, the control API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpectationDefinition {
    #[serde(default)]
    pub request_criteria: Vec<Criterion>,
    #[serde(default)]
    pub respond_with: RespondWith,
    /// 0 means unlimited
    #[serde(default)]
    pub max_matches: u64,
    #[serde(default)]
    pub pass_through: bool,
    #[serde(default)]
    pub store_matching_requests: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    /// Output only. Whatever a client sends here is discarded at registration.
    #[serde(default)]
    pub matches: u64,
}

/// Body of `POST /expectations`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateExpectationsRequest {
    pub expectations: Vec<ExpectationDefinition>,
}

// ============================================================================
// Errors
// ============================================================================

/// Reasons a batch of expectations is rejected. Nothing from a rejected batch
/// is registered.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("expectation {expectation}, criterion {criterion}: invalid regex '{value}': {source}")]
    InvalidRegex {
        expectation: usize,
        criterion: usize,
        value: String,
        #[source]
        source: regex::Error,
    },
    #[error("expectation {expectation}: invalid response status {status}")]
    InvalidStatus { expectation: usize, status: u16 },
    #[error("expectation {expectation}: invalid response header '{name}'")]
    InvalidHeader { expectation: usize, name: String },
    #[error("expectation identity {0} is already registered")]
    IdentityConflict(Uuid),
}

/// Failure while evaluating criteria against a request.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("failed to read request body: {0}")]
    BodyRead(#[source] crate::body::BoxError),
}
