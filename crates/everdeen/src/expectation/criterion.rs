//! Compiled request criteria.
//!
//! A [`Criterion`] is turned into a [`CompiledCriterion`] once, at
//! registration. Regex sources are compiled there and shared behind an `Arc`;
//! nothing is recompiled per request.

use super::request::InterceptedRequest;
use super::types::{CriteriaType, Criterion, MatchError, MatchType};
use regex::Regex;
use std::sync::Arc;
use tracing::warn;

/// Exact or regex comparison of a single string value.
#[derive(Debug, Clone)]
pub enum Comparison {
    Exact(String),
    Regex(Arc<Regex>),
}

impl Comparison {
    fn compile(match_type: MatchType, value: &str) -> Result<Self, regex::Error> {
        match match_type {
            MatchType::Exact => Ok(Comparison::Exact(value.to_string())),
            MatchType::Regex => Ok(Comparison::Regex(Arc::new(Regex::new(value)?))),
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Comparison::Exact(expected) => expected == value,
            Comparison::Regex(regex) => regex.is_match(value),
        }
    }
}

/// Runtime predicate, one variant per (criteria type, match type) pairing.
#[derive(Debug, Clone)]
pub enum Matcher {
    Method(String),
    Host(Comparison),
    Path(Comparison),
    Header { key: String, cmp: Comparison },
    Body(Comparison),
    QueryParam { key: String, cmp: Comparison },
    /// Repeated query key whose values must equal this multiset exactly.
    QueryParamAllOf { key: String, values: Vec<String> },
    /// Accepts every request. Used for unrecognized criteria types and for
    /// pairings with no defined behaviour, such as a regex method match.
    Unconditional,
}

/// A criterion ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledCriterion {
    source: Criterion,
    matcher: Matcher,
}

impl CompiledCriterion {
    /// Compile a criterion, rejecting uncompilable regex sources.
    ///
    /// The regex is validated for every regex criterion, including pairings
    /// that end up matching unconditionally.
    pub fn compile(criterion: &Criterion) -> Result<Self, regex::Error> {
        let cmp = Comparison::compile(criterion.match_type, &criterion.value)?;

        let matcher = match (&criterion.criteria_type, criterion.match_type) {
            (CriteriaType::Method, MatchType::Exact) => Matcher::Method(criterion.value.clone()),
            (CriteriaType::Method, MatchType::Regex) => Matcher::Unconditional,
            (CriteriaType::Host, _) => Matcher::Host(cmp),
            (CriteriaType::Path, _) => Matcher::Path(cmp),
            (CriteriaType::Header, _) => Matcher::Header {
                key: criterion.key.clone(),
                cmp,
            },
            (CriteriaType::Body, _) => Matcher::Body(cmp),
            (CriteriaType::QueryParam, MatchType::Exact) if !criterion.values.is_empty() => {
                let mut values = criterion.values.clone();
                values.sort();
                Matcher::QueryParamAllOf {
                    key: criterion.key.clone(),
                    values,
                }
            }
            (CriteriaType::QueryParam, _) => Matcher::QueryParam {
                key: criterion.key.clone(),
                cmp,
            },
            (CriteriaType::Other(_), _) => Matcher::Unconditional,
        };

        Ok(Self {
            source: criterion.clone(),
            matcher,
        })
    }

    pub fn source(&self) -> &Criterion {
        &self.source
    }

    /// Evaluate against a request. Only a failed body read is an error.
    pub async fn matches(&self, req: &mut InterceptedRequest) -> Result<bool, MatchError> {
        let matched = match &self.matcher {
            Matcher::Method(expected) => req.method().as_str() == expected,
            Matcher::Host(cmp) => cmp.matches(&req.host()),
            Matcher::Path(cmp) => cmp.matches(req.path()),
            Matcher::Header { key, cmp } => cmp.matches(&req.header(key)),
            Matcher::Body(cmp) => {
                let body = req.body().await.map_err(MatchError::BodyRead)?;
                match cmp {
                    Comparison::Exact(expected) => expected.as_bytes() == body.as_ref(),
                    Comparison::Regex(regex) => regex.is_match(&String::from_utf8_lossy(&body)),
                }
            }
            Matcher::QueryParam { key, cmp } => cmp.matches(req.query_param(key).unwrap_or("")),
            Matcher::QueryParamAllOf { key, values } => {
                let mut actual = req.query_values(key);
                if actual.is_empty() {
                    return Ok(false);
                }
                actual.sort_unstable();
                actual.len() == values.len() && actual.iter().zip(values).all(|(a, b)| *a == b.as_str())
            }
            Matcher::Unconditional => {
                warn!(
                    criteria_type = %self.source.criteria_type,
                    match_type = ?self.source.match_type,
                    "criterion has no defined behaviour, matching unconditionally"
                );
                true
            }
        };
        Ok(matched)
    }
}
