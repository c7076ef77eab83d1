//! The ordered expectation list and first-match selection.

use super::criterion::CompiledCriterion;
use super::request::InterceptedRequest;
use super::types::{ExpectationDefinition, MatchError, RegistrationError, RespondWith};
use hyper::header::{HeaderName, HeaderValue};
use hyper::StatusCode;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info};
use uuid::Uuid;

/// A registered expectation.
///
/// Immutable after registration apart from its match counter, which has its
/// own lock so bookkeeping never contends with the list lock.
#[derive(Debug)]
pub struct Expectation {
    identity: Uuid,
    criteria: Vec<CompiledCriterion>,
    respond_with: RespondWith,
    max_matches: u64,
    pass_through: bool,
    store_matching_requests: bool,
    matches: Mutex<u64>,
}

impl Expectation {
    /// Validate and compile a definition. `index` is the position in the
    /// submitted batch, used in error messages.
    fn compile(index: usize, def: ExpectationDefinition) -> Result<Self, RegistrationError> {
        let criteria = def
            .request_criteria
            .iter()
            .enumerate()
            .map(|(criterion, c)| {
                CompiledCriterion::compile(c).map_err(|source| RegistrationError::InvalidRegex {
                    expectation: index,
                    criterion,
                    value: c.value.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if !def.pass_through {
            validate_response(index, &def.respond_with)?;
        }

        Ok(Self {
            identity: def.uuid.unwrap_or_else(Uuid::new_v4),
            criteria,
            respond_with: def.respond_with,
            max_matches: def.max_matches,
            pass_through: def.pass_through,
            store_matching_requests: def.store_matching_requests,
            matches: Mutex::new(0),
        })
    }

    pub fn identity(&self) -> Uuid {
        self.identity
    }

    pub fn respond_with(&self) -> &RespondWith {
        &self.respond_with
    }

    pub fn pass_through(&self) -> bool {
        self.pass_through
    }

    pub fn store_matching_requests(&self) -> bool {
        self.store_matching_requests
    }

    pub fn match_count(&self) -> u64 {
        *self.matches.lock()
    }

    /// True once a capped expectation has fired `max_matches` times.
    pub fn is_exhausted(&self) -> bool {
        self.max_matches > 0 && *self.matches.lock() >= self.max_matches
    }

    /// Record one match, unless the cap was reached in the meantime.
    pub fn try_claim(&self) -> bool {
        let mut matches = self.matches.lock();
        if self.max_matches > 0 && *matches >= self.max_matches {
            return false;
        }
        *matches += 1;
        true
    }

    /// Wire form including the assigned identity and current match count.
    pub fn to_definition(&self) -> ExpectationDefinition {
        ExpectationDefinition {
            request_criteria: self.criteria.iter().map(|c| c.source().clone()).collect(),
            respond_with: self.respond_with.clone(),
            max_matches: self.max_matches,
            pass_through: self.pass_through,
            store_matching_requests: self.store_matching_requests,
            uuid: Some(self.identity),
            matches: self.match_count(),
        }
    }

    async fn criteria_match(&self, req: &mut InterceptedRequest) -> Result<bool, MatchError> {
        for criterion in &self.criteria {
            if !criterion.matches(req).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn validate_response(index: usize, respond_with: &RespondWith) -> Result<(), RegistrationError> {
    StatusCode::from_u16(respond_with.status).map_err(|_| RegistrationError::InvalidStatus {
        expectation: index,
        status: respond_with.status,
    })?;
    for (name, value) in &respond_with.headers {
        let valid = HeaderName::from_bytes(name.as_bytes()).is_ok()
            && HeaderValue::from_str(value).is_ok();
        if !valid {
            return Err(RegistrationError::InvalidHeader {
                expectation: index,
                name: name.clone(),
            });
        }
    }
    Ok(())
}

/// Ordered collection of expectations behind a single reader/writer lock.
#[derive(Debug, Default)]
pub struct ExpectationEngine {
    expectations: RwLock<Vec<Arc<Expectation>>>,
}

impl ExpectationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a batch, all or nothing, appending in submission order.
    pub async fn register(
        &self,
        definitions: Vec<ExpectationDefinition>,
    ) -> Result<Vec<Arc<Expectation>>, RegistrationError> {
        let compiled = definitions
            .into_iter()
            .enumerate()
            .map(|(index, def)| Expectation::compile(index, def).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = HashSet::new();
        for expectation in &compiled {
            if !seen.insert(expectation.identity) {
                return Err(RegistrationError::IdentityConflict(expectation.identity));
            }
        }

        let mut expectations = self.expectations.write().await;
        if let Some(existing) = expectations.iter().find(|e| seen.contains(&e.identity)) {
            return Err(RegistrationError::IdentityConflict(existing.identity));
        }
        expectations.extend(compiled.iter().cloned());

        info!(
            count = compiled.len(),
            total = expectations.len(),
            "Registered expectations"
        );
        Ok(compiled)
    }

    /// Take the list read lock. Matching and listing happen through the
    /// returned view; registration waits until it is dropped.
    pub async fn read(&self) -> ExpectationsView<'_> {
        ExpectationsView {
            expectations: self.expectations.read().await,
        }
    }

    pub async fn len(&self) -> usize {
        self.expectations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.expectations.read().await.is_empty()
    }
}

/// Read-locked view of the expectation list.
pub struct ExpectationsView<'a> {
    expectations: RwLockReadGuard<'a, Vec<Arc<Expectation>>>,
}

impl ExpectationsView<'_> {
    /// First expectation, in registration order, whose criteria all pass and
    /// that still has a match left. The winner's counter is incremented.
    pub async fn find_match(
        &self,
        req: &mut InterceptedRequest,
    ) -> Result<Option<Arc<Expectation>>, MatchError> {
        for expectation in self.expectations.iter() {
            if expectation.is_exhausted() {
                continue;
            }
            if !expectation.criteria_match(req).await? {
                continue;
            }
            if expectation.try_claim() {
                return Ok(Some(Arc::clone(expectation)));
            }
            debug!(
                identity = %expectation.identity,
                "Expectation exhausted by a concurrent request"
            );
        }
        Ok(None)
    }

    pub fn get(&self, identity: &Uuid) -> Option<&Arc<Expectation>> {
        self.expectations.iter().find(|e| &e.identity == identity)
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<Expectation>> {
        self.expectations.iter()
    }

    pub fn definitions(&self) -> Vec<ExpectationDefinition> {
        self.expectations.iter().map(|e| e.to_definition()).collect()
    }
}
