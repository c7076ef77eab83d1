//! Expectation registration and request matching.
//!
//! ## Module Structure
//!
//! - `types`: Wire types accepted and returned by the control API, plus errors
//! - `criterion`: Compiled per-dimension predicates (exact / regex)
//! - `request`: The buffered request view criteria evaluate against
//! - `engine`: The ordered expectation list and first-match selection

mod criterion;
mod engine;
mod request;
mod types;

#[cfg(test)]
mod tests;

pub use criterion::{CompiledCriterion, Comparison, Matcher};
pub use engine::{Expectation, ExpectationEngine, ExpectationsView};
pub use request::{canonical_header_name, InterceptedRequest};
pub use types::{
    BodyEncoding, CreateExpectationsRequest, CriteriaType, Criterion, ExpectationDefinition,
    MatchError, MatchType, RegistrationError, RespondWith,
};
