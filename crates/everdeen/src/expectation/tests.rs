//! Tests for the expectation module.
//!
//! Covers:
//! - Wire format defaults and round trips
//! - Registration (all-or-nothing, identities)
//! - First-match selection, max matches and body buffering

use super::*;
use crate::body;
use http_body_util::BodyExt;
use hyper::Request;
use std::sync::Arc;
use uuid::Uuid;

fn get(uri: &str) -> InterceptedRequest {
    InterceptedRequest::new(
        Request::builder()
            .uri(uri)
            .header("host", "example.com")
            .body(body::empty())
            .unwrap(),
    )
}

fn post(uri: &str, payload: &'static str) -> InterceptedRequest {
    InterceptedRequest::new(
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("host", "example.com")
            .body(body::full(payload))
            .unwrap(),
    )
}

fn respond(status: u16, body: &str) -> RespondWith {
    RespondWith {
        status,
        body: body.to_string(),
        ..Default::default()
    }
}

fn expectation(criteria: Vec<Criterion>, status: u16) -> ExpectationDefinition {
    ExpectationDefinition {
        request_criteria: criteria,
        respond_with: respond(status, ""),
        ..Default::default()
    }
}

async fn matched_status(engine: &ExpectationEngine, req: &mut InterceptedRequest) -> Option<u16> {
    engine
        .read()
        .await
        .find_match(req)
        .await
        .unwrap()
        .map(|e| e.respond_with().status)
}

// ============================================================================
// Wire format
// ============================================================================

#[test]
fn test_definition_defaults() {
    let json = r#"{"request_criteria": [{"type": "path", "value": "/x"}]}"#;
    let def: ExpectationDefinition = serde_json::from_str(json).unwrap();
    assert_eq!(def.respond_with.status, 200);
    assert_eq!(def.respond_with.body_encoding, BodyEncoding::None);
    assert_eq!(def.max_matches, 0);
    assert!(!def.pass_through);
    assert!(!def.store_matching_requests);
    assert!(def.uuid.is_none());
    assert_eq!(def.request_criteria[0].match_type, MatchType::Exact);
}

#[test]
fn test_definition_full() {
    let json = r#"{
        "request_criteria": [
            {"type": "header", "key": "X-Api", "match_type": "regex", "value": "^v[0-9]$"},
            {"type": "query_param", "key": "name", "match_type": "", "values": ["Jack", "Sally"]}
        ],
        "respond_with": {
            "status": 201,
            "headers": {"Content-Type": "text/plain"},
            "body": "SGVsbG8gV29ybGQ=",
            "body_encoding": "base64"
        },
        "max_matches": 2,
        "pass_through": false,
        "store_matching_requests": true
    }"#;
    let def: ExpectationDefinition = serde_json::from_str(json).unwrap();
    assert_eq!(def.request_criteria[0].criteria_type, CriteriaType::Header);
    assert_eq!(def.request_criteria[0].match_type, MatchType::Regex);
    assert_eq!(def.request_criteria[1].criteria_type, CriteriaType::QueryParam);
    assert_eq!(def.request_criteria[1].match_type, MatchType::Exact);
    assert_eq!(def.request_criteria[1].values, vec!["Jack", "Sally"]);
    assert_eq!(def.respond_with.body_encoding, BodyEncoding::Base64);
    assert_eq!(def.max_matches, 2);
    assert!(def.store_matching_requests);
}

#[test]
fn test_body_encoding_none_alias() {
    let rw: RespondWith = serde_json::from_str(r#"{"body_encoding": "none"}"#).unwrap();
    assert_eq!(rw.body_encoding, BodyEncoding::None);
    let rw: RespondWith = serde_json::from_str(r#"{"body_encoding": ""}"#).unwrap();
    assert_eq!(rw.body_encoding, BodyEncoding::None);
}

#[test]
fn test_unknown_match_type_rejected() {
    let json = r#"{"type": "path", "match_type": "fuzzy", "value": "/x"}"#;
    assert!(serde_json::from_str::<Criterion>(json).is_err());
}

#[test]
fn test_unknown_criteria_type_round_trips() {
    let json = r#"{"type": "cookie", "value": "x"}"#;
    let criterion: Criterion = serde_json::from_str(json).unwrap();
    assert_eq!(criterion.criteria_type, CriteriaType::Other("cookie".into()));
    let out = serde_json::to_value(&criterion).unwrap();
    assert_eq!(out["type"], "cookie");
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_register_assigns_identities() {
    let engine = ExpectationEngine::new();
    let registered = engine
        .register(vec![expectation(vec![], 200), expectation(vec![], 201)])
        .await
        .unwrap();
    assert_eq!(registered.len(), 2);
    assert_ne!(registered[0].identity(), registered[1].identity());

    let defs = engine.read().await.definitions();
    assert_eq!(defs[0].uuid, Some(registered[0].identity()));
    assert_eq!(defs[1].respond_with.status, 201);
}

#[tokio::test]
async fn test_register_invalid_regex_rejects_batch() {
    let engine = ExpectationEngine::new();
    let good = expectation(vec![Criterion::exact(CriteriaType::Path, "/ok")], 200);
    let bad = expectation(
        vec![
            Criterion::exact(CriteriaType::Method, "GET"),
            Criterion::regex(CriteriaType::Path, "(unclosed"),
        ],
        200,
    );

    let err = engine.register(vec![good, bad]).await.unwrap_err();
    match err {
        RegistrationError::InvalidRegex {
            expectation,
            criterion,
            value,
            ..
        } => {
            assert_eq!(expectation, 1);
            assert_eq!(criterion, 1);
            assert_eq!(value, "(unclosed");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(engine.is_empty().await);
}

#[tokio::test]
async fn test_register_invalid_status_rejected() {
    let engine = ExpectationEngine::new();
    let err = engine
        .register(vec![expectation(vec![], 42)])
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::InvalidStatus { status: 42, .. }));

    // Pass-through expectations never synthesize a response.
    let pass = ExpectationDefinition {
        pass_through: true,
        respond_with: respond(0, ""),
        ..Default::default()
    };
    assert!(engine.register(vec![pass]).await.is_ok());
}

#[tokio::test]
async fn test_register_explicit_identity_conflict() {
    let engine = ExpectationEngine::new();
    let id = Uuid::new_v4();
    let with_id = ExpectationDefinition {
        uuid: Some(id),
        ..Default::default()
    };

    let registered = engine.register(vec![with_id.clone()]).await.unwrap();
    assert_eq!(registered[0].identity(), id);

    let err = engine.register(vec![with_id.clone()]).await.unwrap_err();
    assert!(matches!(err, RegistrationError::IdentityConflict(conflict) if conflict == id));

    let other = Uuid::new_v4();
    let dup = ExpectationDefinition {
        uuid: Some(other),
        ..Default::default()
    };
    let err = engine.register(vec![dup.clone(), dup]).await.unwrap_err();
    assert!(matches!(err, RegistrationError::IdentityConflict(conflict) if conflict == other));
    assert_eq!(engine.len().await, 1);
}

#[tokio::test]
async fn test_register_ignores_client_match_count() {
    let engine = ExpectationEngine::new();
    let def = ExpectationDefinition {
        matches: 99,
        ..Default::default()
    };
    let registered = engine.register(vec![def]).await.unwrap();
    assert_eq!(registered[0].match_count(), 0);
}

// ============================================================================
// Matching
// ============================================================================

#[tokio::test]
async fn test_first_match_wins_in_registration_order() {
    let engine = ExpectationEngine::new();
    engine
        .register(vec![
            expectation(vec![Criterion::exact(CriteriaType::Path, "/a")], 201),
            expectation(vec![Criterion::regex(CriteriaType::Path, "^/")], 202),
            expectation(vec![], 203),
        ])
        .await
        .unwrap();

    assert_eq!(matched_status(&engine, &mut get("/a")).await, Some(201));
    assert_eq!(matched_status(&engine, &mut get("/b")).await, Some(202));
}

#[tokio::test]
async fn test_empty_criteria_matches_anything() {
    let engine = ExpectationEngine::new();
    engine.register(vec![expectation(vec![], 200)]).await.unwrap();
    assert_eq!(
        matched_status(&engine, &mut post("/anything?x=1", "body")).await,
        Some(200)
    );
}

#[tokio::test]
async fn test_no_match() {
    let engine = ExpectationEngine::new();
    engine
        .register(vec![expectation(
            vec![Criterion::exact(CriteriaType::Method, "DELETE")],
            204,
        )])
        .await
        .unwrap();
    assert_eq!(matched_status(&engine, &mut get("/")).await, None);
}

#[tokio::test]
async fn test_max_matches_falls_through() {
    let engine = ExpectationEngine::new();
    let capped = ExpectationDefinition {
        max_matches: 2,
        ..expectation(vec![Criterion::exact(CriteriaType::Path, "/limited")], 200)
    };
    let fallback = expectation(vec![], 418);
    engine.register(vec![capped, fallback]).await.unwrap();

    assert_eq!(matched_status(&engine, &mut get("/limited")).await, Some(200));
    assert_eq!(matched_status(&engine, &mut get("/limited")).await, Some(200));
    assert_eq!(matched_status(&engine, &mut get("/limited")).await, Some(418));

    let view = engine.read().await;
    let counts: Vec<u64> = view.iter().map(|e| e.match_count()).collect();
    assert_eq!(counts, vec![2, 1]);
}

#[tokio::test]
async fn test_conflicting_criteria_on_same_key_are_anded() {
    let engine = ExpectationEngine::new();
    engine
        .register(vec![expectation(
            vec![
                Criterion::exact(CriteriaType::Header, "v2").with_key("X-Version"),
                Criterion::regex(CriteriaType::Header, "^v[0-9]$").with_key("X-Version"),
            ],
            200,
        )])
        .await
        .unwrap();

    let mut v2 = InterceptedRequest::new(
        Request::builder()
            .uri("/")
            .header("x-version", "v2")
            .body(body::empty())
            .unwrap(),
    );
    let mut v3 = InterceptedRequest::new(
        Request::builder()
            .uri("/")
            .header("x-version", "v3")
            .body(body::empty())
            .unwrap(),
    );
    assert_eq!(matched_status(&engine, &mut v2).await, Some(200));
    assert_eq!(matched_status(&engine, &mut v3).await, None);
}

#[tokio::test]
async fn test_body_survives_multiple_inspections() {
    let engine = ExpectationEngine::new();
    engine
        .register(vec![
            expectation(vec![Criterion::exact(CriteriaType::Body, "nope")], 400),
            expectation(vec![Criterion::regex(CriteriaType::Body, "^hel")], 401),
            expectation(
                vec![
                    Criterion::regex(CriteriaType::Body, "lo$"),
                    Criterion::exact(CriteriaType::Body, "hello"),
                ],
                200,
            ),
        ])
        .await
        .unwrap();

    // The first expectation consumes the body and rejects; later ones still see it.
    let mut req = post("/", "hello");
    assert_eq!(matched_status(&engine, &mut req).await, Some(401));
    assert_eq!(req.body().await.unwrap(), "hello");

    let forwarded = req.into_request();
    let bytes = forwarded.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes, "hello");
}

#[tokio::test]
async fn test_exhausted_expectation_skips_criteria() {
    let engine = ExpectationEngine::new();
    let capped = ExpectationDefinition {
        max_matches: 1,
        ..expectation(vec![Criterion::exact(CriteriaType::Body, "x")], 200)
    };
    engine.register(vec![capped]).await.unwrap();

    let mut first = post("/", "x");
    assert_eq!(matched_status(&engine, &mut first).await, Some(200));

    let view = engine.read().await;
    assert!(view.iter().all(|e| e.is_exhausted()));
    let mut second = post("/", "x");
    assert!(view.find_match(&mut second).await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_matches_never_exceed_cap() {
    let engine = Arc::new(ExpectationEngine::new());
    let capped = ExpectationDefinition {
        max_matches: 5,
        ..expectation(vec![], 200)
    };
    engine.register(vec![capped]).await.unwrap();

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let mut req = get("/");
                engine.read().await.find_match(&mut req).await.unwrap().is_some()
            })
        })
        .collect();

    let mut matched = 0;
    for handle in handles {
        if handle.await.unwrap() {
            matched += 1;
        }
    }
    assert_eq!(matched, 5);
    assert_eq!(engine.read().await.definitions()[0].matches, 5);
}

#[tokio::test]
async fn test_get_by_identity() {
    let engine = ExpectationEngine::new();
    let registered = engine.register(vec![expectation(vec![], 200)]).await.unwrap();
    let view = engine.read().await;
    assert!(view.get(&registered[0].identity()).is_some());
    assert!(view.get(&Uuid::new_v4()).is_none());
}
