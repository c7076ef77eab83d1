//! Expectation handlers: create, list, recorded requests.

use crate::admin_api::server::AdminState;
use crate::admin_api::types::*;
use crate::expectation::{CreateExpectationsRequest, ExpectationDefinition, RegistrationError};
use crate::recording::RecordedRequests;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use tracing::{error, info, warn};
use uuid::Uuid;

/// POST /expectations - register a batch, all or nothing
pub async fn handle_create(req: Request<Incoming>, state: &AdminState) -> Response<Full<Bytes>> {
    let body = match collect_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
    };

    let request: CreateExpectationsRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Invalid expectations JSON: {e}"),
            )
        }
    };

    match state.engine.register(request.expectations).await {
        Ok(registered) => {
            info!("Created {} expectations", registered.len());
            let definitions: Vec<ExpectationDefinition> =
                registered.iter().map(|e| e.to_definition()).collect();
            json_response(StatusCode::OK, &definitions)
        }
        Err(e @ RegistrationError::IdentityConflict(_)) => {
            warn!("Rejected expectations: {e}");
            error_response(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string())
        }
        Err(e) => {
            warn!("Rejected expectations: {e}");
            error_response(StatusCode::BAD_REQUEST, &e.to_string())
        }
    }
}

/// GET /expectations - every expectation with its current match count
pub async fn handle_list(state: &AdminState) -> Response<Full<Bytes>> {
    let definitions = state.engine.read().await.definitions();
    json_response(StatusCode::OK, &definitions)
}

/// GET /expectations/:uuid/requests
pub async fn handle_requests(identity: &str, state: &AdminState) -> Response<Full<Bytes>> {
    let Ok(identity) = Uuid::parse_str(identity) else {
        return not_found();
    };

    let known = state.engine.read().await.get(&identity).is_some();
    if !known {
        return not_found();
    }

    match state.store.find(identity).await {
        Ok(requests) => json_response(StatusCode::OK, &RecordedRequests { requests }),
        Err(e) => {
            error!(identity = %identity, "Failed to read recorded requests: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}
