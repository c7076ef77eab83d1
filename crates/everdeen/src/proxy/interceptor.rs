//! The per-request interception pipeline.

use super::client::HttpClient;
use super::forwarding::forward;
use super::response::{bad_gateway, no_match, synthesize};
use crate::body::ProxyBody;
use crate::expectation::{ExpectationEngine, InterceptedRequest};
use crate::recording::RequestStore;
use hyper::{Request, Response};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Outcome of running a request through the expectation list.
pub enum Interception {
    /// Answer the client with this response; nothing goes upstream.
    Respond(Response<ProxyBody>),
    /// A pass-through expectation matched; forward the request.
    PassThrough(InterceptedRequest),
}

/// Routes every proxied request through the expectations.
pub struct Interceptor {
    engine: Arc<ExpectationEngine>,
    store: Arc<RequestStore>,
    client: HttpClient,
}

impl Interceptor {
    pub fn new(engine: Arc<ExpectationEngine>, store: Arc<RequestStore>, client: HttpClient) -> Self {
        Self {
            engine,
            store,
            client,
        }
    }

    /// Match, record and answer a request.
    ///
    /// The expectation read lock is held until the response is built, which
    /// covers the store write. For pass-through it is released before the
    /// request goes upstream.
    pub async fn intercept(&self, mut req: InterceptedRequest) -> Interception {
        let view = self.engine.read().await;

        let expectation = match view.find_match(&mut req).await {
            Ok(Some(expectation)) => expectation,
            Ok(None) => {
                debug!(method = %req.method(), url = %req.url(), "No expectation matched");
                return Interception::Respond(no_match());
            }
            Err(e) => {
                warn!(method = %req.method(), url = %req.url(), "Matching failed: {e}");
                return Interception::Respond(bad_gateway(e));
            }
        };

        debug!(
            method = %req.method(),
            url = %req.url(),
            identity = %expectation.identity(),
            pass_through = expectation.pass_through(),
            "Expectation matched"
        );

        if expectation.store_matching_requests() {
            if let Err(e) = self.store.save(expectation.identity(), &mut req).await {
                error!(identity = %expectation.identity(), "Failed to record request: {e}");
                return Interception::Respond(bad_gateway(e));
            }
        }

        if expectation.pass_through() {
            drop(view);
            return Interception::PassThrough(req);
        }

        let response = synthesize(expectation.respond_with());
        drop(view);
        Interception::Respond(response)
    }

    /// Full pipeline for one request, including the upstream forward.
    pub async fn handle(&self, req: Request<ProxyBody>) -> Response<ProxyBody> {
        match self.intercept(InterceptedRequest::new(req)).await {
            Interception::Respond(response) => response,
            Interception::PassThrough(req) => forward(&self.client, req).await,
        }
    }
}
