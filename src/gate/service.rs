//! The gate: per-request orchestration of identity rules and the limiter.

use axum::http::Request;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, instrument, trace, warn};

use super::identity::RequestMetadata;
use super::response::{StoreUnavailableResponse, ThrottledResponse};
use super::rules::Rule;
use crate::error::Result;
use crate::ratelimit::{Decision, RateLimiter};

/// What the gate does when the counter store cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Admit the request unchecked
    Open,
    /// Reject the request with 503
    Closed,
}

/// Result of running a request through the rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Every applicable rule allowed the request, or none applied.
    Forward,
    /// The rule at this index denied the request.
    Throttled { rule: usize },
}

/// Applies an ordered list of rules to each request.
///
/// The gate keeps no per-request state; all counting happens in the store
/// behind the limiter, so a single gate is shared by every connection.
pub struct Gate {
    limiter: RateLimiter,
    rules: Vec<Rule>,
    failure_policy: FailurePolicy,
}

impl Gate {
    /// Create a gate. The failure policy has no default and must be chosen
    /// by the caller.
    pub fn new(limiter: RateLimiter, rules: Vec<Rule>, failure_policy: FailurePolicy) -> Self {
        Self {
            limiter,
            rules,
            failure_policy,
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Evaluate the rules in order, stopping at the first denial.
    ///
    /// Rules whose identity is missing from the request are skipped, and
    /// rules after a denial are not evaluated, so their counters are not
    /// touched.
    pub async fn check(&self, meta: &RequestMetadata<'_>) -> Result<GateDecision> {
        for (index, rule) in self.rules.iter().enumerate() {
            let Some(identifier) = rule.source.extract(meta) else {
                trace!(rule = %rule.source, "No identity for rule, skipping");
                continue;
            };

            if self.limiter.evaluate(&identifier, &rule.policy).await? == Decision::Deny {
                if rule.source.is_credential() {
                    debug!(rule = %rule.source, "Request throttled");
                } else {
                    debug!(rule = %rule.source, identifier = %identifier, "Request throttled");
                }
                return Ok(GateDecision::Throttled { rule: index });
            }
        }

        Ok(GateDecision::Forward)
    }

    /// Run `request` through the rules and either reject it or hand it to
    /// `downstream`, returning the downstream response unchanged.
    #[instrument(
        skip_all,
        fields(method = %request.method(), path = %request.uri().path())
    )]
    pub async fn handle<B, F, Fut>(&self, request: Request<B>, downstream: F) -> Response
    where
        F: FnOnce(Request<B>) -> Fut,
        Fut: Future<Output = Response>,
    {
        let outcome = {
            let meta = RequestMetadata::from_request(&request);
            self.check(&meta).await
        };

        match outcome {
            Ok(GateDecision::Forward) => downstream(request).await,
            Ok(GateDecision::Throttled { .. }) => ThrottledResponse.into_response(),
            Err(err) => match self.failure_policy {
                FailurePolicy::Open => {
                    warn!(error = %err, "Rate limit check failed, admitting request");
                    downstream(request).await
                }
                FailurePolicy::Closed => {
                    warn!(error = %err, "Rate limit check failed, rejecting request");
                    StoreUnavailableResponse.into_response()
                }
            },
        }
    }
}
