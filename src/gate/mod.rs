//! HTTP request gate.
//!
//! The gate derives identities from each request, checks them against the
//! rate limiter in rule order, and either rejects the request with 429 or
//! passes it on to the protected application.

mod identity;
mod middleware;
mod response;
mod rules;
mod service;

pub use identity::{
    Identity, IdentityExtractor, IdentitySource, RequestMetadata, DEFAULT_FORWARDED_HEADER,
    DEFAULT_TOKEN_HEADER,
};
pub use middleware::throttle;
pub use response::{StoreUnavailableResponse, ThrottledResponse};
pub use rules::{default_rules, parse_header_name, Rule, RuleConfig, RuleHeaders, SourceKind};
pub use service::{FailurePolicy, Gate, GateDecision};
