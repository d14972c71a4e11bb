//! Ordered rate limit rules.
//!
//! A rule pairs an identity source with the policy applied to identifiers
//! from that source. Rules are evaluated in order and the first denial wins.

use axum::http::HeaderName;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::identity::{IdentityExtractor, IdentitySource};
use crate::error::{FloodgateError, Result};
use crate::ratelimit::Policy;

/// A compiled rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub source: IdentitySource,
    pub policy: Policy,
}

impl Rule {
    pub fn new(source: IdentitySource, policy: Policy) -> Self {
        Self { source, policy }
    }
}

/// The address rule followed by the token rule, both under `policy`.
pub fn default_rules(extractor: &IdentityExtractor, policy: Policy) -> Vec<Rule> {
    extractor
        .sources()
        .into_iter()
        .map(|source| Rule::new(source, policy))
        .collect()
}

/// Kind of identity a configured rule reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    ClientAddress,
    Header,
}

/// A rule as written in configuration.
///
/// Missing `limit` and `window_secs` inherit the top-level values; a header
/// rule without `name` reads the configured token header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub source: SourceKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub window_secs: Option<u64>,
}

impl RuleConfig {
    /// Validate and compile against the inherited defaults.
    pub fn compile(&self, defaults: &Policy, headers: &RuleHeaders) -> Result<Rule> {
        let source = match self.source {
            SourceKind::ClientAddress => IdentitySource::ClientAddress {
                forwarded_header: headers.forwarded.clone(),
            },
            SourceKind::Header => {
                let name = match &self.name {
                    Some(name) => parse_header_name(name)?,
                    None => headers.token.clone(),
                };
                IdentitySource::Header { name }
            }
        };

        let limit = self.limit.unwrap_or(defaults.limit());
        let window = self
            .window_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.window());

        Ok(Rule::new(source, Policy::new(limit, window)?))
    }
}

/// Header names a configured rule falls back to.
#[derive(Debug, Clone)]
pub struct RuleHeaders {
    pub forwarded: HeaderName,
    pub token: HeaderName,
}

/// Parse a configured header name, e.g. `"Authorization"`.
pub fn parse_header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| FloodgateError::Config(format!("Invalid header name {:?}: {}", name, e)))
}
