//! Rate limit policies and decisions.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{FloodgateError, Result};

/// Default number of requests admitted per window.
pub const DEFAULT_LIMIT: u64 = 100;
/// Default window length in seconds.
pub const DEFAULT_WINDOW_SECS: u64 = 60;
/// Longest window a store can express as a millisecond expiry.
pub const MAX_WINDOW: Duration = Duration::from_millis(i64::MAX as u64);

/// A validated quota: at most `limit` requests per `window`.
///
/// The window starts with the first request for an identifier and is not
/// aligned to wall-clock boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    limit: u64,
    window: Duration,
}

impl Policy {
    /// Create a policy, rejecting a zero limit or a window that is empty or
    /// longer than [`MAX_WINDOW`].
    pub fn new(limit: u64, window: Duration) -> Result<Self> {
        if limit < 1 {
            return Err(FloodgateError::MalformedPolicy(
                "limit must be at least 1".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(FloodgateError::MalformedPolicy(
                "window must be longer than zero".to_string(),
            ));
        }
        if window > MAX_WINDOW {
            return Err(FloodgateError::MalformedPolicy(format!(
                "window must be at most {} ms",
                MAX_WINDOW.as_millis()
            )));
        }
        Ok(Self { limit, window })
    }

    /// Convenience constructor for whole-second windows.
    pub fn per_seconds(limit: u64, window_secs: u64) -> Result<Self> {
        Self::new(limit, Duration::from_secs(window_secs))
    }

    /// Maximum requests admitted in one window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Length of a window.
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
        }
    }
}

/// Outcome of evaluating one identifier against one policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// How strictly the limit is enforced under concurrent requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    /// Separate read and write round trips. Racing requests for the same
    /// identifier may all be admitted, overshooting the limit.
    #[default]
    Approximate,
    /// The read, compare and write happen as a single store-side operation.
    Strict,
}
