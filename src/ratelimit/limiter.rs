//! Core rate limit decision engine.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::policy::{Decision, Enforcement, Policy};
use crate::error::{FloodgateError, Result};
use crate::store::{Admission, AtomicCounter, CounterStore};

/// Check-and-count built from separate store round trips.
///
/// Between the read and the write another request for the same key can read
/// the same value, so concurrent requests may all be admitted past the limit.
pub struct TwoStepCounter<S: CounterStore + ?Sized> {
    store: Arc<S>,
}

impl<S: CounterStore + ?Sized> TwoStepCounter<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: CounterStore + ?Sized> AtomicCounter for TwoStepCounter<S> {
    async fn check_and_increment(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<Admission> {
        match self.store.get(key).await? {
            None => {
                self.store.set_with_expiry(key, 1, window).await?;
                Ok(Admission {
                    decision: Decision::Allow,
                    count: 1,
                })
            }
            Some(current) if current < limit => {
                let count = self.store.increment(key).await?;
                if count == 1 {
                    // The key expired after the read, so the increment created
                    // it without an expiry. Treat it as the start of a new window.
                    self.store.set_with_expiry(key, 1, window).await?;
                }
                Ok(Admission {
                    decision: Decision::Allow,
                    count,
                })
            }
            Some(current) => Ok(Admission {
                decision: Decision::Deny,
                count: current,
            }),
        }
    }
}

/// Decides whether a request for an identifier fits its policy.
///
/// Holds no counter state of its own; every decision is a transition on the
/// counter store, so one limiter can be shared by all concurrent requests.
#[derive(Clone)]
pub struct RateLimiter {
    /// Performs the check-and-count transition
    counter: Arc<dyn AtomicCounter>,
    /// Plain store access for reading counters back
    store: Arc<dyn CounterStore>,
    /// Prepended to every identifier to form the counter key
    key_prefix: String,
    enforcement: Enforcement,
}

impl RateLimiter {
    /// Create a limiter over a store that supports both access paths.
    pub fn new<S>(store: Arc<S>, enforcement: Enforcement) -> Self
    where
        S: CounterStore + AtomicCounter + 'static,
    {
        let counter: Arc<dyn AtomicCounter> = match enforcement {
            Enforcement::Strict => store.clone(),
            Enforcement::Approximate => Arc::new(TwoStepCounter::new(store.clone())),
        };

        Self {
            counter,
            store,
            key_prefix: String::new(),
            enforcement,
        }
    }

    /// Create a limiter over a store without an atomic path.
    pub fn approximate<S>(store: Arc<S>) -> Self
    where
        S: CounterStore + 'static,
    {
        Self {
            counter: Arc::new(TwoStepCounter::new(store.clone())),
            store,
            key_prefix: String::new(),
            enforcement: Enforcement::Approximate,
        }
    }

    /// Namespace counter keys, e.g. `"floodgate:"`.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn enforcement(&self) -> Enforcement {
        self.enforcement
    }

    /// Evaluate one request for `identifier` against `policy`.
    ///
    /// The first request of a window creates the counter with value 1 and an
    /// expiry of `policy.window()`. Later requests increment it while it is
    /// below the limit. Once the limit is reached requests are denied and the
    /// counter is left unchanged, so denials neither consume quota nor extend
    /// the window.
    pub async fn evaluate(&self, identifier: &str, policy: &Policy) -> Result<Decision> {
        let key = self.key(identifier)?;

        trace!(limit = policy.limit(), window = ?policy.window(), "Evaluating rate limit");

        let admission = self
            .counter
            .check_and_increment(&key, policy.limit(), policy.window())
            .await?;

        match admission.decision {
            Decision::Allow if admission.count == 1 => {
                debug!(window = ?policy.window(), "Started new rate limit window");
            }
            Decision::Allow => {}
            Decision::Deny => {
                debug!(
                    count = admission.count,
                    limit = policy.limit(),
                    "Rate limit exceeded"
                );
            }
        }

        Ok(admission.decision)
    }

    /// Current counter value for `identifier`, `None` if no window is open.
    pub async fn count(&self, identifier: &str) -> Result<Option<u64>> {
        let key = self.key(identifier)?;
        self.store.get(&key).await
    }

    /// Time left in the open window for `identifier`.
    pub async fn time_to_reset(&self, identifier: &str) -> Result<Option<Duration>> {
        let key = self.key(identifier)?;
        self.store.ttl(&key).await
    }

    fn key(&self, identifier: &str) -> Result<String> {
        if identifier.is_empty() {
            return Err(FloodgateError::InvalidIdentifier);
        }
        Ok(format!("{}{}", self.key_prefix, identifier))
    }
}
