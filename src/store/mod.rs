//! Counter store adapters.
//!
//! The rate limiter never owns counter state itself. Counters live in an
//! external key-value store reached through [`CounterStore`], and stores that
//! can run the whole check-and-count transition in one step also implement
//! [`AtomicCounter`].

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::{RedisStore, RedisStoreConfig};

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::ratelimit::Decision;

/// Primitive operations on expiring integer counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current value for `key`, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<u64>>;

    /// Overwrite `key` with `value` and start its expiry countdown.
    async fn set_with_expiry(&self, key: &str, value: u64, ttl: Duration) -> Result<()>;

    /// Add one to `key` without touching its expiry. Returns the new value.
    async fn increment(&self, key: &str) -> Result<u64>;

    /// Remaining lifetime of `key`, or `None` when absent or without expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;
}

/// Result of one check-and-count transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub decision: Decision,
    /// Counter value after the transition.
    pub count: u64,
}

/// A store-side check-and-increment.
///
/// Semantics: an absent key is created with value 1 and expiry `window`; a
/// value below `limit` is incremented without touching the expiry; a value at
/// or above `limit` is left alone and the request denied.
#[async_trait]
pub trait AtomicCounter: Send + Sync {
    async fn check_and_increment(&self, key: &str, limit: u64, window: Duration)
        -> Result<Admission>;
}
