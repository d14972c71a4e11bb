//! In-process counter store.
//!
//! Keeps the same contract as an external store (values with an expiry
//! deadline that vanish once it passes) so it can stand in for Redis in
//! tests and single-node deployments.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{Admission, AtomicCounter, CounterStore};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::ratelimit::Decision;

/// Number of new windows opened between sweeps of expired records.
const DEFAULT_SWEEP_EVERY: u64 = 1024;

/// A counter value and the instant it stops existing.
#[derive(Debug, Clone, Copy)]
struct Record {
    value: u64,
    expires_at: Option<Instant>,
}

impl Record {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }
}

/// Expiring counters held in a sharded map.
///
/// Expired records are invisible to lookups straight away and are dropped
/// from the map by a sweep that runs every `sweep_every` window starts, so
/// memory tracks the identifiers seen in recent windows.
#[derive(Clone)]
pub struct MemoryStore {
    records: Arc<DashMap<String, Record>>,
    clock: Arc<dyn Clock>,
    /// Window starts since the last sweep
    writes: Arc<AtomicU64>,
    sweep_every: u64,
}

impl MemoryStore {
    /// Create a store that reads time from the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store with an injected clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            clock,
            writes: Arc::new(AtomicU64::new(0)),
            sweep_every: DEFAULT_SWEEP_EVERY,
        }
    }

    /// Sweep expired records after every `writes` window starts.
    pub fn with_sweep_every(mut self, writes: u64) -> Self {
        self.sweep_every = writes.max(1);
        self
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.records.iter().filter(|r| r.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of records held, including expired ones not yet swept.
    pub fn stored(&self) -> usize {
        self.records.len()
    }

    /// Drop records whose expiry has passed.
    ///
    /// Lookups already ignore expired records; this only reclaims memory.
    pub fn purge_expired(&self) {
        let now = self.clock.now();
        self.records.retain(|_, record| record.is_live(now));
    }

    /// Deadline for a window opened now. A window past the clock's range
    /// never expires.
    fn deadline(&self, now: Instant, ttl: Duration) -> Option<Instant> {
        now.checked_add(ttl)
    }

    /// Count a window start and sweep when due. Must not be called while an
    /// entry guard is held, since the sweep locks every shard.
    fn note_write(&self) {
        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % self.sweep_every == 0 {
            self.purge_expired();
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("records", &self.records.len())
            .field("sweep_every", &self.sweep_every)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<u64>> {
        let now = self.clock.now();
        Ok(self
            .records
            .get(key)
            .filter(|record| record.is_live(now))
            .map(|record| record.value))
    }

    async fn set_with_expiry(&self, key: &str, value: u64, ttl: Duration) -> Result<()> {
        let now = self.clock.now();
        let expires_at = self.deadline(now, ttl);
        self.records
            .insert(key.to_string(), Record { value, expires_at });
        self.note_write();
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<u64> {
        let now = self.clock.now();
        let value = {
            let mut record = self.records.entry(key.to_string()).or_insert(Record {
                value: 0,
                expires_at: None,
            });
            // Matches INCR on an expired key: it starts again from zero with no expiry.
            if !record.is_live(now) {
                *record = Record {
                    value: 0,
                    expires_at: None,
                };
            }
            record.value += 1;
            record.value
        };
        if value == 1 {
            self.note_write();
        }
        Ok(value)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = self.clock.now();
        Ok(self
            .records
            .get(key)
            .filter(|record| record.is_live(now))
            .and_then(|record| record.expires_at)
            .map(|deadline| deadline.saturating_duration_since(now)))
    }
}

#[async_trait]
impl AtomicCounter for MemoryStore {
    async fn check_and_increment(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<Admission> {
        let now = self.clock.now();

        // The entry guard holds the shard lock for the whole transition.
        let admission = match self.records.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().is_live(now) => {
                let record = occupied.get_mut();
                if record.value < limit {
                    record.value += 1;
                    Admission {
                        decision: Decision::Allow,
                        count: record.value,
                    }
                } else {
                    Admission {
                        decision: Decision::Deny,
                        count: record.value,
                    }
                }
            }
            Entry::Occupied(mut occupied) => {
                occupied.insert(Record {
                    value: 1,
                    expires_at: self.deadline(now, window),
                });
                Admission {
                    decision: Decision::Allow,
                    count: 1,
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Record {
                    value: 1,
                    expires_at: self.deadline(now, window),
                });
                Admission {
                    decision: Decision::Allow,
                    count: 1,
                }
            }
        };

        if admission.decision == Decision::Allow && admission.count == 1 {
            self.note_write();
        }
        Ok(admission)
    }
}
