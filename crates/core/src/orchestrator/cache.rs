//! TTL + capacity bounded session cache.
//!
//! Recency is write order: `insert` stamps the entry, `get` does not. When a
//! new id arrives at capacity, the entry with the oldest stamp is evicted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use psp_shared::StoredSession;

/// Time source for cache expiry.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    data: StoredSession,
    stamped: Instant,
    // Tie-break for entries stamped at the same instant.
    seq: u64,
}

#[derive(Debug, Default)]
struct Slots {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

/// Owned by one orchestrator; never shared between instances.
pub(crate) struct SessionCache {
    slots: Mutex<Slots>,
    ttl: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("ttl", &self.ttl)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl SessionCache {
    pub(crate) fn new(ttl: Duration, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            ttl,
            capacity: capacity.max(1),
            clock,
        }
    }

    // Never held across an await.
    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Live entry for `id`. Expired entries are dropped.
    pub(crate) fn get(&self, id: &str) -> Option<StoredSession> {
        let now = self.clock.now();
        let mut slots = self.lock();
        let entry = slots.entries.get(id)?;
        if now.saturating_duration_since(entry.stamped) < self.ttl {
            return Some(entry.data.clone());
        }
        slots.entries.remove(id);
        None
    }

    /// Inserts or refreshes `session`, evicting the oldest entry when full.
    pub(crate) fn insert(&self, session: StoredSession) {
        let now = self.clock.now();
        let mut slots = self.lock();
        let id = session.id().to_string();

        if !slots.entries.contains_key(&id) && slots.entries.len() >= self.capacity {
            let oldest = slots
                .entries
                .iter()
                .min_by_key(|(_, e)| (e.stamped, e.seq))
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                slots.entries.remove(&oldest);
            }
        }

        let seq = slots.next_seq;
        slots.next_seq += 1;
        slots.entries.insert(
            id,
            Entry {
                data: session,
                stamped: now,
                seq,
            },
        );
    }

    pub(crate) fn invalidate(&self, id: &str) {
        self.lock().entries.remove(id);
    }

    pub(crate) fn clear(&self) {
        self.lock().entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().entries.len()
    }
}
