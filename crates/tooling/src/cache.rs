//! The two cache structures behind the log service.
//!
//! The TTL cache backs log listings; the FIFO cache backs log heads, whose
//! entries never expire by time (logs are immutable once created) and are
//! evicted purely by insertion order once capacity is reached. Eviction
//! order is guaranteed by an explicit key queue, not by map iteration
//! order.

use apexlog_core::Clock;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct TtlEntry<V> {
    value: V,
    expires_at: Instant,
}

/// A by-key cache whose entries expire a fixed duration after insertion.
pub struct TtlCache<K, V> {
    entries: HashMap<K, TtlEntry<V>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    /// Create a cache with the given entry lifetime
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            clock,
        }
    }

    /// A copy of the live value for `key`; expired entries are dropped
    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = self.clock.now();
        match self.entries.get(key) {
            Some(entry) if now < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a value with a fresh expiry
    pub fn insert(&mut self, key: K, value: V) {
        let expires_at = self.clock.now() + self.ttl;
        self.entries.insert(key, TtlEntry { value, expires_at });
    }

    /// Drop every entry
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Number of entries, live or expired-but-unswept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A bounded by-key cache evicting the oldest-inserted entry at capacity.
///
/// Re-inserting an existing key replaces its value without refreshing its
/// position: eviction is strictly first-in-first-out by first insertion,
/// not by recency of use.
pub struct FifoCache<K, V> {
    order: VecDeque<K>,
    entries: HashMap<K, V>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V> FifoCache<K, V> {
    /// Create a cache bounded to `capacity` distinct keys
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            entries: HashMap::with_capacity(capacity),
            capacity,
        }
    }

    /// Borrow the value for `key`
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Store a value, evicting the oldest-inserted key at capacity
    pub fn insert(&mut self, key: K, value: V) {
        if self.entries.insert(key.clone(), value).is_some() {
            return;
        }

        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    /// Drop every entry
    pub fn reset(&mut self) {
        self.order.clear();
        self.entries.clear();
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
