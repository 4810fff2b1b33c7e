//! MemoryStore: bounded in-process backend

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use forgetmenot::{CacheKey, CacheStore, Result};
use parking_lot::Mutex;
use tracing::trace;

use crate::clock::{Clock, SystemClock};
use crate::lru::{ExpiringLru, Removal};

/// Default number of entries kept by [`MemoryStore::default`]
pub const DEFAULT_CAPACITY: usize = 10_000;

/// In-process [`CacheStore`] with LRU eviction and per-entry TTL
pub struct MemoryStore {
    entries: Mutex<ExpiringLru<CacheKey, Vec<u8>>>,
    clock: Arc<dyn Clock>,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl MemoryStore {
    /// Store holding at most `capacity` entries, on the system clock
    ///
    /// # Panics
    /// If `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    /// Store on a custom clock
    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(ExpiringLru::new(capacity)),
            clock,
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Entries currently held, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.entries.lock().capacity()
    }

    /// Entries pushed out by capacity
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Entries dropped because their TTL elapsed
    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    /// Drop all expired entries now
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let purged = self.entries.lock().purge_expired(now);
        self.expirations.fetch_add(purged as u64, Ordering::Relaxed);
        purged
    }

    /// Remove everything
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn note(&self, removal: Removal, key: &CacheKey) {
        match removal {
            Removal::Evicted => {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                trace!(key = %key, "evicted entry to make room");
            }
            Removal::Expired => {
                self.expirations.fetch_add(1, Ordering::Relaxed);
                trace!(key = %key, "entry expired");
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let now = self.clock.now();
        let lookup = self.entries.lock().get(key, now).map(|value| value.cloned());
        match lookup {
            Ok(value) => Ok(value),
            Err(removal) => {
                self.note(removal, key);
                Ok(None)
            }
        }
    }

    fn put(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) -> Result<()> {
        // A TTL past the clock's range never expires.
        let expires_at = self.clock.now().checked_add(ttl);
        let evicted = self.entries.lock().put(key.clone(), value, expires_at);
        if let Some(evicted) = evicted {
            self.note(Removal::Evicted, &evicted);
        }
        Ok(())
    }

    fn expire(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }
}
