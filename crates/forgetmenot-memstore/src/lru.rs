//! LRU (Least Recently Used) map with per-entry deadlines
//!
//! Slots live in a vector and are linked into a recency list by index, so
//! touch, insert and evict are O(1). Expired entries are dropped lazily when
//! read, or in bulk by `purge_expired`.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Instant;

use ahash::RandomState;

struct Slot<K, V> {
    key: K,
    value: V,
    /// `None` never expires
    expires_at: Option<Instant>,
    prev: Option<usize>,
    next: Option<usize>,
}

impl<K, V> Slot<K, V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }
}

/// Why an entry left the map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Pushed out by capacity
    Evicted,
    /// Deadline passed
    Expired,
}

/// Bounded LRU map whose entries expire
pub struct ExpiringLru<K, V> {
    map: HashMap<K, usize, RandomState>,
    slots: Vec<Option<Slot<K, V>>>,
    head: Option<usize>,
    tail: Option<usize>,
    free: Vec<usize>,
    capacity: usize,
}

impl<K, V> ExpiringLru<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create a map holding at most `capacity` entries
    ///
    /// # Panics
    /// If `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Capacity must be greater than 0");

        Self {
            map: HashMap::with_capacity_and_hasher(capacity, RandomState::new()),
            slots: Vec::with_capacity(capacity),
            head: None,
            tail: None,
            free: Vec::new(),
            capacity,
        }
    }

    /// Live value for `key`, marking it most recently used.
    ///
    /// An expired entry is removed and reported as `Err(Removal::Expired)`.
    pub fn get(&mut self, key: &K, now: Instant) -> Result<Option<&V>, Removal> {
        let idx = match self.map.get(key) {
            Some(&idx) => idx,
            None => return Ok(None),
        };

        let expired = self.slots[idx]
            .as_ref()
            .map_or(true, |slot| slot.is_expired(now));
        if expired {
            self.remove(key);
            return Err(Removal::Expired);
        }

        self.move_to_front(idx);
        Ok(self.slots[idx].as_ref().map(|slot| &slot.value))
    }

    /// Insert or overwrite; returns the key evicted to make room, if any
    pub fn put(&mut self, key: K, value: V, expires_at: Option<Instant>) -> Option<K> {
        if let Some(&idx) = self.map.get(&key) {
            if let Some(slot) = &mut self.slots[idx] {
                slot.value = value;
                slot.expires_at = expires_at;
            }
            self.move_to_front(idx);
            return None;
        }

        let evicted = if self.map.len() >= self.capacity {
            self.evict_tail()
        } else {
            None
        };

        let idx = self.alloc_slot();
        self.slots[idx] = Some(Slot {
            key: key.clone(),
            value,
            expires_at,
            prev: None,
            next: self.head,
        });

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.slots[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }

        self.map.insert(key, idx);
        evicted
    }

    /// Remove `key`, returning its value
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.map.remove(key)?;
        self.unlink(idx);
        self.free.push(idx);
        self.slots[idx].take().map(|slot| slot.value)
    }

    /// Drop every entry whose deadline has passed; returns how many
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<K> = self
            .slots
            .iter()
            .flatten()
            .filter(|slot| slot.is_expired(now))
            .map(|slot| slot.key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    /// Number of entries, expired or not
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True if empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.map.clear();
        self.slots.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }

        self.unlink(idx);

        if let Some(slot) = &mut self.slots[idx] {
            slot.prev = None;
            slot.next = self.head;
        }

        if let Some(head_idx) = self.head {
            if let Some(head) = &mut self.slots[head_idx] {
                head.prev = Some(idx);
            }
        }

        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match &self.slots[idx] {
            Some(slot) => (slot.prev, slot.next),
            None => return,
        };

        match prev {
            Some(prev_idx) => {
                if let Some(prev_slot) = &mut self.slots[prev_idx] {
                    prev_slot.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(next_idx) => {
                if let Some(next_slot) = &mut self.slots[next_idx] {
                    next_slot.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn evict_tail(&mut self) -> Option<K> {
        let tail_idx = self.tail?;
        let key = self.slots[tail_idx].as_ref()?.key.clone();
        self.remove(&key).map(|_| key)
    }

    fn alloc_slot(&mut self) -> usize {
        if let Some(idx) = self.free.pop() {
            idx
        } else {
            self.slots.push(None);
            self.slots.len() - 1
        }
    }
}
