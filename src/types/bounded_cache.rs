/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A size-bounded, least-recently-used cache.
//!
//! Components that memoise derived values (e.g., the human-readable rendering of account ids, or recently
//! closed ledgers) own an instance of [`BoundedCache`] instead of sharing process-wide state.
//!
//! ## Eviction policy
//!
//! When an insertion would grow the cache beyond its capacity, the entry that was least recently
//! inserted or read through [`get`](BoundedCache::get) is evicted and returned to the caller.
//! [`peek`](BoundedCache::peek) reads without affecting recency.

use std::{
    collections::{BTreeMap, HashMap},
    hash::Hash,
};

pub struct BoundedCache<K, V> {
    capacity: usize,
    entries: HashMap<K, (V, u64)>,
    recency: BTreeMap<u64, K>,
    clock: u64,
}

impl<K: Clone + Eq + Hash, V> BoundedCache<K, V> {
    /// Create an empty cache that holds at most `capacity` entries. A `capacity` of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            clock: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Get the value stored under `key`, marking it as the most recently used entry.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let tick = self.next_tick();
        let (_, last_used) = self.entries.get_mut(key)?;
        self.recency.remove(last_used);
        *last_used = tick;
        self.recency.insert(tick, key.clone());
        self.entries.get(key).map(|(value, _)| value)
    }

    /// Get the value stored under `key` without marking it as used.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|(value, _)| value)
    }

    /// Insert `value` under `key`. Returns the entry that was evicted to make room for it, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        let tick = self.next_tick();
        if let Some((_, last_used)) = self.entries.remove(&key) {
            self.recency.remove(&last_used);
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };

        self.recency.insert(tick, key.clone());
        self.entries.insert(key, (value, tick));
        evicted
    }

    /// Get the value stored under `key`, computing and inserting it with `compute` if it is absent.
    pub fn get_or_insert_with(&mut self, key: K, compute: impl FnOnce(&K) -> V) -> &V {
        if !self.entries.contains_key(&key) {
            let value = compute(&key);
            self.insert(key.clone(), value);
        }
        // Safety: the key was inserted above if it was absent, and `get` only fails for absent keys.
        self.get(&key).unwrap()
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let (value, last_used) = self.entries.remove(key)?;
        self.recency.remove(&last_used);
        Some(value)
    }

    /// Iterate through the cached values without affecting recency. Order is unspecified.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values().map(|(value, _)| value)
    }

    fn evict_oldest(&mut self) -> Option<(K, V)> {
        let (_, key) = self.recency.pop_first()?;
        self.entries.remove(&key).map(|(value, _)| (key, value))
    }

    fn next_tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}
