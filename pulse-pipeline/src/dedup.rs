// Pulse Pipeline - Ingestion and query plumbing
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Bounded index of committed dedup keys.

use pulse::DedupKey;
use std::collections::{HashSet, VecDeque};

/// Set of durably written keys, evicting the oldest past `capacity`.
#[derive(Debug, Clone)]
pub struct DedupIndex {
    capacity: usize,
    keys: HashSet<DedupKey>,
    order: VecDeque<DedupKey>,
}

impl DedupIndex {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            keys: HashSet::with_capacity(capacity.min(1 << 16)),
            order: VecDeque::with_capacity(capacity.min(1 << 16)),
        }
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        self.keys.contains(key)
    }

    /// Record a key. Returns false if it was already present.
    pub fn insert(&mut self, key: DedupKey) -> bool {
        if self.capacity == 0 || !self.keys.insert(key) {
            return false;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.keys.remove(&old);
            }
        }
        true
    }

    /// Insert many keys, oldest first. Returns how many were new.
    pub fn extend<I: IntoIterator<Item = DedupKey>>(&mut self, keys: I) -> usize {
        keys.into_iter().filter(|k| self.insert(*k)).count()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
