//! Dedup ledger of listing ids that have already been evaluated.
//!
//! Insertion order is kept in a ring buffer next to the membership set,
//! so eviction always drops the oldest id and `retain_recent` keeps
//! exactly the newest ones.

use std::collections::{HashSet, VecDeque};

use crate::types::ListingId;

#[derive(Debug)]
pub struct ProcessedSet {
    order: VecDeque<ListingId>,
    members: HashSet<ListingId>,
    capacity: usize,
}

impl ProcessedSet {
    /// `capacity` is the hard cap; inserting beyond it evicts the oldest id.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    pub fn contains(&self, id: ListingId) -> bool {
        self.members.contains(&id)
    }

    /// Returns `false` if the id was already present.
    pub fn insert(&mut self, id: ListingId) -> bool {
        if !self.members.insert(id) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            self.evict_oldest();
        }
        true
    }

    /// Keep only the `keep_last` most recently inserted ids.
    /// Returns how many were dropped.
    pub fn retain_recent(&mut self, keep_last: usize) -> usize {
        let mut dropped = 0;
        while self.order.len() > keep_last {
            self.evict_oldest();
            dropped += 1;
        }
        if dropped > 0 {
            self.order.shrink_to_fit();
            self.members.shrink_to_fit();
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.order.pop_front() {
            self.members.remove(&oldest);
        }
    }
}
