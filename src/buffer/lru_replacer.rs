use std::collections::HashMap;

use crate::common::Timestamp;

/// LRU Replacement Policy
///
/// Tracks the last access timestamp of every occupied buffer slot. The
/// victim is the slot with the smallest timestamp; ties go to the lowest
/// slot index.
#[derive(Debug)]
pub struct LruReplacer {
    /// Maximum number of slots the replacer can track
    max_slots: usize,
    /// Current timestamp (monotonically increasing)
    current_timestamp: Timestamp,
    /// Last access of each tracked slot
    last_access: HashMap<usize, Timestamp>,
}

impl LruReplacer {
    /// Creates a new LRU replacer for `max_slots` buffer slots.
    pub fn new(max_slots: usize) -> Self {
        Self {
            max_slots,
            current_timestamp: 0,
            last_access: HashMap::with_capacity(max_slots),
        }
    }

    /// Records that the given slot was accessed now and returns the
    /// timestamp of the access.
    pub fn record_access(&mut self, slot: usize) -> Timestamp {
        self.current_timestamp += 1;
        if slot < self.max_slots {
            self.last_access.insert(slot, self.current_timestamp);
        }
        self.current_timestamp
    }

    /// Returns the least recently used slot without removing it.
    pub fn victim(&self) -> Option<usize> {
        self.last_access
            .iter()
            .min_by_key(|(&slot, &timestamp)| (timestamp, slot))
            .map(|(&slot, _)| slot)
    }

    /// Stops tracking a slot.
    pub fn remove(&mut self, slot: usize) {
        self.last_access.remove(&slot);
    }

    /// Returns the last access timestamp of a slot.
    pub fn last_access(&self, slot: usize) -> Option<Timestamp> {
        self.last_access.get(&slot).copied()
    }

    /// Returns the number of tracked slots.
    pub fn size(&self) -> usize {
        self.last_access.len()
    }

    pub fn clear(&mut self) {
        self.last_access.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_replacer_empty() {
        let replacer = LruReplacer::new(4);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_replacer_basic() {
        let mut replacer = LruReplacer::new(4);

        replacer.record_access(0);
        replacer.record_access(1);
        replacer.record_access(2);
        assert_eq!(replacer.size(), 3);
        assert_eq!(replacer.victim(), Some(0));

        // Touching slot 0 again makes slot 1 the oldest
        replacer.record_access(0);
        assert_eq!(replacer.victim(), Some(1));

        replacer.remove(1);
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.size(), 2);
    }

    #[test]
    fn test_lru_replacer_timestamps_increase() {
        let mut replacer = LruReplacer::new(2);
        let first = replacer.record_access(0);
        let second = replacer.record_access(1);
        assert!(second > first);
        assert_eq!(replacer.last_access(0), Some(first));

        // Out-of-range slots still advance the clock but are not tracked
        replacer.record_access(7);
        assert_eq!(replacer.size(), 2);

        replacer.clear();
        assert_eq!(replacer.victim(), None);
    }
}
