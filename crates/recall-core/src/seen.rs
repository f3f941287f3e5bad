//! Bounded FIFO record of identities a capture surface already submitted.
//!
//! The set only short-circuits redundant submissions. It is never
//! authoritative: an identity missing here may still be in the store, and
//! the store's `insert_if_absent` settles that case.

use std::collections::{HashSet, VecDeque};

/// Default capacity of a [`SeenSet`].
pub const DEFAULT_SEEN_CAPACITY: usize = 10_000;

/// FIFO-evicting set of identities.
///
/// ```rust
/// use recall_core::seen::SeenSet;
///
/// let mut seen = SeenSet::new(2);
/// seen.record("a");
/// seen.record("b");
/// seen.record("c");
/// assert!(!seen.has("a"));
/// assert!(seen.has("b") && seen.has("c"));
/// ```
#[derive(Debug, Clone)]
pub struct SeenSet {
    capacity: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl SeenSet {
    /// A set holding at most `capacity` identities (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity.min(DEFAULT_SEEN_CAPACITY)),
            members: HashSet::with_capacity(capacity.min(DEFAULT_SEEN_CAPACITY)),
        }
    }

    pub fn has(&self, identity: &str) -> bool {
        self.members.contains(identity)
    }

    /// Record `identity`, evicting the oldest entry when full.
    ///
    /// Returns `false` (and leaves the order untouched) when the identity
    /// was already present.
    pub fn record(&mut self, identity: impl Into<String>) -> bool {
        let identity = identity.into();
        if self.members.contains(&identity) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.members.insert(identity.clone());
        self.order.push_back(identity);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Identities from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::new(DEFAULT_SEEN_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_has() {
        let mut seen = SeenSet::new(4);
        assert!(seen.is_empty());
        assert!(seen.record("id:1"));
        assert!(seen.has("id:1"));
        assert!(!seen.has("id:2"));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_record_existing_is_noop() {
        let mut seen = SeenSet::new(2);
        seen.record("a");
        seen.record("b");
        assert!(!seen.record("a"));
        // "a" keeps its original position and is evicted first.
        seen.record("c");
        assert!(!seen.has("a"));
        assert_eq!(seen.iter().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut seen = SeenSet::new(3);
        for id in ["1", "2", "3", "4", "5"] {
            seen.record(id);
        }
        assert_eq!(seen.len(), 3);
        assert_eq!(seen.iter().collect::<Vec<_>>(), vec!["3", "4", "5"]);
    }

    #[test]
    fn test_zero_capacity_clamps_to_one() {
        let mut seen = SeenSet::new(0);
        assert_eq!(seen.capacity(), 1);
        seen.record("a");
        seen.record("b");
        assert_eq!(seen.len(), 1);
        assert!(seen.has("b"));
    }

    #[test]
    fn test_default_capacity() {
        assert_eq!(SeenSet::default().capacity(), DEFAULT_SEEN_CAPACITY);
    }
}
