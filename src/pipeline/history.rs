//! "Already displayed" bookkeeping keyed by message id.

use std::collections::{HashSet, VecDeque};

/// Remembers which message ids have been shown, so a history replay after
/// a reconnect does not show them again.
///
/// Bounded: once `capacity` ids are held, the oldest is forgotten first.
#[derive(Debug, Clone)]
pub struct DisplayLedger {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl DisplayLedger {
    pub const DEFAULT_CAPACITY: usize = 1_024;

    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Mark `id` as displayed.  Returns `true` the first time an id is seen;
    /// repeated calls with the same id return `false` and change nothing.
    pub fn record(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(id.to_owned());
        self.order.push_back(id.to_owned());
        true
    }

    /// Messages without an id cannot be deduplicated and always display.
    pub fn should_display(&mut self, id: Option<&str>) -> bool {
        id.map_or(true, |id| self.record(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for DisplayLedger {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_is_idempotent() {
        let mut ledger = DisplayLedger::default();
        assert!(ledger.record("m1"));
        assert!(!ledger.record("m1"));
        assert!(!ledger.record("m1"));
        assert_eq!(ledger.len(), 1);
        assert!(ledger.contains("m1"));
    }

    #[test]
    fn messages_without_id_always_display() {
        let mut ledger = DisplayLedger::default();
        assert!(ledger.should_display(None));
        assert!(ledger.should_display(None));
        assert!(ledger.is_empty());
    }

    #[test]
    fn oldest_id_is_evicted_at_capacity() {
        let mut ledger = DisplayLedger::new(2);
        ledger.record("a");
        ledger.record("b");
        ledger.record("c");
        assert!(!ledger.contains("a"));
        assert!(ledger.contains("b") && ledger.contains("c"));
        assert_eq!(ledger.len(), 2);
    }
}
