use indexmap::IndexSet;

use crate::eth::primitives::TransferId;

/// Bounded insertion-ordered set of processed transfer ids. Oldest ids are evicted first.
#[derive(Debug, Clone)]
pub struct ProcessedLedger {
    ids: IndexSet<TransferId>,
    capacity: usize,
}

impl ProcessedLedger {
    pub fn new(capacity: usize) -> Self {
        if capacity == 0 {
            tracing::warn!("processed ledger capacity cannot be zero, keeping one id");
        }
        Self {
            ids: IndexSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// Restores a ledger keeping only the most recent `capacity` ids.
    pub fn from_ids(capacity: usize, ids: impl IntoIterator<Item = TransferId>) -> Self {
        let mut ledger = Self::new(capacity);
        for id in ids {
            ledger.insert(id);
        }
        ledger
    }

    pub fn contains(&self, id: &TransferId) -> bool {
        self.ids.contains(id)
    }

    /// Appends the id and evicts the oldest ones if over capacity.
    ///
    /// Returns `false` if the id was already present.
    pub fn insert(&mut self, id: TransferId) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        while self.ids.len() > self.capacity {
            self.ids.shift_remove_index(0);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransferId> {
        self.ids.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: usize) -> TransferId {
        TransferId::from(format!("0x{n:x}"))
    }

    #[test]
    fn ledger_is_bounded_and_evicts_oldest() {
        let capacity = 3;
        let mut ledger = ProcessedLedger::new(capacity);
        for n in 0..capacity + 2 {
            assert!(ledger.insert(id(n)));
        }

        assert_eq!(ledger.len(), capacity);
        assert!(!ledger.contains(&id(0)));
        assert!(!ledger.contains(&id(1)));
        assert!(ledger.contains(&id(4)));
    }

    #[test]
    fn reinserting_is_a_noop() {
        let mut ledger = ProcessedLedger::new(2);
        assert!(ledger.insert(id(1)));
        assert!(ledger.insert(id(2)));
        assert!(!ledger.insert(id(1)));

        // re-marking does not refresh the position
        ledger.insert(id(3));
        assert!(!ledger.contains(&id(1)));
        assert!(ledger.contains(&id(2)));
    }

    #[test]
    fn restore_keeps_most_recent_ids() {
        let ledger = ProcessedLedger::from_ids(2, (0..5).map(id));
        let restored: Vec<_> = ledger.iter().cloned().collect();
        assert_eq!(restored, vec![id(3), id(4)]);
    }
}
