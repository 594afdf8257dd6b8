//! Height-indexed state history per governance object.
//!
//! Entry disimpan urut height (strictly increasing). State saat `tip` adalah
//! entry terakhir dengan `height <= tip`, dicari dengan binary search.
//! Disconnect block cukup menghapus entry di height tersebut.

use serde::{Deserialize, Serialize};

use crate::dao::flags::DaoState;
use crate::dao::DaoError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub height: u32,
    pub state: DaoState,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateHistory {
    entries: Vec<StateEntry>,
}

impl StateHistory {
    pub fn new(height: u32, state: DaoState) -> Self {
        StateHistory { entries: vec![StateEntry { height, state }] }
    }

    pub fn entries(&self) -> &[StateEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a transition. `height` must be greater than the last entry.
    pub fn push(&mut self, height: u32, state: DaoState) -> Result<(), DaoError> {
        if let Some(last) = self.entries.last() {
            if height <= last.height {
                return Err(DaoError::HistoryOrder { last: last.height, height });
            }
        }
        self.entries.push(StateEntry { height, state });
        Ok(())
    }

    pub fn entry_at(&self, tip: u32) -> Option<&StateEntry> {
        let idx = self.entries.partition_point(|e| e.height <= tip);
        idx.checked_sub(1).map(|i| &self.entries[i])
    }

    /// State as of `tip`; objects with no entry yet are `Nil`.
    pub fn state_at(&self, tip: u32) -> DaoState {
        self.entry_at(tip).map(|e| e.state).unwrap_or(DaoState::Nil)
    }

    /// Height at which the current state (as of `tip`) was entered.
    pub fn state_since(&self, tip: u32) -> Option<u32> {
        self.entry_at(tip).map(|e| e.height)
    }

    /// First height at which `state` was reached, if it was.
    pub fn first_height_of(&self, state: DaoState) -> Option<u32> {
        self.entries.iter().find(|e| e.state == state).map(|e| e.height)
    }

    /// Remove the entry written at exactly `height`. Returns true if one existed.
    pub fn remove_at(&mut self, height: u32) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.height != height);
        self.entries.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_at_uses_greatest_height_not_above_tip() {
        let mut h = StateHistory::new(10, DaoState::Nil);
        h.push(40, DaoState::Accepted).expect("push");
        h.push(90, DaoState::AcceptedExpired).expect("push");

        assert_eq!(h.state_at(5), DaoState::Nil);
        assert_eq!(h.state_at(39), DaoState::Nil);
        assert_eq!(h.state_at(40), DaoState::Accepted);
        assert_eq!(h.state_at(89), DaoState::Accepted);
        assert_eq!(h.state_at(u32::MAX), DaoState::AcceptedExpired);
        assert_eq!(h.state_since(50), Some(40));
        assert_eq!(h.first_height_of(DaoState::Accepted), Some(40));
    }

    #[test]
    fn push_requires_strictly_increasing_height() {
        let mut h = StateHistory::new(10, DaoState::Nil);
        assert!(matches!(h.push(10, DaoState::Accepted), Err(DaoError::HistoryOrder { last: 10, height: 10 })));
        assert!(h.push(9, DaoState::Accepted).is_err());
        assert_eq!(h.entries().len(), 1);
    }

    #[test]
    fn remove_at_is_exact_inverse_of_push() {
        let mut h = StateHistory::new(10, DaoState::Nil);
        let snapshot = h.clone();
        h.push(20, DaoState::Rejected).expect("push");
        assert!(h.remove_at(20));
        assert_eq!(h, snapshot);
        assert!(!h.remove_at(20));
    }
}
