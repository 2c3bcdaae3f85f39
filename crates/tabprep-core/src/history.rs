//! Snapshot history for undo/redo
//!
//! Linear history of full-state snapshots with a current pointer. Restoring is
//! a structural copy-back, nothing is replayed.
//!
//! The history also tracks whether the live state has diverged from the
//! snapshot at the pointer (`dirty`). Undo from a dirty state first records the
//! live state as the newest snapshot, so a following redo can return to it.

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

/// Smallest cap that can still express one undo step
pub const MIN_HISTORY_LIMIT: usize = 2;

/// A saved state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<S> {
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
    /// The saved state
    pub state: S,
}

impl<S> Snapshot<S> {
    /// Snapshot taken now
    pub fn now(state: S) -> Self {
        Self {
            timestamp: Utc::now(),
            state,
        }
    }
}

/// Bounded linear undo/redo history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History<S> {
    snapshots: Vec<Snapshot<S>>,
    pointer: usize,
    limit: usize,
    #[serde(default)]
    dirty: bool,
}

impl<S: Clone> History<S> {
    /// Create an empty history keeping at most `limit` snapshots
    pub fn new(limit: usize) -> Self {
        Self {
            snapshots: Vec::new(),
            pointer: 0,
            limit: limit.max(MIN_HISTORY_LIMIT),
            dirty: false,
        }
    }

    /// Record the live state before a committed edit
    ///
    /// Snapshots beyond the pointer are dropped. The live state is only pushed
    /// if it differs from the snapshot at the pointer.
    pub fn checkpoint(&mut self, live: &S) {
        self.snapshots.truncate(self.pointer + 1);
        if self.dirty || self.snapshots.is_empty() {
            self.push(live.clone());
        }
        self.pointer = self.snapshots.len().saturating_sub(1);
        self.dirty = false;
    }

    /// Note that the live state no longer equals the snapshot at the pointer
    ///
    /// Any redo branch is discarded.
    pub fn mark_dirty(&mut self) {
        self.snapshots.truncate(self.pointer + 1);
        self.dirty = true;
    }

    /// Step back, returning the state to restore
    pub fn undo(&mut self, live: &S) -> Option<S> {
        if self.dirty {
            if self.snapshots.is_empty() {
                return None;
            }
            self.snapshots.truncate(self.pointer + 1);
            self.push(live.clone());
            self.dirty = false;
            self.pointer = self.snapshots.len() - 2;
        } else if self.pointer == 0 {
            return None;
        } else {
            self.pointer -= 1;
        }
        Some(self.snapshots[self.pointer].state.clone())
    }

    /// Step forward, returning the state to restore
    pub fn redo(&mut self) -> Option<S> {
        if self.dirty || self.pointer + 1 >= self.snapshots.len() {
            return None;
        }
        self.pointer += 1;
        Some(self.snapshots[self.pointer].state.clone())
    }

    pub fn can_undo(&self) -> bool {
        if self.dirty {
            !self.snapshots.is_empty()
        } else {
            self.pointer > 0
        }
    }

    pub fn can_redo(&self) -> bool {
        !self.dirty && self.pointer + 1 < self.snapshots.len()
    }

    /// Change the cap, evicting the oldest snapshots if needed
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit.max(MIN_HISTORY_LIMIT);
        self.evict();
    }

    pub fn snapshots(&self) -> &[Snapshot<S>] {
        &self.snapshots
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    fn push(&mut self, state: S) {
        self.snapshots.push(Snapshot::now(state));
        self.pointer = self.snapshots.len() - 1;
        self.evict();
    }

    fn evict(&mut self) {
        if self.snapshots.len() <= self.limit {
            return;
        }
        let excess = self.snapshots.len() - self.limit;
        self.snapshots.drain(..excess);
        self.pointer = self.pointer.saturating_sub(excess);
        debug!("evicted {} oldest snapshots", excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Apply an edit the way the engine does: checkpoint, mutate, mark dirty
    fn commit(history: &mut History<i32>, live: &mut i32, value: i32) {
        history.checkpoint(live);
        *live = value;
        history.mark_dirty();
    }

    #[test]
    fn test_history_undo_redo() {
        let mut history = History::new(50);
        let mut live = 0;
        history.checkpoint(&live);
        commit(&mut history, &mut live, 1);
        commit(&mut history, &mut live, 2);

        assert!(history.can_undo());
        assert!(!history.can_redo());

        live = history.undo(&live).unwrap();
        assert_eq!(live, 1);
        live = history.undo(&live).unwrap();
        assert_eq!(live, 0);
        assert!(history.undo(&live).is_none());

        live = history.redo().unwrap();
        assert_eq!(live, 1);
        live = history.redo().unwrap();
        assert_eq!(live, 2);
        assert!(history.redo().is_none());
    }

    #[test]
    fn test_history_undo_then_redo_returns_to_live() {
        let mut history = History::new(50);
        let mut live = 0;
        history.checkpoint(&live);
        commit(&mut history, &mut live, 7);

        let before = live;
        live = history.undo(&live).unwrap();
        live = history.redo().unwrap();
        assert_eq!(live, before);
    }

    #[test]
    fn test_history_new_edit_drops_redo_branch() {
        let mut history = History::new(50);
        let mut live = 0;
        history.checkpoint(&live);
        commit(&mut history, &mut live, 1);
        commit(&mut history, &mut live, 2);

        live = history.undo(&live).unwrap();
        assert_eq!(live, 1);
        commit(&mut history, &mut live, 5);

        assert!(!history.can_redo());
        live = history.undo(&live).unwrap();
        assert_eq!(live, 1);
        live = history.undo(&live).unwrap();
        assert_eq!(live, 0);
        assert_eq!(history.redo(), Some(1));
        assert_eq!(history.redo(), Some(5));
    }

    #[test]
    fn test_history_eviction() {
        let mut history = History::new(3);
        let mut live = 0;
        history.checkpoint(&live);
        for value in 1..=5 {
            commit(&mut history, &mut live, value);
        }
        history.checkpoint(&live);

        assert_eq!(history.len(), 3);
        let states: Vec<i32> = history.snapshots().iter().map(|s| s.state).collect();
        assert_eq!(states, vec![3, 4, 5]);
        assert_eq!(history.pointer(), 2);
    }

    #[test]
    fn test_history_limit_floor() {
        let history: History<i32> = History::new(0);
        assert_eq!(history.limit(), MIN_HISTORY_LIMIT);
    }

    #[test]
    fn test_history_empty_is_noop() {
        let mut history: History<i32> = History::new(10);
        history.mark_dirty();
        assert!(!history.can_undo());
        assert!(history.undo(&3).is_none());
        assert!(history.redo().is_none());
    }

    #[test]
    fn test_history_json_round_trip() {
        let mut history = History::new(10);
        let mut live = 0;
        history.checkpoint(&live);
        commit(&mut history, &mut live, 4);

        let json = serde_json::to_string(&history).unwrap();
        let mut back: History<i32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, history);
        assert_eq!(back.undo(&live), Some(0));
    }
}
