//! Per-tab lock flags.
//!
//! A locked tab moves and deletes together with its whole subtree; an
//! unlocked one leaves its children behind. Flags live only in the client
//! session and default to locked.

use std::collections::HashMap;

use crate::traits::NodeId;

/// Client-side lock flag per tab.
///
/// Responsibilities:
/// - Answering lock queries with the locked default for unseen tabs
/// - Toggling flags on user request
/// - Forgetting flags of deleted tabs
#[derive(Debug, Clone, Default)]
pub struct LockStateTracker {
    locks: HashMap<NodeId, bool>,
}

impl LockStateTracker {
    pub fn new() -> Self {
        Self {
            locks: HashMap::new(),
        }
    }

    /// Returns the lock flag of `id`, recording the locked default on first query.
    pub fn is_locked(&mut self, id: NodeId) -> bool {
        *self.locks.entry(id).or_insert(true)
    }

    /// Returns the recorded flag without recording a default.
    ///
    /// Rendering goes through this so that drawing a tree never mutates state.
    pub fn peek(&self, id: NodeId) -> Option<bool> {
        self.locks.get(&id).copied()
    }

    /// Flips the flag of `id`.
    ///
    /// # Returns
    /// The new flag value.
    pub fn toggle(&mut self, id: NodeId) -> bool {
        let flag = self.locks.entry(id).or_insert(true);
        *flag = !*flag;
        *flag
    }

    pub fn set(&mut self, id: NodeId, locked: bool) {
        self.locks.insert(id, locked);
    }

    /// Drops the flags of tabs that no longer exist.
    pub fn forget(&mut self, ids: impl IntoIterator<Item = NodeId>) {
        for id in ids {
            self.locks.remove(&id);
        }
    }

    /// Clears all flags; every tab reads as locked again.
    pub fn reset(&mut self) {
        self.locks.clear();
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
