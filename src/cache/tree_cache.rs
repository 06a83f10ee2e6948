//! Caching of materialized forests.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::materializer::PresentationNode;
use crate::traits::GroupId;

/// Cache for materialized presentation forests.
///
/// Each entry remembers the revision it was built at. The mutator bumps
/// the revision after every resync or lock change, which makes all entries
/// stale at once.
pub struct TreeCache {
    /// group -> (revision at build time, forest)
    forests: HashMap<GroupId, (u64, Arc<Vec<PresentationNode>>)>,

    /// Incremented whenever the registry or the lock flags change.
    revision: u64,
}

impl TreeCache {
    pub fn new() -> Self {
        Self {
            forests: HashMap::new(),
            revision: 0,
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Invalidates all cached forests.
    ///
    /// This should be called whenever:
    /// - The registry is re-synchronized from the store
    /// - A lock flag changes
    pub fn invalidate(&mut self) {
        self.revision += 1;
        self.forests.clear();
    }

    /// Returns the cached forest of `group` if it matches the current revision.
    pub fn get(&self, group: GroupId) -> Option<Arc<Vec<PresentationNode>>> {
        match self.forests.get(&group) {
            Some((built_at, forest)) if *built_at == self.revision => Some(Arc::clone(forest)),
            _ => None,
        }
    }

    pub fn store(&mut self, group: GroupId, forest: Arc<Vec<PresentationNode>>) {
        self.forests.insert(group, (self.revision, forest));
    }
}

impl Default for TreeCache {
    fn default() -> Self {
        Self::new()
    }
}
