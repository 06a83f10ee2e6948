//! Read-only conversion of the registry into renderable trees.
//!
//! Responsibilities:
//! - Building the nested presentation forest of a group
//! - Caching forests per group until the next revision
//! - Flattening a forest into rows with branch context for tree connectors

use std::sync::Arc;

use serde::Serialize;

use crate::cache::TreeCache;
use crate::model::Node;
use crate::state::{LockStateTracker, NodeRegistry};
use crate::traits::{GroupId, NodeId};

/// One tab as a renderer sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresentationNode {
    pub id: NodeId,
    pub title: String,
    pub url: String,
    pub order_index: i64,
    pub depth: usize,
    pub locked: bool,
    pub children: Vec<PresentationNode>,
}

impl PresentationNode {
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(PresentationNode::count).sum::<usize>()
    }
}

/// A flattened tree row with its row index and depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleRow {
    pub id: NodeId,
    pub row_index: usize,
    pub depth: usize,
    /// For each depth level (0 to depth-1), whether the ancestor at that
    /// level has more siblings below it.
    pub branch_context: Vec<bool>,
    /// Whether this is the last child of its parent
    pub is_last_child: bool,
}

/// Builds the presentation forest of `group`.
///
/// Lock flags are read with [`LockStateTracker::peek`], so unseen tabs show
/// as locked without being recorded.
pub fn materialize(
    registry: &NodeRegistry,
    locks: &LockStateTracker,
    group: GroupId,
) -> Vec<PresentationNode> {
    registry
        .get_roots(group)
        .into_iter()
        .map(|root| present(registry, locks, root))
        .collect()
}

fn present(registry: &NodeRegistry, locks: &LockStateTracker, node: &Node) -> PresentationNode {
    let children = node
        .children
        .iter()
        .filter_map(|c| registry.get_node(*c).ok())
        .map(|child| present(registry, locks, child))
        .collect();

    PresentationNode {
        id: node.id,
        title: node.title.clone(),
        url: node.url.clone(),
        order_index: node.order_index,
        depth: node.depth,
        locked: locks.peek(node.id).unwrap_or(true),
        children,
    }
}

/// Forest builder with a per-group cache.
#[derive(Default)]
pub struct Materializer {
    cache: TreeCache,
}

impl Materializer {
    pub fn new() -> Self {
        Self {
            cache: TreeCache::new(),
        }
    }

    /// Returns the forest of `group`, rebuilding it if the revision moved on.
    pub fn forest(
        &mut self,
        registry: &NodeRegistry,
        locks: &LockStateTracker,
        group: GroupId,
    ) -> Arc<Vec<PresentationNode>> {
        if let Some(forest) = self.cache.get(group) {
            return forest;
        }
        let forest = Arc::new(materialize(registry, locks, group));
        self.cache.store(group, Arc::clone(&forest));
        forest
    }

    pub fn invalidate(&mut self) {
        self.cache.invalidate();
    }

    pub fn revision(&self) -> u64 {
        self.cache.revision()
    }
}

struct RowFrame<'a> {
    node: &'a PresentationNode,
    branch_context: Vec<bool>,
    is_last_child: bool,
}

/// Flattens a forest into depth-first rows.
pub fn flatten_rows(forest: &[PresentationNode]) -> Vec<VisibleRow> {
    let mut rows = Vec::new();
    let mut stack: Vec<RowFrame<'_>> = forest
        .iter()
        .enumerate()
        .rev()
        .map(|(i, node)| RowFrame {
            node,
            branch_context: Vec::new(),
            is_last_child: i + 1 == forest.len(),
        })
        .collect();

    while let Some(frame) = stack.pop() {
        let last = frame.node.children.len();
        for (i, child) in frame.node.children.iter().enumerate().rev() {
            let mut child_context = frame.branch_context.clone();
            child_context.push(!frame.is_last_child);
            stack.push(RowFrame {
                node: child,
                branch_context: child_context,
                is_last_child: i + 1 == last,
            });
        }

        rows.push(VisibleRow {
            id: frame.node.id,
            row_index: rows.len(),
            depth: frame.node.depth,
            branch_context: frame.branch_context,
            is_last_child: frame.is_last_child,
        });
    }
    rows
}

/// Renders a forest as an indented outline with tree connectors.
pub fn render_outline(forest: &[PresentationNode]) -> String {
    let mut by_id = std::collections::HashMap::new();
    let mut stack: Vec<&PresentationNode> = forest.iter().collect();
    while let Some(node) = stack.pop() {
        by_id.insert(node.id, node);
        stack.extend(node.children.iter());
    }

    let mut out = String::new();
    for row in flatten_rows(forest) {
        let Some(node) = by_id.get(&row.id) else {
            continue;
        };
        if row.depth > 0 {
            for level in 1..row.depth {
                let more = row.branch_context.get(level).copied().unwrap_or(false);
                out.push_str(if more { "│  " } else { "   " });
            }
            out.push_str(if row.is_last_child { "└─ " } else { "├─ " });
        }
        out.push_str(&format!("{} #{} <{}>", node.title, node.id, node.url));
        if !node.locked {
            out.push_str(" [unlocked]");
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeRecord;

    const G: GroupId = GroupId(1);

    fn row(id: u64, parent: Option<u64>, order: i64) -> NodeRecord {
        NodeRecord {
            id: NodeId(id),
            group_id: G,
            parent_id: parent.map(NodeId),
            title: format!("t{id}"),
            url: format!("https://e.x/{id}"),
            order_index: order,
        }
    }

    fn sample() -> NodeRegistry {
        NodeRegistry::from_records(vec![
            row(1, None, 0),
            row(2, Some(1), 5),
            row(3, Some(1), 1),
            row(4, Some(3), 0),
            row(5, None, 1),
        ])
        .unwrap()
    }

    #[test]
    fn forest_follows_order_and_default_locks() {
        let registry = sample();
        let mut locks = LockStateTracker::new();
        locks.set(NodeId(3), false);

        let forest = materialize(&registry, &locks, G);
        assert_eq!(forest.len(), 2);
        let ids: Vec<NodeId> = forest[0].children.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![NodeId(3), NodeId(2)]);
        assert!(!forest[0].children[0].locked);
        assert!(forest[0].children[1].locked);
        assert_eq!(forest[0].children[0].children[0].depth, 2);

        // Reading never records defaults.
        assert_eq!(locks.peek(NodeId(2)), None);
    }

    #[test]
    fn rows_carry_branch_context() {
        let registry = sample();
        let forest = materialize(&registry, &LockStateTracker::new(), G);
        let rows = flatten_rows(&forest);

        let order: Vec<u64> = rows.iter().map(|r| r.id.0).collect();
        assert_eq!(order, vec![1, 3, 4, 2, 5]);
        assert_eq!(rows[2].row_index, 2);
        assert_eq!(rows[2].branch_context, vec![true, true]);
        assert!(rows[2].is_last_child);
        assert!(!rows[1].is_last_child);
        assert!(rows[4].is_last_child);
    }

    #[test]
    fn cached_forest_is_reused_until_invalidated() {
        let registry = sample();
        let mut locks = LockStateTracker::new();
        let mut materializer = Materializer::new();

        let first = materializer.forest(&registry, &locks, G);
        let second = materializer.forest(&registry, &locks, G);
        assert!(Arc::ptr_eq(&first, &second));

        locks.set(NodeId(1), false);
        materializer.invalidate();
        let third = materializer.forest(&registry, &locks, G);
        assert!(!Arc::ptr_eq(&first, &third));
        assert!(!third[0].locked);
    }

    #[test]
    fn outline_draws_connectors() {
        let registry = sample();
        let outline = render_outline(&materialize(&registry, &LockStateTracker::new(), G));
        let lines: Vec<&str> = outline.lines().collect();
        assert_eq!(lines[0], "t1 #1 <https://e.x/1>");
        assert_eq!(lines[1], "├─ t3 #3 <https://e.x/3>");
        assert_eq!(lines[2], "│  └─ t4 #4 <https://e.x/4>");
        assert_eq!(lines[3], "└─ t2 #2 <https://e.x/2>");
    }
}
