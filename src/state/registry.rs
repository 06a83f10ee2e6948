//! Canonical tab records and tree-shape bookkeeping.
//!
//! The registry is the single source of truth for parent/child links,
//! sibling order and derived depth. It enforces the structural invariants
//! on every call and rejects anything that would break them:
//! - every parent exists and belongs to the same group
//! - no tab is its own ancestor
//! - `order_index` is strictly increasing within a sibling list
//! - `depth` equals the parent's depth + 1 (0 for roots)

use std::collections::{HashMap, VecDeque};

use crate::error::{TreeError, TreeResult};
use crate::model::{NewNode, Node, NodeRecord, NodeUpdate};
use crate::traits::{GroupId, NodeId};

#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    nodes: HashMap<NodeId, Node>,
    /// Root ids per group, sorted by `order_index`.
    roots: HashMap<GroupId, Vec<NodeId>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            roots: HashMap::new(),
        }
    }

    /// Builds a registry holding the forests of every group present in `records`.
    pub fn from_records(records: impl IntoIterator<Item = NodeRecord>) -> TreeResult<Self> {
        let mut by_group: HashMap<GroupId, Vec<NodeRecord>> = HashMap::new();
        for record in records {
            by_group.entry(record.group_id).or_default().push(record);
        }

        let mut registry = Self::new();
        for (group, rows) in by_group {
            registry.replace_group(group, rows)?;
        }
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    // ===== Shape Queries =====

    pub fn get_node(&self, id: NodeId) -> TreeResult<&Node> {
        self.nodes.get(&id).ok_or(TreeError::NotFound(id))
    }

    /// Returns the children of `id` ordered by `order_index`.
    pub fn get_children(&self, id: NodeId) -> TreeResult<Vec<&Node>> {
        let node = self.get_node(id)?;
        Ok(node.children.iter().map(|c| &self.nodes[c]).collect())
    }

    /// Returns the root tabs of a group ordered by `order_index`.
    pub fn get_roots(&self, group: GroupId) -> Vec<&Node> {
        self.root_ids(group).iter().map(|r| &self.nodes[r]).collect()
    }

    pub fn root_ids(&self, group: GroupId) -> &[NodeId] {
        self.roots.get(&group).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ordered ids sharing `parent` (the group's roots when `parent` is `None`).
    pub fn sibling_ids(&self, group: GroupId, parent: Option<NodeId>) -> TreeResult<&[NodeId]> {
        match parent {
            Some(p) => Ok(self.get_node(p)?.children.as_slice()),
            None => Ok(self.root_ids(group)),
        }
    }

    pub fn group_of(&self, id: NodeId) -> TreeResult<GroupId> {
        Ok(self.get_node(id)?.group_id)
    }

    pub fn node_count(&self, group: GroupId) -> usize {
        self.nodes.values().filter(|n| n.group_id == group).count()
    }

    pub fn groups(&self) -> Vec<GroupId> {
        let mut groups: Vec<GroupId> = self.roots.keys().copied().collect();
        groups.sort();
        groups
    }

    /// Pre-order list of every descendant of `id`, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> TreeResult<Vec<NodeId>> {
        let node = self.get_node(id)?;
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = node.children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.nodes[&next].children.iter().rev().copied());
        }
        Ok(out)
    }

    /// Returns `true` when `node` sits somewhere below `ancestor`.
    pub fn is_descendant(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.nodes.get(&node).and_then(|n| n.parent_id);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.nodes.get(&parent).and_then(|n| n.parent_id);
        }
        false
    }

    /// Height of the subtree rooted at `id`: 0 for a leaf.
    pub fn subtree_height(&self, id: NodeId) -> TreeResult<usize> {
        let base = self.get_node(id)?.depth;
        Ok(self
            .descendants(id)?
            .iter()
            .map(|d| self.nodes[d].depth - base)
            .max()
            .unwrap_or(0))
    }

    /// Order index that places a new tab after every current child of `parent`.
    pub fn next_order_index(&self, group: GroupId, parent: Option<NodeId>) -> TreeResult<i64> {
        let siblings = self.sibling_ids(group, parent)?;
        Ok(siblings
            .last()
            .map(|last| self.nodes[last].order_index + 1)
            .unwrap_or(0))
    }

    /// Pre-order rows of a group, the shape a store would persist.
    pub fn records(&self, group: GroupId) -> Vec<NodeRecord> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.root_ids(group).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let node = &self.nodes[&id];
            out.push(node.to_record());
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    // ===== Mutations =====

    pub fn insert(&mut self, new: NewNode) -> TreeResult<&Node> {
        if self.nodes.contains_key(&new.id) {
            return Err(TreeError::DuplicateNode(new.id));
        }

        let depth = match new.parent_id {
            Some(parent_id) => {
                let parent = self.get_node(parent_id)?;
                if parent.group_id != new.group_id {
                    return Err(TreeError::invalid(format!(
                        "parent {} belongs to group {}, not {}",
                        parent_id, parent.group_id, new.group_id
                    )));
                }
                parent.depth + 1
            }
            None => 0,
        };

        let tied = self
            .sibling_ids(new.group_id, new.parent_id)?
            .iter()
            .any(|s| self.nodes[s].order_index == new.order_index);
        if tied {
            return Err(TreeError::OrderConflict {
                node: new.id,
                index: new.order_index,
            });
        }

        let (id, group, parent) = (new.id, new.group_id, new.parent_id);
        self.nodes.insert(
            id,
            Node {
                id,
                group_id: group,
                parent_id: parent,
                title: new.title,
                url: new.url,
                order_index: new.order_index,
                depth,
                children: Vec::new(),
            },
        );

        let mut siblings = self.take_siblings(group, parent);
        siblings.push(id);
        self.sort_by_order(&mut siblings);
        self.put_siblings(group, parent, siblings);

        Ok(&self.nodes[&id])
    }

    pub fn update_fields(&mut self, id: NodeId, update: &NodeUpdate) -> TreeResult<&Node> {
        let node = self.nodes.get_mut(&id).ok_or(TreeError::NotFound(id))?;
        if let Some(title) = &update.title {
            node.title = title.clone();
        }
        if let Some(url) = &update.url {
            node.url = url.clone();
        }
        Ok(node)
    }

    /// Moves `id` (and everything below it) under `new_parent`, after the existing children.
    ///
    /// Fails with `CycleDetected` before touching anything when `new_parent`
    /// is `id` itself or one of its descendants.
    pub fn reparent(&mut self, id: NodeId, new_parent: Option<NodeId>) -> TreeResult<()> {
        let node = self.get_node(id)?;
        let (group, old_parent) = (node.group_id, node.parent_id);

        let new_depth = match new_parent {
            Some(parent_id) => {
                if parent_id == id || self.is_descendant(id, parent_id) {
                    return Err(TreeError::CycleDetected {
                        node: id,
                        target: parent_id,
                    });
                }
                let parent = self.get_node(parent_id)?;
                if parent.group_id != group {
                    return Err(TreeError::invalid(format!(
                        "tab {} cannot move to group {}",
                        id, parent.group_id
                    )));
                }
                parent.depth + 1
            }
            None => 0,
        };

        let order_index = self
            .sibling_ids(group, new_parent)?
            .iter()
            .filter(|s| **s != id)
            .map(|s| self.nodes[s].order_index)
            .max()
            .map_or(0, |max| max + 1);

        let mut old_siblings = self.take_siblings(group, old_parent);
        old_siblings.retain(|s| *s != id);
        self.put_siblings(group, old_parent, old_siblings);

        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent_id = new_parent;
            node.order_index = order_index;
        }

        let mut new_siblings = self.take_siblings(group, new_parent);
        new_siblings.push(id);
        self.put_siblings(group, new_parent, new_siblings);

        self.refresh_depths(id, new_depth);
        Ok(())
    }

    /// Removes a leaf. The caller decides beforehand what happens to children.
    pub fn remove_node(&mut self, id: NodeId) -> TreeResult<Node> {
        let node = self.get_node(id)?;
        if !node.children.is_empty() {
            return Err(TreeError::HasChildren {
                node: id,
                children: node.children.len(),
            });
        }
        let (group, parent) = (node.group_id, node.parent_id);

        let mut siblings = self.take_siblings(group, parent);
        siblings.retain(|s| *s != id);
        self.put_siblings(group, parent, siblings);

        self.nodes.remove(&id).ok_or(TreeError::NotFound(id))
    }

    pub fn set_order_index(&mut self, id: NodeId, index: i64) -> TreeResult<()> {
        let node = self.get_node(id)?;
        let (group, parent) = (node.group_id, node.parent_id);

        let tied = self
            .sibling_ids(group, parent)?
            .iter()
            .any(|s| *s != id && self.nodes[s].order_index == index);
        if tied {
            return Err(TreeError::OrderConflict { node: id, index });
        }

        if let Some(node) = self.nodes.get_mut(&id) {
            node.order_index = index;
        }
        let mut siblings = self.take_siblings(group, parent);
        self.sort_by_order(&mut siblings);
        self.put_siblings(group, parent, siblings);
        Ok(())
    }

    /// Renumbers a sibling list `0..n` in the given order.
    ///
    /// `ordered` must be a permutation of the current siblings of `parent`.
    pub fn resequence(
        &mut self,
        group: GroupId,
        parent: Option<NodeId>,
        ordered: &[NodeId],
    ) -> TreeResult<()> {
        let current = self.sibling_ids(group, parent)?;
        let mut expected = current.to_vec();
        let mut given = ordered.to_vec();
        expected.sort();
        given.sort();
        if expected != given {
            return Err(TreeError::invalid(
                "resequence must list exactly the current siblings",
            ));
        }

        for (index, id) in ordered.iter().enumerate() {
            if let Some(node) = self.nodes.get_mut(id) {
                node.order_index = index as i64;
            }
        }
        self.put_siblings(group, parent, ordered.to_vec());
        Ok(())
    }

    /// Replaces a group's forest with the given store rows.
    ///
    /// Rows are validated as a whole; on error the registry is unchanged.
    pub fn replace_group(&mut self, group: GroupId, records: Vec<NodeRecord>) -> TreeResult<()> {
        let fresh = Self::build_group(group, records)?;

        if let Some(clash) = fresh
            .nodes
            .keys()
            .find(|id| self.nodes.get(id).is_some_and(|n| n.group_id != group))
        {
            return Err(TreeError::DuplicateNode(*clash));
        }

        self.remove_group(group);
        let Self { nodes, mut roots } = fresh;
        self.nodes.extend(nodes);
        if let Some(root_ids) = roots.remove(&group) {
            self.roots.insert(group, root_ids);
        }
        Ok(())
    }

    /// Drops every tab of a group and returns how many were removed.
    pub fn remove_group(&mut self, group: GroupId) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|_, n| n.group_id != group);
        self.roots.remove(&group);
        before - self.nodes.len()
    }

    /// Verifies every structural invariant; used after bulk rebuilds and in tests.
    pub fn check_invariants(&self) -> TreeResult<()> {
        for node in self.nodes.values() {
            let expected_depth = match node.parent_id {
                Some(parent_id) => {
                    let parent = self.get_node(parent_id)?;
                    if parent.group_id != node.group_id {
                        return Err(TreeError::invalid(format!("tab {} crosses groups", node.id)));
                    }
                    if parent.children.iter().filter(|c| **c == node.id).count() != 1 {
                        return Err(TreeError::invalid(format!(
                            "tab {} is not listed once under {}",
                            node.id, parent_id
                        )));
                    }
                    parent.depth + 1
                }
                None => {
                    if !self.root_ids(node.group_id).contains(&node.id) {
                        return Err(TreeError::invalid(format!("root {} is not listed", node.id)));
                    }
                    0
                }
            };
            if node.depth != expected_depth {
                return Err(TreeError::invalid(format!(
                    "tab {} has depth {} instead of {}",
                    node.id, node.depth, expected_depth
                )));
            }
            if self.is_descendant(node.id, node.id) {
                return Err(TreeError::CycleDetected {
                    node: node.id,
                    target: node.id,
                });
            }
            self.check_strict_order(&node.children)?;
        }
        for root_ids in self.roots.values() {
            self.check_strict_order(root_ids)?;
        }
        Ok(())
    }

    // ===== Internals =====

    fn build_group(group: GroupId, records: Vec<NodeRecord>) -> TreeResult<Self> {
        let total = records.len();
        let mut by_parent: HashMap<Option<NodeId>, Vec<NodeRecord>> = HashMap::new();
        for record in records {
            if record.group_id != group {
                return Err(TreeError::invalid(format!(
                    "row {} belongs to group {}, not {}",
                    record.id, record.group_id, group
                )));
            }
            by_parent.entry(record.parent_id).or_default().push(record);
        }

        let mut registry = Self::new();
        let mut queue: VecDeque<Option<NodeId>> = VecDeque::from([None]);
        while let Some(parent) = queue.pop_front() {
            let Some(mut rows) = by_parent.remove(&parent) else {
                continue;
            };
            rows.sort_by_key(|r| r.order_index);
            for row in rows {
                let id = row.id;
                registry.insert(row)?;
                queue.push_back(Some(id));
            }
        }

        if registry.len() != total {
            return Err(TreeError::invalid(format!(
                "{} rows of group {} are not reachable from a root",
                total - registry.len(),
                group
            )));
        }
        Ok(registry)
    }

    fn check_strict_order(&self, ids: &[NodeId]) -> TreeResult<()> {
        for pair in ids.windows(2) {
            let (a, b) = (&self.nodes[&pair[0]], &self.nodes[&pair[1]]);
            if a.order_index >= b.order_index {
                return Err(TreeError::OrderConflict {
                    node: b.id,
                    index: b.order_index,
                });
            }
        }
        Ok(())
    }

    fn take_siblings(&mut self, group: GroupId, parent: Option<NodeId>) -> Vec<NodeId> {
        match parent {
            Some(p) => self
                .nodes
                .get_mut(&p)
                .map(|n| std::mem::take(&mut n.children))
                .unwrap_or_default(),
            None => self.roots.remove(&group).unwrap_or_default(),
        }
    }

    fn put_siblings(&mut self, group: GroupId, parent: Option<NodeId>, ids: Vec<NodeId>) {
        match parent {
            Some(p) => {
                if let Some(node) = self.nodes.get_mut(&p) {
                    node.children = ids;
                }
            }
            None if ids.is_empty() => {
                self.roots.remove(&group);
            }
            None => {
                self.roots.insert(group, ids);
            }
        }
    }

    fn sort_by_order(&self, ids: &mut [NodeId]) {
        ids.sort_by_key(|id| self.nodes.get(id).map_or(i64::MAX, |n| n.order_index));
    }

    fn refresh_depths(&mut self, id: NodeId, depth: usize) {
        let mut stack = vec![(id, depth)];
        while let Some((next, d)) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(&next) {
                node.depth = d;
                stack.extend(node.children.iter().map(|c| (*c, d + 1)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const G: GroupId = GroupId(1);

    fn row(id: u64, parent: Option<u64>, order: i64) -> NodeRecord {
        NodeRecord {
            id: NodeId(id),
            group_id: G,
            parent_id: parent.map(NodeId),
            title: format!("tab {id}"),
            url: format!("https://example.com/{id}"),
            order_index: order,
        }
    }

    /// 1 ─┬─ 2 ── 4
    ///    └─ 3
    /// 5
    fn sample() -> NodeRegistry {
        NodeRegistry::from_records(vec![
            row(1, None, 0),
            row(2, Some(1), 0),
            row(3, Some(1), 1),
            row(4, Some(2), 0),
            row(5, None, 1),
        ])
        .unwrap()
    }

    fn ids(nodes: Vec<&Node>) -> Vec<u64> {
        nodes.into_iter().map(|n| n.id.0).collect()
    }

    #[test]
    fn builds_from_unsorted_rows() {
        let registry = NodeRegistry::from_records(vec![
            row(4, Some(2), 0),
            row(3, Some(1), 1),
            row(5, None, 1),
            row(2, Some(1), 0),
            row(1, None, 0),
        ])
        .unwrap();

        assert_eq!(ids(registry.get_roots(G)), vec![1, 5]);
        assert_eq!(ids(registry.get_children(NodeId(1)).unwrap()), vec![2, 3]);
        assert_eq!(registry.get_node(NodeId(4)).unwrap().depth, 2);
        registry.check_invariants().unwrap();
    }

    #[test]
    fn rejects_unreachable_rows() {
        let err = NodeRegistry::from_records(vec![row(1, None, 0), row(2, Some(9), 0)]).unwrap_err();
        assert!(matches!(err, TreeError::ValidationFailed { .. }));
    }

    #[test]
    fn insert_rejects_ties_and_duplicates() {
        let mut registry = sample();
        assert_eq!(
            registry.insert(row(6, Some(1), 1)).unwrap_err(),
            TreeError::OrderConflict { node: NodeId(6), index: 1 }
        );
        assert_eq!(
            registry.insert(row(2, None, 7)).unwrap_err(),
            TreeError::DuplicateNode(NodeId(2))
        );
        assert_eq!(
            registry.insert(row(6, Some(42), 0)).unwrap_err(),
            TreeError::NotFound(NodeId(42))
        );
    }

    #[test]
    fn insert_keeps_siblings_sorted() {
        let mut registry = sample();
        registry.insert(row(6, Some(1), -5)).unwrap();
        assert_eq!(ids(registry.get_children(NodeId(1)).unwrap()), vec![6, 2, 3]);
        assert_eq!(registry.get_node(NodeId(6)).unwrap().depth, 1);
    }

    #[test]
    fn reparent_appends_and_recomputes_depth() {
        let mut registry = sample();
        registry.reparent(NodeId(2), Some(NodeId(5))).unwrap();

        assert_eq!(ids(registry.get_children(NodeId(1)).unwrap()), vec![3]);
        assert_eq!(ids(registry.get_children(NodeId(5)).unwrap()), vec![2]);
        assert_eq!(registry.get_node(NodeId(2)).unwrap().depth, 1);
        assert_eq!(registry.get_node(NodeId(4)).unwrap().depth, 2);

        registry.reparent(NodeId(2), None).unwrap();
        assert_eq!(ids(registry.get_roots(G)), vec![1, 5, 2]);
        assert_eq!(registry.get_node(NodeId(4)).unwrap().depth, 1);
        registry.check_invariants().unwrap();
    }

    #[test]
    fn reparent_under_descendant_is_rejected_without_change() {
        let mut registry = sample();
        let before = registry.records(G);

        assert_eq!(
            registry.reparent(NodeId(1), Some(NodeId(4))).unwrap_err(),
            TreeError::CycleDetected { node: NodeId(1), target: NodeId(4) }
        );
        assert_eq!(
            registry.reparent(NodeId(2), Some(NodeId(2))).unwrap_err(),
            TreeError::CycleDetected { node: NodeId(2), target: NodeId(2) }
        );
        assert_eq!(registry.records(G), before);
    }

    #[test]
    fn reparent_to_same_parent_moves_to_end() {
        let mut registry = sample();
        registry.reparent(NodeId(2), Some(NodeId(1))).unwrap();
        assert_eq!(ids(registry.get_children(NodeId(1)).unwrap()), vec![3, 2]);
        registry.check_invariants().unwrap();
    }

    #[test]
    fn remove_refuses_parents() {
        let mut registry = sample();
        assert_eq!(
            registry.remove_node(NodeId(1)).unwrap_err(),
            TreeError::HasChildren { node: NodeId(1), children: 2 }
        );
        let removed = registry.remove_node(NodeId(4)).unwrap();
        assert_eq!(removed.id, NodeId(4));
        assert!(registry.get_node(NodeId(2)).unwrap().is_leaf());
    }

    #[test]
    fn set_order_index_refuses_ties() {
        let mut registry = sample();
        assert!(registry.set_order_index(NodeId(2), 1).is_err());
        registry.set_order_index(NodeId(2), 10).unwrap();
        assert_eq!(ids(registry.get_children(NodeId(1)).unwrap()), vec![3, 2]);
    }

    #[test]
    fn resequence_requires_the_same_set() {
        let mut registry = sample();
        assert!(registry
            .resequence(G, Some(NodeId(1)), &[NodeId(2)])
            .is_err());
        registry
            .resequence(G, Some(NodeId(1)), &[NodeId(3), NodeId(2)])
            .unwrap();
        assert_eq!(registry.get_node(NodeId(3)).unwrap().order_index, 0);
        assert_eq!(registry.get_node(NodeId(2)).unwrap().order_index, 1);
    }

    #[test]
    fn descendant_queries() {
        let registry = sample();
        assert_eq!(
            registry.descendants(NodeId(1)).unwrap(),
            vec![NodeId(2), NodeId(4), NodeId(3)]
        );
        assert!(registry.is_descendant(NodeId(1), NodeId(4)));
        assert!(!registry.is_descendant(NodeId(4), NodeId(1)));
        assert_eq!(registry.subtree_height(NodeId(1)).unwrap(), 2);
        assert_eq!(registry.subtree_height(NodeId(5)).unwrap(), 0);
        assert_eq!(registry.next_order_index(G, Some(NodeId(1))).unwrap(), 2);
        assert_eq!(registry.next_order_index(G, Some(NodeId(5))).unwrap(), 0);
    }

    #[test]
    fn replace_group_leaves_other_groups_alone() {
        let mut registry = sample();
        let other = NodeRecord {
            group_id: GroupId(2),
            ..row(10, None, 0)
        };
        registry.replace_group(GroupId(2), vec![other]).unwrap();
        registry.replace_group(G, vec![row(1, None, 0)]).unwrap();

        assert_eq!(registry.node_count(G), 1);
        assert_eq!(registry.node_count(GroupId(2)), 1);
        assert_eq!(registry.groups(), vec![G, GroupId(2)]);
    }
}
