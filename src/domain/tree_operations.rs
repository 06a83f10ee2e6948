//! Structural tree operations on a [`NodeRegistry`].
//!
//! This module contains pure functions for:
//! - Appending tabs with depth checks
//! - Moving a tab with or without its subtree (promoting children when unlocked)
//! - Reordering a tab among its siblings
//! - Deleting a tab with or without its subtree
//! - Inserting a whole spec forest
//!
//! The reference store applies these to its authoritative registry, and the
//! mutator runs the same functions against a scratch copy to reject bad
//! gestures before any intent leaves the client.

use crate::error::{TreeError, TreeResult};
use crate::model::{CreatedNode, NodeRecord, NodeSpec};
use crate::state::NodeRegistry;
use crate::traits::{GroupId, NodeId};

/// Fails when a tab at `depth` would break the `max_depth` limit.
pub fn ensure_depth(depth: usize, max_depth: usize) -> TreeResult<()> {
    if depth >= max_depth {
        return Err(TreeError::DepthExceeded {
            depth,
            max: max_depth.saturating_sub(1),
        });
    }
    Ok(())
}

/// Depth a new child of `parent` would get, or 0 at root level.
pub fn child_depth(registry: &NodeRegistry, parent: Option<NodeId>) -> TreeResult<usize> {
    match parent {
        Some(p) => Ok(registry.get_node(p)?.depth + 1),
        None => Ok(0),
    }
}

/// Appends a new tab after the existing children of `parent`.
pub fn append_node(
    registry: &mut NodeRegistry,
    record: NodeRecord,
    max_depth: usize,
) -> TreeResult<usize> {
    ensure_depth(child_depth(registry, record.parent_id)?, max_depth)?;
    let order_index = registry.next_order_index(record.group_id, record.parent_id)?;
    let node = registry.insert(NodeRecord {
        order_index,
        ..record
    })?;
    Ok(node.depth)
}

/// Moves `id` under `new_parent` (root level when `None`).
///
/// With `with_subtree` the whole subtree travels. Without it only the tab
/// moves and its direct children are promoted to its former parent.
///
/// # Returns
/// The promoted children, in their original order.
pub fn move_node(
    registry: &mut NodeRegistry,
    id: NodeId,
    new_parent: Option<NodeId>,
    with_subtree: bool,
    max_depth: usize,
) -> TreeResult<Vec<NodeId>> {
    let group = registry.group_of(id)?;
    if let Some(parent_id) = new_parent {
        if parent_id == id || registry.is_descendant(id, parent_id) {
            return Err(TreeError::CycleDetected {
                node: id,
                target: parent_id,
            });
        }
        if registry.group_of(parent_id)? != group {
            return Err(TreeError::invalid(format!(
                "tab {id} cannot move to another group"
            )));
        }
    }

    let new_depth = child_depth(registry, new_parent)?;
    let deepest = if with_subtree {
        new_depth + registry.subtree_height(id)?
    } else {
        new_depth
    };
    ensure_depth(deepest, max_depth)?;

    let promoted = if with_subtree {
        Vec::new()
    } else {
        promote_children(registry, id)?
    };
    registry.reparent(id, new_parent)?;
    Ok(promoted)
}

/// Hands the direct children of `id` to its parent, after the existing siblings.
pub fn promote_children(registry: &mut NodeRegistry, id: NodeId) -> TreeResult<Vec<NodeId>> {
    let node = registry.get_node(id)?;
    let parent = node.parent_id;
    let children = node.children.clone();
    for child in &children {
        registry.reparent(*child, parent)?;
    }
    Ok(children)
}

/// Places `id` right before or after `target`, renumbering the siblings `0..n`.
pub fn reorder_node(
    registry: &mut NodeRegistry,
    id: NodeId,
    target: NodeId,
    after: bool,
) -> TreeResult<()> {
    let node = registry.get_node(id)?;
    let target_node = registry.get_node(target)?;
    if id == target {
        return Err(TreeError::invalid(format!(
            "tab {id} cannot be placed next to itself"
        )));
    }
    if node.group_id != target_node.group_id || node.parent_id != target_node.parent_id {
        return Err(TreeError::NotSiblings { node: id, target });
    }

    let (group, parent) = (node.group_id, node.parent_id);
    let mut ordered: Vec<NodeId> = registry
        .sibling_ids(group, parent)?
        .iter()
        .copied()
        .filter(|s| *s != id)
        .collect();
    let index = ordered
        .iter()
        .position(|s| *s == target)
        .ok_or(TreeError::NotFound(target))?;
    ordered.insert(if after { index + 1 } else { index }, id);

    registry.resequence(group, parent, &ordered)
}

/// Deletes `id`, either with its subtree or promoting its children.
///
/// # Returns
/// Every removed tab id, `id` first.
pub fn delete_node(
    registry: &mut NodeRegistry,
    id: NodeId,
    with_subtree: bool,
) -> TreeResult<Vec<NodeId>> {
    let mut removed = vec![id];
    if with_subtree {
        removed.extend(registry.descendants(id)?);
        for victim in removed.iter().rev() {
            registry.remove_node(*victim)?;
        }
    } else {
        promote_children(registry, id)?;
        registry.remove_node(id)?;
    }
    Ok(removed)
}

/// Checks that a spec batch fits under `parent` without breaking the depth limit.
pub fn check_bulk_depth(
    registry: &NodeRegistry,
    parent: Option<NodeId>,
    specs: &[NodeSpec],
    max_depth: usize,
) -> TreeResult<()> {
    let base = child_depth(registry, parent)?;
    let tallest = specs.iter().map(NodeSpec::height).max().unwrap_or(0);
    ensure_depth(base + tallest, max_depth)
}

/// Inserts a spec forest under `parent`, all or nothing.
///
/// Top-level specs follow the existing siblings; nested children are
/// numbered from 0. `next_id` hands out fresh ids.
pub fn bulk_insert<F>(
    registry: &mut NodeRegistry,
    group: GroupId,
    parent: Option<NodeId>,
    specs: &[NodeSpec],
    max_depth: usize,
    next_id: &mut F,
) -> TreeResult<Vec<CreatedNode>>
where
    F: FnMut() -> NodeId,
{
    if let Some(parent_id) = parent {
        if registry.group_of(parent_id)? != group {
            return Err(TreeError::invalid(format!(
                "parent {parent_id} does not belong to group {group}"
            )));
        }
    }
    check_bulk_depth(registry, parent, specs, max_depth)?;

    let mut staged = registry.clone();
    let first = staged.next_order_index(group, parent)?;
    let created = insert_level(&mut staged, group, parent, specs, first, next_id)?;
    *registry = staged;
    Ok(created)
}

fn insert_level<F>(
    registry: &mut NodeRegistry,
    group: GroupId,
    parent: Option<NodeId>,
    specs: &[NodeSpec],
    first_order: i64,
    next_id: &mut F,
) -> TreeResult<Vec<CreatedNode>>
where
    F: FnMut() -> NodeId,
{
    let mut created = Vec::with_capacity(specs.len());
    for (offset, spec) in specs.iter().enumerate() {
        let id = next_id();
        let depth = registry
            .insert(NodeRecord {
                id,
                group_id: group,
                parent_id: parent,
                title: spec.title.clone(),
                url: spec.url.clone(),
                order_index: first_order + offset as i64,
            })?
            .depth;
        let children = insert_level(registry, group, Some(id), &spec.children, 0, next_id)?;
        created.push(CreatedNode {
            id,
            title: spec.title.clone(),
            depth,
            children,
        });
    }
    Ok(created)
}
