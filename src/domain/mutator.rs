//! Gesture-driven and direct tree mutations for one group.
//!
//! The mutator owns the client-side view of a group: a registry mirror of
//! the store, the lock flags, the drag session and the drop classifier.
//! Every mutation follows the same path:
//!
//! 1. dry-run the change on a scratch copy of the registry, so structural
//!    errors surface before anything is sent
//! 2. issue the intent(s) through the [`ApiClient`]
//! 3. re-synchronize the registry from the [`TreeStore`]
//!
//! A cross-parent reorder needs two intents. Between them the registry is
//! re-synchronized and the dragged tab must be observed under its new
//! parent before the reorder is sent.

use std::collections::HashSet;
use std::sync::Arc;

use egui::{Pos2, Rect};
use tracing::{debug, info, warn};

use crate::domain::classifier::{DragClassifier, DragIntent, Placement};
use crate::domain::materializer::{flatten_rows, Materializer, PresentationNode, VisibleRow};
use crate::domain::{tree_operations, validation};
use crate::error::{TreeError, TreeResult};
use crate::model::{CreatedNode, NodeRecord, NodeSpec, NodeUpdate};
use crate::settings::Settings;
use crate::state::{DragSession, DragSnapshot, GesturePhase, LockStateTracker, NodeRegistry};
use crate::traits::{
    ApiClient, DeleteRequest, GroupId, MoveRequest, NodeId, ReorderRequest, TreeStore,
};

/// What a resolved drop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropOutcome {
    pub intent: DragIntent,
    /// Lock value captured when the drag started.
    pub with_subtree: bool,
    /// A move intent was sent.
    pub moved: bool,
    /// A reorder intent was sent.
    pub reordered: bool,
}

pub struct TreeMutator<C, S> {
    client: C,
    store: S,
    group: GroupId,
    settings: Settings,
    registry: NodeRegistry,
    locks: LockStateTracker,
    session: DragSession,
    classifier: DragClassifier,
    materializer: Materializer,
}

impl<C: ApiClient, S: TreeStore> TreeMutator<C, S> {
    /// Creates a mutator with an empty registry. Call [`sync`](Self::sync) to load it.
    pub fn new(client: C, store: S, group: GroupId, settings: Settings) -> Self {
        Self {
            client,
            store,
            group,
            settings,
            registry: NodeRegistry::new(),
            locks: LockStateTracker::new(),
            session: DragSession::new(),
            classifier: DragClassifier::new(),
            materializer: Materializer::new(),
        }
    }

    /// Creates a mutator and loads the group from the store.
    pub fn open(client: C, store: S, group: GroupId, settings: Settings) -> TreeResult<Self> {
        let mut mutator = Self::new(client, store, group, settings);
        mutator.sync()?;
        Ok(mutator)
    }

    // ===== Accessors =====

    pub fn group(&self) -> GroupId {
        self.group
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn locks(&self) -> &LockStateTracker {
        &self.locks
    }

    pub fn session(&self) -> &DragSession {
        &self.session
    }

    pub fn phase(&self) -> GesturePhase {
        self.session.phase()
    }

    /// The currently marked drop target, if any.
    pub fn drop_mark(&self) -> Option<DragIntent> {
        self.classifier.current()
    }

    // ===== Synchronization =====

    /// Replaces the registry mirror with the store's current forest.
    pub fn sync(&mut self) -> TreeResult<()> {
        let rows = self
            .store
            .fetch_forest(self.group)
            .map_err(|err| TreeError::remote("fetch forest", err))?;

        let before: HashSet<NodeId> = self.registry.ids().collect();
        self.registry.replace_group(self.group, rows)?;
        let vanished: Vec<NodeId> = before
            .into_iter()
            .filter(|id| !self.registry.contains(*id))
            .collect();
        self.locks.forget(vanished);
        self.materializer.invalidate();

        debug!(
            group = %self.group,
            tabs = self.registry.len(),
            revision = self.materializer.revision(),
            "registry synchronized"
        );
        Ok(())
    }

    /// Re-synchronizes after an acknowledged intent.
    ///
    /// If the store cannot be read, the locally predicted tree is adopted so
    /// the view still reflects the acknowledged change.
    fn settle(&mut self, predicted: NodeRegistry) {
        if let Err(err) = self.sync() {
            warn!(group = %self.group, "resync failed, using the predicted tree: {err}");
            self.adopt(predicted);
        }
    }

    fn adopt(&mut self, predicted: NodeRegistry) {
        self.registry = predicted;
        self.materializer.invalidate();
    }

    fn dry_run<F>(&self, apply: F) -> TreeResult<NodeRegistry>
    where
        F: FnOnce(&mut NodeRegistry, usize) -> TreeResult<()>,
    {
        let mut scratch = self.registry.clone();
        apply(&mut scratch, self.settings.max_depth)?;
        Ok(scratch)
    }

    // ===== Materialization =====

    /// Nested presentation forest of the group, cached until the next change.
    pub fn forest(&mut self) -> Arc<Vec<PresentationNode>> {
        self.materializer
            .forest(&self.registry, &self.locks, self.group)
    }

    pub fn rows(&mut self) -> Vec<VisibleRow> {
        flatten_rows(&self.forest())
    }

    // ===== Locks =====

    /// Lock flag of `id`, recording the locked default on first query.
    pub fn is_locked(&mut self, id: NodeId) -> TreeResult<bool> {
        self.registry.get_node(id)?;
        Ok(self.locks.is_locked(id))
    }

    /// Flips the lock flag of `id` and returns the new value.
    pub fn toggle_lock(&mut self, id: NodeId) -> TreeResult<bool> {
        self.registry.get_node(id)?;
        let locked = self.locks.toggle(id);
        self.materializer.invalidate();
        debug!(tab = %id, locked, "lock toggled");
        Ok(locked)
    }

    // ===== Drag Gesture =====

    /// Starts dragging `id`, capturing its parent and lock flag.
    pub fn begin_drag(&mut self, id: NodeId) -> TreeResult<DragSnapshot> {
        if !self.session.is_idle() {
            return Err(TreeError::GestureInFlight);
        }
        let original_parent = self.registry.get_node(id)?.parent_id;
        let snapshot = DragSnapshot {
            dragged: id,
            original_parent,
            locked: self.locks.is_locked(id),
        };
        self.session.begin(snapshot)?;
        self.classifier.clear();
        debug!(tab = %id, locked = snapshot.locked, "drag started");
        Ok(snapshot)
    }

    /// Classifies the pointer over `target`'s row and marks it as the drop target.
    pub fn hover(&mut self, target: NodeId, pointer: Pos2, row: Rect) -> TreeResult<Option<DragIntent>> {
        if !self.session.is_dragging() {
            return Err(TreeError::NoActiveGesture);
        }
        let dragged = self.session.dragged().ok_or(TreeError::NoActiveGesture)?;
        self.session.track_pointer(pointer);
        Ok(self.classifier.hover(dragged, target, pointer, row))
    }

    /// Aborts the gesture without side effects.
    pub fn cancel_drag(&mut self) {
        if !self.session.is_idle() {
            debug!(tab = ?self.session.dragged(), "drag cancelled");
        }
        self.session.reset();
        self.classifier.clear();
    }

    /// Handles the drop of the current gesture on the marked target.
    ///
    /// Gesture and classifier state are cleared whatever the outcome.
    pub fn end_drag(&mut self) -> TreeResult<DropOutcome> {
        let snapshot = match self.session.start_resolving() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.classifier.clear();
                return Err(err);
            }
        };
        let intent = self.classifier.take();
        let pointer = self.session.pointer();

        let result = match intent {
            Some(intent) => self.resolve(snapshot, intent),
            None => Err(TreeError::NoDropTarget),
        };

        self.session.reset();
        self.classifier.clear();

        match &result {
            Ok(outcome) => info!(
                tab = %snapshot.dragged,
                target = %outcome.intent.target,
                placement = ?outcome.intent.placement,
                with_subtree = outcome.with_subtree,
                pointer = ?pointer,
                "drop applied"
            ),
            Err(err) => warn!(tab = %snapshot.dragged, "drop rejected: {err}"),
        }
        result
    }

    fn resolve(&mut self, snapshot: DragSnapshot, intent: DragIntent) -> TreeResult<DropOutcome> {
        let dragged = snapshot.dragged;
        let with_subtree = snapshot.locked;
        let target_parent = self.registry.get_node(intent.target)?.parent_id;

        if !intent.placement.is_reorder() {
            let predicted = self.dry_run(|scratch, max_depth| {
                tree_operations::move_node(scratch, dragged, Some(intent.target), with_subtree, max_depth)
                    .map(|_| ())
            })?;
            self.client
                .move_node(
                    dragged,
                    &MoveRequest {
                        new_parent_id: Some(intent.target),
                        with_subtree,
                    },
                )
                .map_err(|err| TreeError::remote("move", err))?;
            self.settle(predicted);
            return Ok(DropOutcome {
                intent,
                with_subtree,
                moved: true,
                reordered: false,
            });
        }

        let after = intent.placement == Placement::After;
        let needs_move = snapshot.original_parent != target_parent;
        let moved = if needs_move {
            Some(self.dry_run(|scratch, max_depth| {
                tree_operations::move_node(scratch, dragged, target_parent, with_subtree, max_depth)
                    .map(|_| ())
            })?)
        } else {
            None
        };
        let predicted = self.dry_run(|scratch, max_depth| {
            if needs_move {
                tree_operations::move_node(scratch, dragged, target_parent, with_subtree, max_depth)?;
            }
            tree_operations::reorder_node(scratch, dragged, intent.target, after)
        })?;

        if let Some(moved) = &moved {
            self.client
                .move_node(
                    dragged,
                    &MoveRequest {
                        new_parent_id: target_parent,
                        with_subtree,
                    },
                )
                .map_err(|err| TreeError::remote("move", err))?;
            self.await_parent(dragged, target_parent, moved.clone())?;
        }

        let reorder = self.client.reorder(
            dragged,
            &ReorderRequest {
                target_node_id: intent.target,
                after,
            },
        );
        if let Err(err) = reorder {
            let Some(moved) = moved else {
                return Err(TreeError::remote("reorder", err));
            };
            if let Err(sync_err) = self.sync() {
                warn!(tab = %dragged, "resync after failed reorder also failed: {sync_err}");
                self.adopt(moved);
            }
            let conflict = TreeError::MutationConflict {
                node: dragged,
                message: format!("{err:#}"),
            };
            warn!(tab = %dragged, "{conflict}");
            return Err(conflict);
        }

        self.settle(predicted);
        Ok(DropOutcome {
            intent,
            with_subtree,
            moved: needs_move,
            reordered: true,
        })
    }

    /// Barrier between the two phases of a cross-parent reorder.
    ///
    /// Re-reads the store and checks that `id` now sits under `parent`.
    /// Any failure here happens after the move was applied, so it is a
    /// conflict rather than a clean rejection. When the store cannot be
    /// read, `moved` (the tree after the move alone) becomes the mirror.
    fn await_parent(
        &mut self,
        id: NodeId,
        parent: Option<NodeId>,
        moved: NodeRegistry,
    ) -> TreeResult<()> {
        if let Err(err) = self.sync() {
            warn!(tab = %id, "resync after move failed, using the predicted tree: {err}");
            self.adopt(moved);
            return Err(TreeError::MutationConflict {
                node: id,
                message: format!("move could not be confirmed: {err}"),
            });
        }
        let observed = self.registry.get_node(id).map(|n| n.parent_id);
        if observed != Ok(parent) {
            return Err(TreeError::MutationConflict {
                node: id,
                message: format!("expected parent {parent:?} after move, observed {observed:?}"),
            });
        }
        debug!(tab = %id, parent = ?parent, "move confirmed");
        Ok(())
    }

    // ===== Direct Mutations =====

    pub fn create_root(&mut self, title: &str, url: &str) -> TreeResult<NodeId> {
        validation::validate_title(title, &self.settings)?;
        validation::validate_url(url, &self.settings)?;

        let id = self
            .client
            .create_root(self.group, title, url)
            .map_err(|err| TreeError::remote("create root", err))?;
        let predicted = self.predict_new(id, None, title, url);
        self.settle(predicted);
        info!(tab = %id, group = %self.group, "root tab created");
        Ok(id)
    }

    pub fn create_child(&mut self, parent: NodeId, title: &str, url: &str) -> TreeResult<NodeId> {
        validation::validate_title(title, &self.settings)?;
        validation::validate_url(url, &self.settings)?;
        let depth = tree_operations::child_depth(&self.registry, Some(parent))?;
        tree_operations::ensure_depth(depth, self.settings.max_depth)?;

        let id = self
            .client
            .create_child(parent, title, url)
            .map_err(|err| TreeError::remote("create child", err))?;
        let predicted = self.predict_new(id, Some(parent), title, url);
        self.settle(predicted);
        info!(tab = %id, parent = %parent, "child tab created");
        Ok(id)
    }

    fn predict_new(&self, id: NodeId, parent: Option<NodeId>, title: &str, url: &str) -> NodeRegistry {
        let record = NodeRecord {
            id,
            group_id: self.group,
            parent_id: parent,
            title: title.to_string(),
            url: url.to_string(),
            order_index: 0,
        };
        self.dry_run(|scratch, max_depth| {
            tree_operations::append_node(scratch, record, max_depth).map(|_| ())
        })
        .unwrap_or_else(|_| self.registry.clone())
    }

    pub fn update_node(&mut self, id: NodeId, update: &NodeUpdate) -> TreeResult<()> {
        validation::validate_update(update, &self.settings)?;
        let predicted = self.dry_run(|scratch, _| scratch.update_fields(id, update).map(|_| ()))?;

        self.client
            .update(id, update)
            .map_err(|err| TreeError::remote("update", err))?;
        self.settle(predicted);
        info!(tab = %id, "tab updated");
        Ok(())
    }

    /// Moves `id` under `new_parent` (root level when `None`).
    pub fn move_node(
        &mut self,
        id: NodeId,
        new_parent: Option<NodeId>,
        with_subtree: bool,
    ) -> TreeResult<()> {
        let predicted = self.dry_run(|scratch, max_depth| {
            tree_operations::move_node(scratch, id, new_parent, with_subtree, max_depth).map(|_| ())
        })?;

        self.client
            .move_node(
                id,
                &MoveRequest {
                    new_parent_id: new_parent,
                    with_subtree,
                },
            )
            .map_err(|err| TreeError::remote("move", err))?;
        self.settle(predicted);
        info!(tab = %id, parent = ?new_parent, with_subtree, "tab moved");
        Ok(())
    }

    /// Moves `id` using its lock flag to decide whether the subtree follows.
    pub fn move_with_lock(&mut self, id: NodeId, new_parent: Option<NodeId>) -> TreeResult<()> {
        let with_subtree = self.is_locked(id)?;
        self.move_node(id, new_parent, with_subtree)
    }

    pub fn reorder_node(&mut self, id: NodeId, target: NodeId, after: bool) -> TreeResult<()> {
        let predicted = self.dry_run(|scratch, _| {
            tree_operations::reorder_node(scratch, id, target, after)
        })?;

        self.client
            .reorder(
                id,
                &ReorderRequest {
                    target_node_id: target,
                    after,
                },
            )
            .map_err(|err| TreeError::remote("reorder", err))?;
        self.settle(predicted);
        info!(tab = %id, target = %target, after, "tab reordered");
        Ok(())
    }

    /// Deletes `id` with its subtree, or promotes its children when `with_subtree` is false.
    pub fn delete_node(&mut self, id: NodeId, with_subtree: bool) -> TreeResult<()> {
        let mut removed = Vec::new();
        let predicted = self.dry_run(|scratch, _| {
            removed = tree_operations::delete_node(scratch, id, with_subtree)?;
            Ok(())
        })?;

        self.client
            .delete(id, &DeleteRequest { with_subtree })
            .map_err(|err| TreeError::remote("delete", err))?;
        self.locks.forget(removed.iter().copied());
        self.settle(predicted);
        info!(tab = %id, with_subtree, removed = removed.len(), "tab deleted");
        Ok(())
    }

    /// Deletes `id`, cascading when it is locked.
    pub fn delete_with_lock(&mut self, id: NodeId) -> TreeResult<()> {
        let with_subtree = self.is_locked(id)?;
        self.delete_node(id, with_subtree)
    }

    /// Creates a whole spec forest under `parent`, or nothing at all.
    pub fn bulk_insert(
        &mut self,
        parent: Option<NodeId>,
        specs: &[NodeSpec],
    ) -> TreeResult<Vec<CreatedNode>> {
        validation::validate_specs(specs, &self.settings)?;
        tree_operations::check_bulk_depth(&self.registry, parent, specs, self.settings.max_depth)?;

        let created = self
            .client
            .bulk_create(self.group, parent, specs)
            .map_err(|err| TreeError::remote("bulk create", err))?;

        let mut assigned = Vec::new();
        let mut stack: Vec<&CreatedNode> = created.iter().rev().collect();
        while let Some(node) = stack.pop() {
            assigned.push(node.id);
            stack.extend(node.children.iter().rev());
        }
        let mut ids = assigned.into_iter();
        let group = self.group;
        let predicted = self
            .dry_run(|scratch, max_depth| {
                let mut alloc = || ids.next().unwrap_or(NodeId(u64::MAX));
                tree_operations::bulk_insert(scratch, group, parent, specs, max_depth, &mut alloc)
                    .map(|_| ())
            })
            .unwrap_or_else(|_| self.registry.clone());
        self.settle(predicted);

        let count: usize = created.iter().map(CreatedNode::count).sum();
        info!(group = %self.group, parent = ?parent, count, "bulk insert applied");
        Ok(created)
    }
}
