//! In-process reference store.
//!
//! `MemoryStore` holds the authoritative tabs, groups and notes and answers
//! both [`ApiClient`] intents and [`TreeStore`] queries. Clones share one
//! state, so a test can hand a clone to a mutator and still inspect the
//! journal of received intents afterwards.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::bail;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::domain::{tree_operations, validation};
use crate::error::{TreeError, TreeResult};
use crate::io::snapshot::{Snapshot, SNAPSHOT_VERSION};
use crate::model::{Content, CreatedNode, Group, NodeRecord, NodeSpec, NodeUpdate};
use crate::settings::Settings;
use crate::state::NodeRegistry;
use crate::traits::{
    ApiClient, ContentId, DeleteRequest, GroupId, MoveRequest, NodeId, ReorderRequest, TreeStore,
};

/// Kinds of calls the store can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiCallKind {
    CreateRoot,
    CreateChild,
    Update,
    Move,
    Reorder,
    Delete,
    BulkCreate,
    FetchForest,
}

/// One applied intent, as recorded in the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    CreateRoot { group: GroupId, id: NodeId },
    CreateChild { parent: NodeId, id: NodeId },
    Update { id: NodeId, update: NodeUpdate },
    Move { id: NodeId, request: MoveRequest },
    Reorder { id: NodeId, request: ReorderRequest },
    Delete { id: NodeId, request: DeleteRequest },
    BulkCreate { group: GroupId, parent: Option<NodeId>, created: usize },
}

impl ApiCall {
    pub fn kind(&self) -> ApiCallKind {
        match self {
            ApiCall::CreateRoot { .. } => ApiCallKind::CreateRoot,
            ApiCall::CreateChild { .. } => ApiCallKind::CreateChild,
            ApiCall::Update { .. } => ApiCallKind::Update,
            ApiCall::Move { .. } => ApiCallKind::Move,
            ApiCall::Reorder { .. } => ApiCallKind::Reorder,
            ApiCall::Delete { .. } => ApiCallKind::Delete,
            ApiCall::BulkCreate { .. } => ApiCallKind::BulkCreate,
        }
    }
}

#[derive(Debug)]
struct StoreState {
    settings: Settings,
    groups: BTreeMap<GroupId, Group>,
    tabs: NodeRegistry,
    contents: BTreeMap<ContentId, Content>,
    /// Shared counter for group, tab and note ids.
    next_id: u64,
    journal: Vec<ApiCall>,
    fetches: usize,
    fail_next: Option<ApiCallKind>,
}

impl StoreState {
    fn new(settings: Settings) -> Self {
        Self {
            settings,
            groups: BTreeMap::new(),
            tabs: NodeRegistry::new(),
            contents: BTreeMap::new(),
            next_id: 1,
            journal: Vec::new(),
            fetches: 0,
            fail_next: None,
        }
    }

    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Consumes a pending injected failure for `kind`.
    fn check_injected(&mut self, kind: ApiCallKind) -> anyhow::Result<()> {
        if self.fail_next == Some(kind) {
            self.fail_next = None;
            bail!("injected {kind:?} failure");
        }
        Ok(())
    }

    fn require_group(&self, group: GroupId) -> TreeResult<()> {
        if self.groups.contains_key(&group) {
            Ok(())
        } else {
            Err(TreeError::GroupNotFound(group))
        }
    }

    fn touch_group(&mut self, group: GroupId) {
        if let Some(g) = self.groups.get_mut(&group) {
            g.updated_at = OffsetDateTime::now_utc();
        }
    }

    fn drop_contents_of(&mut self, tabs: &[NodeId]) {
        let gone: HashSet<NodeId> = tabs.iter().copied().collect();
        self.contents.retain(|_, c| !gone.contains(&c.tab_id));
    }

    fn new_tab(
        &mut self,
        group: GroupId,
        parent: Option<NodeId>,
        title: &str,
        url: &str,
    ) -> anyhow::Result<NodeId> {
        validation::validate_title(title, &self.settings)?;
        validation::validate_url(url, &self.settings)?;
        self.require_group(group)?;

        let id = NodeId(self.next_id);
        tree_operations::append_node(
            &mut self.tabs,
            NodeRecord {
                id,
                group_id: group,
                parent_id: parent,
                title: title.to_string(),
                url: url.to_string(),
                order_index: 0,
            },
            self.settings.max_depth,
        )?;
        self.next_id += 1;
        self.touch_group(group);
        Ok(id)
    }
}

/// Shared in-memory tab store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreState>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreState::new(settings))),
        }
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn settings(&self) -> Settings {
        self.state().settings.clone()
    }

    // ===== Groups =====

    pub fn create_group(&self, name: &str) -> TreeResult<Group> {
        let mut state = self.state();
        validation::validate_group_name(name, &state.settings)?;
        let now = OffsetDateTime::now_utc();
        let group = Group {
            id: GroupId(state.take_id()),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        state.groups.insert(group.id, group.clone());
        info!(group = %group.id, name, "group created");
        Ok(group)
    }

    pub fn rename_group(&self, id: GroupId, name: &str) -> TreeResult<Group> {
        let mut state = self.state();
        validation::validate_group_name(name, &state.settings)?;
        let group = state.groups.get_mut(&id).ok_or(TreeError::GroupNotFound(id))?;
        group.name = name.to_string();
        group.updated_at = OffsetDateTime::now_utc();
        Ok(group.clone())
    }

    /// Deletes a group with all of its tabs and their notes.
    ///
    /// # Returns
    /// The number of tabs removed.
    pub fn delete_group(&self, id: GroupId) -> TreeResult<usize> {
        let mut state = self.state();
        state.require_group(id)?;
        let tabs: Vec<NodeId> = state.tabs.records(id).iter().map(|r| r.id).collect();
        state.tabs.remove_group(id);
        state.drop_contents_of(&tabs);
        state.groups.remove(&id);
        info!(group = %id, tabs = tabs.len(), "group deleted");
        Ok(tabs.len())
    }

    pub fn group(&self, id: GroupId) -> TreeResult<Group> {
        self.state()
            .groups
            .get(&id)
            .cloned()
            .ok_or(TreeError::GroupNotFound(id))
    }

    pub fn groups(&self) -> Vec<Group> {
        self.state().groups.values().cloned().collect()
    }

    // ===== Notes =====

    pub fn add_content(&self, tab: NodeId, text: &str) -> TreeResult<Content> {
        let mut state = self.state();
        validation::validate_content(text)?;
        state.tabs.get_node(tab)?;
        let content = Content {
            id: ContentId(state.take_id()),
            tab_id: tab,
            text: text.to_string(),
        };
        state.contents.insert(content.id, content.clone());
        Ok(content)
    }

    pub fn update_content(&self, id: ContentId, text: &str) -> TreeResult<Content> {
        let mut state = self.state();
        validation::validate_content(text)?;
        let content = state
            .contents
            .get_mut(&id)
            .ok_or(TreeError::ContentNotFound(id))?;
        content.text = text.to_string();
        Ok(content.clone())
    }

    pub fn delete_content(&self, id: ContentId) -> TreeResult<Content> {
        self.state()
            .contents
            .remove(&id)
            .ok_or(TreeError::ContentNotFound(id))
    }

    pub fn contents_of(&self, tab: NodeId) -> Vec<Content> {
        self.state()
            .contents
            .values()
            .filter(|c| c.tab_id == tab)
            .cloned()
            .collect()
    }

    // ===== Inspection =====

    /// Intents applied so far, oldest first. Failed calls are not recorded.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.state().journal.clone()
    }

    pub fn clear_calls(&self) {
        self.state().journal.clear();
    }

    /// Number of forest fetches served.
    pub fn fetch_count(&self) -> usize {
        self.state().fetches
    }

    /// Makes the next call of `kind` fail without changing anything.
    pub fn fail_next(&self, kind: ApiCallKind) {
        self.state().fail_next = Some(kind);
    }

    /// Copy of the authoritative tab registry.
    pub fn registry(&self) -> NodeRegistry {
        self.state().tabs.clone()
    }

    pub fn node_count(&self, group: GroupId) -> usize {
        self.state().tabs.node_count(group)
    }

    // ===== Snapshots =====

    pub fn snapshot(&self) -> Snapshot {
        let state = self.state();
        let groups: Vec<Group> = state.groups.values().cloned().collect();
        let nodes = groups
            .iter()
            .flat_map(|g| state.tabs.records(g.id))
            .collect();
        Snapshot {
            version: SNAPSHOT_VERSION.to_string(),
            groups,
            nodes,
            contents: state.contents.values().cloned().collect(),
            next_id: state.next_id,
        }
    }

    /// Rebuilds a store from a snapshot, checking every cross reference.
    pub fn from_snapshot(snapshot: Snapshot, settings: Settings) -> anyhow::Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            bail!("unsupported snapshot version {:?}", snapshot.version);
        }

        let mut state = StoreState::new(settings);
        for group in snapshot.groups {
            state.groups.insert(group.id, group);
        }
        if let Some(orphan) = snapshot
            .nodes
            .iter()
            .find(|n| !state.groups.contains_key(&n.group_id))
        {
            bail!("tab {} refers to missing group {}", orphan.id, orphan.group_id);
        }
        state.tabs = NodeRegistry::from_records(snapshot.nodes)?;

        for content in snapshot.contents {
            if !state.tabs.contains(content.tab_id) {
                bail!("note {} refers to missing tab {}", content.id, content.tab_id);
            }
            state.contents.insert(content.id, content);
        }

        let highest = state
            .groups
            .keys()
            .map(|g| g.0)
            .chain(state.tabs.ids().map(|id| id.0))
            .chain(state.contents.keys().map(|c| c.0))
            .max()
            .unwrap_or(0);
        state.next_id = snapshot.next_id.max(highest + 1);

        debug!(
            groups = state.groups.len(),
            tabs = state.tabs.len(),
            "store restored from snapshot"
        );
        Ok(Self {
            inner: Arc::new(Mutex::new(state)),
        })
    }
}

impl ApiClient for MemoryStore {
    fn create_root(&self, group: GroupId, title: &str, url: &str) -> anyhow::Result<NodeId> {
        let mut state = self.state();
        state.check_injected(ApiCallKind::CreateRoot)?;
        let id = state.new_tab(group, None, title, url)?;
        state.journal.push(ApiCall::CreateRoot { group, id });
        Ok(id)
    }

    fn create_child(&self, parent: NodeId, title: &str, url: &str) -> anyhow::Result<NodeId> {
        let mut state = self.state();
        state.check_injected(ApiCallKind::CreateChild)?;
        let group = state.tabs.group_of(parent)?;
        let id = state.new_tab(group, Some(parent), title, url)?;
        state.journal.push(ApiCall::CreateChild { parent, id });
        Ok(id)
    }

    fn update(&self, id: NodeId, update: &NodeUpdate) -> anyhow::Result<()> {
        let mut state = self.state();
        state.check_injected(ApiCallKind::Update)?;
        validation::validate_update(update, &state.settings)?;
        let group = state.tabs.update_fields(id, update)?.group_id;
        state.touch_group(group);
        state.journal.push(ApiCall::Update {
            id,
            update: update.clone(),
        });
        Ok(())
    }

    fn move_node(&self, id: NodeId, request: &MoveRequest) -> anyhow::Result<()> {
        let mut state = self.state();
        state.check_injected(ApiCallKind::Move)?;
        let max_depth = state.settings.max_depth;
        let group = state.tabs.group_of(id)?;
        tree_operations::move_node(
            &mut state.tabs,
            id,
            request.new_parent_id,
            request.with_subtree,
            max_depth,
        )?;
        state.touch_group(group);
        state.journal.push(ApiCall::Move {
            id,
            request: *request,
        });
        Ok(())
    }

    fn reorder(&self, id: NodeId, request: &ReorderRequest) -> anyhow::Result<()> {
        let mut state = self.state();
        state.check_injected(ApiCallKind::Reorder)?;
        let group = state.tabs.group_of(id)?;
        tree_operations::reorder_node(&mut state.tabs, id, request.target_node_id, request.after)?;
        state.touch_group(group);
        state.journal.push(ApiCall::Reorder {
            id,
            request: *request,
        });
        Ok(())
    }

    fn delete(&self, id: NodeId, request: &DeleteRequest) -> anyhow::Result<()> {
        let mut state = self.state();
        state.check_injected(ApiCallKind::Delete)?;
        let group = state.tabs.group_of(id)?;
        let removed = tree_operations::delete_node(&mut state.tabs, id, request.with_subtree)?;
        state.drop_contents_of(&removed);
        state.touch_group(group);
        state.journal.push(ApiCall::Delete {
            id,
            request: *request,
        });
        Ok(())
    }

    fn bulk_create(
        &self,
        group: GroupId,
        parent: Option<NodeId>,
        specs: &[NodeSpec],
    ) -> anyhow::Result<Vec<CreatedNode>> {
        let mut guard = self.state();
        guard.check_injected(ApiCallKind::BulkCreate)?;
        guard.require_group(group)?;
        validation::validate_specs(specs, &guard.settings)?;

        let state = &mut *guard;
        let max_depth = state.settings.max_depth;
        let next_id = &mut state.next_id;
        let mut alloc = || {
            let id = NodeId(*next_id);
            *next_id += 1;
            id
        };
        let created = tree_operations::bulk_insert(
            &mut state.tabs,
            group,
            parent,
            specs,
            max_depth,
            &mut alloc,
        )?;

        let count = created.iter().map(CreatedNode::count).sum();
        state.touch_group(group);
        state.journal.push(ApiCall::BulkCreate {
            group,
            parent,
            created: count,
        });
        Ok(created)
    }
}

impl TreeStore for MemoryStore {
    fn fetch_forest(&self, group: GroupId) -> anyhow::Result<Vec<NodeRecord>> {
        let mut state = self.state();
        state.check_injected(ApiCallKind::FetchForest)?;
        state.require_group(group)?;
        state.fetches += 1;
        Ok(state.tabs.records(group))
    }
}
