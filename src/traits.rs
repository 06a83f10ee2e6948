use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{CreatedNode, NodeRecord, NodeSpec, NodeUpdate};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Identifier of a tab (tree node).
    NodeId
);
id_type!(
    /// Identifier of a group owning one forest.
    GroupId
);
id_type!(
    /// Identifier of a note attached to a tab.
    ContentId
);

/// Payload of a move intent. `new_parent_id == None` moves the tab to the root level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub new_parent_id: Option<NodeId>,
    pub with_subtree: bool,
}

/// Payload of a reorder intent: place the tab next to `target_node_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderRequest {
    pub target_node_id: NodeId,
    pub after: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub with_subtree: bool,
}

/// Issues mutation intents to whatever holds the authoritative tree.
///
/// Implementations own transport, authentication and retries. A returned
/// `Ok` is the acknowledgement that the intent has been applied and that a
/// following [`TreeStore::fetch_forest`] observes it.
pub trait ApiClient {
    /// Creates a tab at the end of the group's root level.
    fn create_root(&self, group: GroupId, title: &str, url: &str) -> anyhow::Result<NodeId>;

    /// Creates a tab at the end of `parent`'s children.
    fn create_child(&self, parent: NodeId, title: &str, url: &str) -> anyhow::Result<NodeId>;

    fn update(&self, id: NodeId, update: &NodeUpdate) -> anyhow::Result<()>;

    /// Reparents a tab; `with_subtree == false` promotes its children to the old parent.
    fn move_node(&self, id: NodeId, request: &MoveRequest) -> anyhow::Result<()>;

    /// Repositions a tab among its current siblings.
    fn reorder(&self, id: NodeId, request: &ReorderRequest) -> anyhow::Result<()>;

    fn delete(&self, id: NodeId, request: &DeleteRequest) -> anyhow::Result<()>;

    /// Creates a whole spec forest in one call, preserving nesting and sibling order.
    fn bulk_create(
        &self,
        group: GroupId,
        parent: Option<NodeId>,
        specs: &[NodeSpec],
    ) -> anyhow::Result<Vec<CreatedNode>>;
}

/// Authoritative tree query, consumed once per synchronization cycle.
pub trait TreeStore {
    /// Returns every tab of the group as flat rows.
    fn fetch_forest(&self, group: GroupId) -> anyhow::Result<Vec<NodeRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_shapes_use_camel_case() {
        let json = serde_json::to_value(MoveRequest {
            new_parent_id: None,
            with_subtree: true,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"newParentId": null, "withSubtree": true}));

        let json = serde_json::to_value(ReorderRequest {
            target_node_id: NodeId(7),
            after: false,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"targetNodeId": 7, "after": false}));
    }

    #[test]
    fn ids_serialize_as_plain_numbers() {
        assert_eq!(serde_json::to_string(&NodeId(42)).unwrap(), "42");
        let id: GroupId = serde_json::from_str("9").unwrap();
        assert_eq!(id, GroupId(9));
        assert_eq!(ContentId(5).to_string(), "5");
    }
}
