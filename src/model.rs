//! Tab, group and content records plus the bulk-insert spec tree.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::traits::{ContentId, GroupId, NodeId};

/// Canonical tab record held by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub group_id: GroupId,
    pub parent_id: Option<NodeId>,
    pub title: String,
    pub url: String,
    pub order_index: i64,
    /// Derived: 0 for roots, parent depth + 1 otherwise.
    pub depth: usize,
    /// Child ids sorted by `order_index`.
    pub children: Vec<NodeId>,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn to_record(&self) -> NodeRecord {
        NodeRecord {
            id: self.id,
            group_id: self.group_id,
            parent_id: self.parent_id,
            title: self.title.clone(),
            url: self.url.clone(),
            order_index: self.order_index,
        }
    }
}

/// Flat tab row as served by a [`TreeStore`](crate::TreeStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    pub id: NodeId,
    pub group_id: GroupId,
    pub parent_id: Option<NodeId>,
    pub title: String,
    pub url: String,
    pub order_index: i64,
}

/// Input to [`NodeRegistry::insert`](crate::NodeRegistry::insert).
pub type NewNode = NodeRecord;

/// Partial edit of a tab's fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl NodeUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.url.is_none()
    }
}

/// One entry of a bulk-insert request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub children: Vec<NodeSpec>,
}

impl NodeSpec {
    pub fn leaf(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<NodeSpec>) -> Self {
        self.children = children;
        self
    }

    /// Number of tabs this spec creates, itself included.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(NodeSpec::count).sum::<usize>()
    }

    /// Height of the spec tree; 0 for a leaf.
    pub fn height(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.height() + 1)
            .max()
            .unwrap_or(0)
    }
}

/// Ids assigned by a bulk create, mirroring the spec's nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedNode {
    pub id: NodeId,
    pub title: String,
    pub depth: usize,
    #[serde(default)]
    pub children: Vec<CreatedNode>,
}

impl CreatedNode {
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(CreatedNode::count).sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Free-text note attached to a tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    pub id: ContentId,
    pub tab_id: NodeId,
    pub text: String,
}
