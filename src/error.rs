//! Error taxonomy for tree mutations.
//!
//! Every variant except [`TreeError::MutationConflict`] means the registry and
//! the store were left exactly as they were before the failed call.

use thiserror::Error;

use crate::traits::{ContentId, GroupId, NodeId};

pub type TreeResult<T> = std::result::Result<T, TreeError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("tab {0} not found")]
    NotFound(NodeId),

    #[error("group {0} not found")]
    GroupNotFound(GroupId),

    #[error("content {0} not found")]
    ContentNotFound(ContentId),

    #[error("cannot place tab {node} under {target}: it is the tab itself or one of its descendants")]
    CycleDetected { node: NodeId, target: NodeId },

    #[error("validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("tab depth {depth} exceeds the limit of {max}")]
    DepthExceeded { depth: usize, max: usize },

    #[error("tabs {node} and {target} do not share a parent")]
    NotSiblings { node: NodeId, target: NodeId },

    #[error("tab {0} already exists")]
    DuplicateNode(NodeId),

    #[error("order index {index} is already used by a sibling of tab {node}")]
    OrderConflict { node: NodeId, index: i64 },

    #[error("tab {node} still has {children} children")]
    HasChildren { node: NodeId, children: usize },

    #[error("another drag gesture is still in flight")]
    GestureInFlight,

    #[error("no drag gesture is active")]
    NoActiveGesture,

    #[error("drop has no classified target")]
    NoDropTarget,

    #[error("{operation} failed: {message}")]
    Remote { operation: &'static str, message: String },

    #[error("tab {node} was moved but could not be reordered: {message}")]
    MutationConflict { node: NodeId, message: String },
}

impl TreeError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            reason: reason.into(),
        }
    }

    /// Wraps a collaborator failure. Tree errors raised by the collaborator
    /// itself are passed through unchanged.
    pub(crate) fn remote(operation: &'static str, err: anyhow::Error) -> Self {
        match err.downcast_ref::<TreeError>() {
            Some(inner) => inner.clone(),
            None => Self::Remote {
                operation,
                message: format!("{err:#}"),
            },
        }
    }

    /// Returns `true` when the store may hold a partially applied change.
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::MutationConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_partial() {
        let conflict = TreeError::MutationConflict {
            node: NodeId(3),
            message: "boom".into(),
        };
        assert!(conflict.is_partial());
        assert!(!TreeError::NotFound(NodeId(3)).is_partial());
        assert!(!TreeError::invalid("empty title").is_partial());
    }

    #[test]
    fn remote_keeps_context_chain() {
        let err = anyhow::anyhow!("connection reset").context("PUT /api/tabs/4/move");
        let err = TreeError::remote("move", err);
        assert_eq!(
            err.to_string(),
            "move failed: PUT /api/tabs/4/move: connection reset"
        );
    }

    #[test]
    fn remote_passes_tree_errors_through() {
        let err = anyhow::Error::new(TreeError::NotFound(NodeId(9)));
        assert_eq!(TreeError::remote("delete", err), TreeError::NotFound(NodeId(9)));
    }
}
