//! Drag gesture state.
//!
//! This module encapsulates the state of one in-flight drag: which tab is
//! being dragged, what the tree looked like when the drag started, and
//! which phase the gesture is in.

use crate::error::{TreeError, TreeResult};
use crate::traits::NodeId;

/// Lifecycle of a drag gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GesturePhase {
    #[default]
    Idle,
    Dragging,
    /// Drop received; intents are being issued.
    Resolving,
}

/// Tree facts captured at drag start.
///
/// Drop handling reads these instead of the live tree, which may have been
/// refreshed while the pointer was moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragSnapshot {
    pub dragged: NodeId,
    pub original_parent: Option<NodeId>,
    pub locked: bool,
}

/// State of the current drag gesture.
///
/// Responsibilities:
/// - Enforcing one gesture at a time
/// - Holding the drag-start snapshot until the drop is resolved
/// - Tracking the last pointer position for hover reclassification
#[derive(Debug, Clone, Default)]
pub struct DragSession {
    phase: GesturePhase,
    snapshot: Option<DragSnapshot>,
    pointer: Option<egui::Pos2>,
}

impl DragSession {
    pub fn new() -> Self {
        Self {
            phase: GesturePhase::Idle,
            snapshot: None,
            pointer: None,
        }
    }

    /// Resets to idle, discarding any snapshot.
    pub fn reset(&mut self) {
        self.phase = GesturePhase::Idle;
        self.snapshot = None;
        self.pointer = None;
    }

    // ===== Queries =====

    pub fn phase(&self) -> GesturePhase {
        self.phase
    }

    pub fn is_dragging(&self) -> bool {
        self.phase == GesturePhase::Dragging
    }

    pub fn is_idle(&self) -> bool {
        self.phase == GesturePhase::Idle
    }

    pub fn snapshot(&self) -> Option<&DragSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn dragged(&self) -> Option<NodeId> {
        self.snapshot.map(|s| s.dragged)
    }

    pub fn pointer(&self) -> Option<egui::Pos2> {
        self.pointer
    }

    // ===== Transitions =====

    /// Starts a gesture.
    ///
    /// # Errors
    /// `GestureInFlight` unless the session is idle.
    pub fn begin(&mut self, snapshot: DragSnapshot) -> TreeResult<()> {
        if self.phase != GesturePhase::Idle {
            return Err(TreeError::GestureInFlight);
        }
        self.phase = GesturePhase::Dragging;
        self.snapshot = Some(snapshot);
        self.pointer = None;
        Ok(())
    }

    pub fn track_pointer(&mut self, pos: egui::Pos2) {
        if self.is_dragging() {
            self.pointer = Some(pos);
        }
    }

    /// Moves a dragging gesture into resolution and hands back its snapshot.
    pub fn start_resolving(&mut self) -> TreeResult<DragSnapshot> {
        match (self.phase, self.snapshot) {
            (GesturePhase::Dragging, Some(snapshot)) => {
                self.phase = GesturePhase::Resolving;
                Ok(snapshot)
            }
            (GesturePhase::Resolving, _) => Err(TreeError::GestureInFlight),
            _ => Err(TreeError::NoActiveGesture),
        }
    }
}
