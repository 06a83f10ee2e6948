//! State holders for the tab tree engine.
//!
//! This module contains state-only logic:
//! - Node registry (canonical tab records and tree shape)
//! - Lock state (per-tab cascade flags)
//! - Interaction state (the in-flight drag gesture)

mod registry;
mod lock_state;
mod interaction;

pub use registry::NodeRegistry;
pub use lock_state::LockStateTracker;
pub use interaction::{DragSession, DragSnapshot, GesturePhase};
