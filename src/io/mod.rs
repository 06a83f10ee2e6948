//! Reference store and snapshot persistence.

pub mod memory_store;
pub mod snapshot;

pub use memory_store::{ApiCall, ApiCallKind, MemoryStore};
pub use snapshot::{Snapshot, SNAPSHOT_VERSION};
