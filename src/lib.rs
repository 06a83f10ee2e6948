pub mod error;
pub mod model;
pub mod traits;
pub mod settings;
pub mod state;
pub mod domain;
pub mod cache;
pub mod io;

// Export collaborator traits and ids
pub use traits::{
    ApiClient, TreeStore,
    NodeId, GroupId, ContentId,
    MoveRequest, ReorderRequest, DeleteRequest
};

// Export records
pub use model::{Node, NodeRecord, NewNode, NodeUpdate, NodeSpec, CreatedNode, Group, Content};

// Export errors
pub use error::{TreeError, TreeResult};

// Export state holders
pub use state::{NodeRegistry, LockStateTracker, DragSession, DragSnapshot, GesturePhase};

// Export engine
pub use domain::classifier::{classify, DragClassifier, DragIntent, Placement};
pub use domain::materializer::{
    materialize, flatten_rows, render_outline,
    Materializer, PresentationNode, VisibleRow
};
pub use domain::mutator::{TreeMutator, DropOutcome};

// Export reference store and persistence
pub use io::{MemoryStore, ApiCall, ApiCallKind, Snapshot};

pub use settings::Settings;
