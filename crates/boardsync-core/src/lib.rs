//! BoardSync Core Library
//!
//! Shape store, undo history, diffing, derived geometry and replication glue
//! for a collaborative drawing board. Rendering, input capture and the remote
//! channels themselves live outside this crate.

pub mod config;
pub mod containment;
pub mod diff;
pub mod drag;
pub mod geometry;
pub mod history;
pub mod live;
pub mod lock;
pub mod selection;
pub mod session;
pub mod shapes;
pub mod store;
pub mod sync;
pub mod throttle;

pub use config::SyncConfig;
pub use diff::{ShapeDiff, diff_shape_writes};
pub use drag::{DragCoordinator, DragOutcome, DragPhase, DragSink};
pub use geometry::{compute_connector_points, connector_pair_key, edge_intersection, get_shape_bounds};
pub use history::History;
pub use live::{FilteredDrags, LiveDragEntry, LiveDragOverlay, LiveDragPayload, filter_live_drags};
pub use lock::{LockGuard, LockRegistry};
pub use session::BoardSession;
pub use shapes::{Shape, ShapeId, ShapeKind, ShapePatch, ShapeUpdate};
pub use store::ObjectStore;
pub use sync::{
    DurableChange, DurableEvent, DurableRecord, DurableStore, DurableWrite, EphemeralChannel,
    SyncBridge, SyncError, TransportError,
};
pub use throttle::{ManualScheduler, Scheduler, Throttle, TimerId};
