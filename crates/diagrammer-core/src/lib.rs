//! Diagrammer Core Library
//!
//! Platform-agnostic diagram engine: the graph document, viewport,
//! gesture recognition, movement constraints, undo/redo history and the
//! typed event bridge consumed by host UIs.

pub mod animation;
pub mod config;
pub mod constraints;
pub mod engine;
pub mod error;
pub mod events;
pub mod gesture;
pub mod graph;
pub mod history;
pub mod input;
pub mod scheduler;
pub mod selection;
pub mod shapes;
pub mod storage;
pub mod viewport;

pub use config::EngineConfig;
pub use constraints::{GridSettings, MovementConstraints};
pub use engine::DiagramEngine;
pub use error::{DiagramError, DiagramResult};
pub use events::{DiagramEvent, ElementMove, EventBus, EventType, Listener};
pub use gesture::{GestureIntent, GestureRecognizer};
pub use graph::{DocumentData, GraphModel, PatchOutcome};
pub use history::{History, Snapshotable};
pub use input::{Modifiers, MouseButton, PointerEvent, PointerId, PointerKind};
pub use scheduler::{FrameScheduler, ManualScheduler, SystemScheduler};
pub use selection::Selection;
pub use shapes::{
    Element, ElementConfig, ElementId, ElementPatch, Endpoint, Link, LinkConfig, LinkEnd, LinkId,
    Properties, ShapeRegistry,
};
pub use storage::{DocumentRecord, MemoryStorage, Storage, StorageError};

#[cfg(not(target_arch = "wasm32"))]
pub use storage::FileStorage;

#[cfg(target_arch = "wasm32")]
pub use storage::IndexedDbStorage;
pub use viewport::{ViewState, ViewportController};
