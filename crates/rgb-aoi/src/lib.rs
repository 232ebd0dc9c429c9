#![allow(clippy::float_cmp)]
#![allow(clippy::missing_panics_doc)]

//! RGB AOI - Area-of-Interest index for the simulation tick loop.
//!
//! Tracks entity positions in three sorted axis sequences and detects the
//! exact moment an entity enters or leaves the range of a watcher, without
//! recomputing pairwise distances.
//!
//! # Key Concepts
//!
//! - **Entity node**: a point tracking a simulated entity
//! - **Range trigger**: a proximity watch anchored on an entity node
//! - **Boundary node**: one of the two markers of a trigger, positioned at
//!   `origin ± range` and sorted alongside entity nodes
//! - **Crossing**: two nodes swapping places in an axis sequence
//!
//! # Data Flow
//!
//! ```text
//! tick loop ─ update_position(node) ─┬─ re-sort x, z, y sequences
//!                                    ├─ crossing(entity, boundary)
//!                                    └─ trigger: containment changed?
//!                                          └─ AoiEvent { watcher, observed, Entered | Left }
//! ```
//!
//! # Example
//!
//! ```
//! use rgb_aoi::{AoiConfig, AoiEventKind, CoordinateSystem, EntityId, Position};
//!
//! let mut space = CoordinateSystem::new(AoiConfig::default());
//! let e = space.insert_entity(EntityId(1), Position::new(0.0, 0.0, 0.0)).unwrap();
//! let f = space.insert_entity(EntityId(2), Position::new(20.0, 0.0, 0.0)).unwrap();
//! let trigger = space.watch(e, 10.0, 5.0).unwrap();
//!
//! space.update_position(f, 5.0, 0.0, 0.0);
//! let events = space.drain_events();
//! assert_eq!(events.len(), 1);
//! assert_eq!(events[0].kind, AoiEventKind::Entered);
//! assert!(space.contains(trigger, f));
//! ```

mod axis;
mod config;
mod coordinate_system;
mod entity_node;
mod error;
mod event;
mod handle;
mod node;
mod range_trigger;
mod trigger_node;

pub use axis::{Axis, AxisKey, Position, SENTINEL};
pub use config::AoiConfig;
pub use coordinate_system::{AxisIter, CoordinateSystem};
pub use entity_node::{EntityCoordinateNode, EntityId};
pub use error::{AoiError, AoiResult, check_range};
pub use event::{AoiEvent, AoiEventKind, EventQueue};
pub use handle::{Arena, Generation, NodeId, RawHandle, TriggerId};
pub use node::{CoordinateNode, NodeFlags, NodeKind, NodeState};
pub use range_trigger::{RangeTrigger, TriggerState};
pub use trigger_node::{BoundarySide, RangeTriggerNode};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        AoiConfig, AoiEvent, AoiEventKind, Axis, CoordinateSystem, EntityId, NodeId, Position,
        TriggerId, TriggerState,
    };
}
