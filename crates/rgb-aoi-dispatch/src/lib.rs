#![allow(clippy::redundant_pub_crate)]

//! RGB AOI Dispatch
//!
//! Delivers the enter/leave events raised by an [`rgb_aoi::CoordinateSystem`]
//! to the entities that asked for them.
//!
//! # Flow
//!
//! ```text
//! Space::move_entity ─ CoordinateSystem (queues AoiEvent)
//! Space::tick(registry)
//!   └─ for each queued event, oldest first:
//!        ├─ observers of event.kind
//!        └─ registry.resolve(watcher) ─ deliver("on_enter_aoi" | "on_leave_aoi")
//! ```
//!
//! The registry is passed into every tick; an event whose watcher no longer
//! resolves is logged and counted as undelivered.
//!
//! # Example
//!
//! ```
//! use rgb_aoi::{AoiConfig, EntityId, Position};
//! use rgb_aoi_dispatch::{MapRegistry, ON_ENTER_AOI, Space};
//!
//! let mut space = Space::new(0, AoiConfig::default()).unwrap();
//! let mut registry = MapRegistry::new();
//! registry.register(EntityId(1));
//!
//! space.spawn(EntityId(1), Position::new(0.0, 0.0, 0.0)).unwrap();
//! space.spawn(EntityId(2), Position::new(3.0, 0.0, 0.0)).unwrap();
//! space.watch(EntityId(1), 10.0, 5.0).unwrap();
//!
//! let stats = space.tick(&mut registry);
//! assert_eq!(stats.entered, 1);
//! assert_eq!(registry.inbox(EntityId(1))[0].method, ON_ENTER_AOI);
//! ```

mod dispatch;
mod error;
mod observer;
mod registry;
mod space;

pub use dispatch::{DispatchOutcome, DispatchStats, Dispatcher};
pub use error::{DispatchError, DispatchResult};
pub use observer::{Observer, ObserverId, ObserverInfo};
pub use registry::{AoiArgs, Delivery, EntityRegistry, MapRegistry, ON_ENTER_AOI, ON_LEAVE_AOI};
pub use space::{Space, TickStats};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Dispatcher, EntityRegistry, MapRegistry, ObserverId, Space, TickStats, ON_ENTER_AOI,
        ON_LEAVE_AOI,
    };
}
