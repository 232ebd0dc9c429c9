//! Coordinate nodes bound to simulated entities.

use std::fmt;

use smallvec::SmallVec;

use crate::axis::Position;
use crate::handle::NodeId;

/// Identifier of a simulated entity, as known to the network/entity layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// A coordinate node tracking a real entity.
///
/// Holds the entity's stored position and the boundary nodes ("watchers")
/// of every installed trigger anchored on it. Watchers are held by handle
/// only; the owning trigger controls their lifetime.
#[derive(Debug)]
pub struct EntityCoordinateNode {
    entity: EntityId,
    position: Position,
    watchers: SmallVec<[NodeId; 4]>,
}

impl EntityCoordinateNode {
    #[must_use]
    pub fn new(entity: EntityId, position: Position) -> Self {
        Self {
            entity,
            position,
            watchers: SmallVec::new(),
        }
    }

    #[must_use]
    pub const fn entity(&self) -> EntityId {
        self.entity
    }

    #[must_use]
    pub const fn position(&self) -> Position {
        self.position
    }

    pub(crate) fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    /// Boundary nodes watching this entity's motion.
    #[must_use]
    pub fn watchers(&self) -> &[NodeId] {
        &self.watchers
    }

    /// Register a watcher. Returns `false` if it was already registered.
    pub(crate) fn add_watcher_node(&mut self, node: NodeId) -> bool {
        if self.watchers.contains(&node) {
            return false;
        }
        self.watchers.push(node);
        true
    }

    /// Deregister a watcher. Returns `false` if it was not registered.
    pub(crate) fn del_watcher_node(&mut self, node: NodeId) -> bool {
        match self.watchers.iter().position(|&w| w == node) {
            Some(index) => {
                self.watchers.swap_remove(index);
                true
            }
            None => false,
        }
    }
}
