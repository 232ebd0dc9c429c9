//! Coordinate nodes: the entries of the axis sequences.
//!
//! A node is either a real entity ([`EntityCoordinateNode`]) or a trigger
//! boundary ([`RangeTriggerNode`]). The behaviour that differs per kind
//! (derived position, pass notification, parent removal) is dispatched by
//! [`CoordinateSystem`](crate::CoordinateSystem) with a `match` on
//! [`NodeKind`].

use bitflags::bitflags;

use crate::axis::{Axis, AxisKey, SENTINEL};
use crate::entity_node::EntityCoordinateNode;
use crate::handle::NodeId;
use crate::trigger_node::RangeTriggerNode;

bitflags! {
    /// Status and role bits of a node.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u16 {
        /// Excluded from the axis sequences.
        const HIDE = 1 << 0;
        /// Tracks a simulated entity.
        const ENTITY = 1 << 1;
        /// Upper boundary of a range trigger.
        const POSITIVE_BOUNDARY = 1 << 2;
        /// Lower boundary of a range trigger.
        const NEGATIVE_BOUNDARY = 1 << 3;
        /// Part of the group currently being moved.
        const MOVING = 1 << 4;
        /// Cached x committed but not yet re-sorted.
        const PENDING_X = 1 << 5;
        /// Cached y committed but not yet re-sorted.
        const PENDING_Y = 1 << 6;
        /// Cached z committed but not yet re-sorted.
        const PENDING_Z = 1 << 7;
        const PENDING = Self::PENDING_X.bits() | Self::PENDING_Y.bits() | Self::PENDING_Z.bits();
        const BOUNDARY = Self::POSITIVE_BOUNDARY.bits() | Self::NEGATIVE_BOUNDARY.bits();
    }
}

impl NodeFlags {
    /// Pending bit for one axis.
    #[must_use]
    pub const fn pending(axis: Axis) -> Self {
        match axis {
            Axis::X => Self::PENDING_X,
            Axis::Y => Self::PENDING_Y,
            Axis::Z => Self::PENDING_Z,
        }
    }
}

/// Lifecycle of a node.
///
/// `Live -> Removing -> Removed` is the only legal path; removal requests in
/// any other state are ignored, which is what makes cascading teardown safe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeState {
    Live,
    Removing,
    Removed,
}

/// Neighbours of a node in one axis sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Links {
    pub prev: Option<NodeId>,
    pub next: Option<NodeId>,
    pub linked: bool,
}

/// The closed set of node variants.
#[derive(Debug)]
pub enum NodeKind {
    Entity(EntityCoordinateNode),
    Boundary(RangeTriggerNode),
}

/// A positioned point in the index.
#[derive(Debug)]
pub struct CoordinateNode {
    pub(crate) kind: NodeKind,
    pub(crate) state: NodeState,
    pub(crate) flags: NodeFlags,
    /// Coordinate each axis sequence is currently sorted by.
    pub(crate) keys: [f32; 3],
    /// Insertion order, breaks ties between equal coordinates.
    pub(crate) seq: u64,
    pub(crate) links: [Links; 3],
    /// Structural parent: the origin entity node for boundaries, none for
    /// entities (owned directly by the coordinate system).
    pub(crate) parent: Option<NodeId>,
}

impl CoordinateNode {
    pub(crate) fn new(kind: NodeKind, flags: NodeFlags, seq: u64, parent: Option<NodeId>) -> Self {
        Self {
            kind,
            state: NodeState::Live,
            flags,
            keys: [SENTINEL; 3],
            seq,
            links: [Links::default(); 3],
            parent,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[must_use]
    pub const fn state(&self) -> NodeState {
        self.state
    }

    #[must_use]
    pub const fn flags(&self) -> NodeFlags {
        self.flags
    }

    #[must_use]
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state == NodeState::Live
    }

    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.flags.contains(NodeFlags::HIDE)
    }

    #[must_use]
    pub const fn is_linked(&self, axis: Axis) -> bool {
        self.links[axis.index()].linked
    }

    /// Sort key on `axis`.
    #[must_use]
    pub const fn key(&self, axis: Axis) -> AxisKey {
        AxisKey {
            value: self.keys[axis.index()],
            seq: self.seq,
        }
    }

    #[must_use]
    pub const fn as_entity(&self) -> Option<&EntityCoordinateNode> {
        match &self.kind {
            NodeKind::Entity(entity) => Some(entity),
            NodeKind::Boundary(_) => None,
        }
    }

    pub(crate) fn as_entity_mut(&mut self) -> Option<&mut EntityCoordinateNode> {
        match &mut self.kind {
            NodeKind::Entity(entity) => Some(entity),
            NodeKind::Boundary(_) => None,
        }
    }

    #[must_use]
    pub const fn as_boundary(&self) -> Option<&RangeTriggerNode> {
        match &self.kind {
            NodeKind::Boundary(boundary) => Some(boundary),
            NodeKind::Entity(_) => None,
        }
    }

    pub(crate) fn as_boundary_mut(&mut self) -> Option<&mut RangeTriggerNode> {
        match &mut self.kind {
            NodeKind::Boundary(boundary) => Some(boundary),
            NodeKind::Entity(_) => None,
        }
    }

    /// Short human-readable label used in logs.
    #[must_use]
    pub fn descr(&self) -> String {
        match &self.kind {
            NodeKind::Entity(entity) => format!("EntityCoordinateNode({})", entity.entity()),
            NodeKind::Boundary(boundary) => match self.parent {
                Some(origin) => format!("RangeTriggerNode(origin={origin}, {})", boundary.side()),
                None => format!("RangeTriggerNode(detached, {})", boundary.side()),
            },
        }
    }
}
