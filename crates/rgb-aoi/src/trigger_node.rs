//! Boundary markers of range triggers.
//!
//! A [`RangeTriggerNode`] sits in the axis sequences like any other node but
//! its coordinates are derived: origin position plus or minus the cached
//! range. Crossings reported to it are forwarded to the owning trigger while
//! the back-reference is set; once the trigger lets go the node goes quiet
//! and reports the sentinel position.

use std::fmt;

use tracing::debug;

use crate::axis::{Axis, Position};
use crate::coordinate_system::CoordinateSystem;
use crate::handle::{NodeId, TriggerId};
use crate::node::NodeState;
use crate::range_trigger::TriggerState;

/// Which edge of the trigger volume a boundary node marks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoundarySide {
    Positive,
    Negative,
}

impl BoundarySide {
    /// `1.0` for the high corner, `-1.0` for the low one.
    #[must_use]
    pub const fn sign(self) -> f32 {
        match self {
            Self::Positive => 1.0,
            Self::Negative => -1.0,
        }
    }
}

impl fmt::Display for BoundarySide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Positive => "+",
            Self::Negative => "-",
        })
    }
}

/// One boundary marker of a [`RangeTrigger`](crate::RangeTrigger).
#[derive(Debug)]
pub struct RangeTriggerNode {
    trigger: Option<TriggerId>,
    side: BoundarySide,
    range_xz: f32,
    range_y: f32,
    old_range_xz: f32,
    old_range_y: f32,
}

impl RangeTriggerNode {
    /// Boundary on `side` of `trigger`, not yet placed in any sequence.
    #[must_use]
    pub const fn new(trigger: TriggerId, side: BoundarySide, range_xz: f32, range_y: f32) -> Self {
        Self {
            trigger: Some(trigger),
            side,
            range_xz,
            range_y,
            old_range_xz: range_xz,
            old_range_y: range_y,
        }
    }

    /// Owning trigger, `None` once it uninstalled.
    #[must_use]
    pub const fn trigger(&self) -> Option<TriggerId> {
        self.trigger
    }

    pub(crate) fn set_trigger(&mut self, trigger: Option<TriggerId>) {
        self.trigger = trigger;
    }

    /// Which corner of the volume the node marks.
    #[must_use]
    pub const fn side(&self) -> BoundarySide {
        self.side
    }

    /// Cached horizontal range of the owning trigger.
    #[must_use]
    pub const fn range_xz(&self) -> f32 {
        self.range_xz
    }

    /// Cached vertical range of the owning trigger.
    #[must_use]
    pub const fn range_y(&self) -> f32 {
        self.range_y
    }

    /// Horizontal range before the last resize.
    #[must_use]
    pub const fn old_range_xz(&self) -> f32 {
        self.old_range_xz
    }

    /// Vertical range before the last resize.
    #[must_use]
    pub const fn old_range_y(&self) -> f32 {
        self.old_range_y
    }

    pub(crate) fn set_range(&mut self, range_xz: f32, range_y: f32) {
        self.old_range_xz = self.range_xz;
        self.old_range_y = self.range_y;
        self.range_xz = range_xz;
        self.range_y = range_y;
    }

    /// Forget the previous range once the boundary has been re-sorted.
    pub(crate) fn settle(&mut self) {
        self.old_range_xz = self.range_xz;
        self.old_range_y = self.range_y;
    }

    /// Offset from the origin on `axis`.
    #[must_use]
    pub fn offset(&self, axis: Axis) -> f32 {
        let range = if axis.is_horizontal() {
            self.range_xz
        } else {
            self.range_y
        };
        self.side.sign() * range
    }

    /// Position derived from the origin's position.
    #[must_use]
    pub fn derive(&self, origin: Position) -> Position {
        if self.trigger.is_none() {
            return Position::SENTINEL;
        }
        Position::new(
            origin.x + self.offset(Axis::X),
            origin.y + self.offset(Axis::Y),
            origin.z + self.offset(Axis::Z),
        )
    }
}

impl CoordinateSystem {
    /// Derived position of a boundary node, or the sentinel when it is no
    /// longer attached to a live origin.
    pub(crate) fn boundary_position(&self, node: NodeId) -> Position {
        let Some(coord) = self.nodes.get(node) else {
            return Position::SENTINEL;
        };
        if coord.state != NodeState::Live {
            return Position::SENTINEL;
        }
        let Some(boundary) = coord.as_boundary() else {
            return Position::SENTINEL;
        };
        let Some(trigger) = boundary.trigger().and_then(|t| self.triggers.get(t)) else {
            return Position::SENTINEL;
        };
        match self.nodes.get(trigger.origin()).and_then(|n| n.as_entity()) {
            Some(origin) => boundary.derive(origin.position()),
            None => Position::SENTINEL,
        }
    }

    /// Forward a crossing to the owning trigger.
    ///
    /// Quiet when the node is no longer live or its trigger already let go.
    pub(crate) fn boundary_node_pass(&mut self, axis: Axis, node: NodeId, other: NodeId, is_front: bool) {
        let Some(coord) = self.nodes.get(node) else {
            return;
        };
        if coord.state != NodeState::Live {
            return;
        }
        let Some(trigger) = coord.as_boundary().and_then(RangeTriggerNode::trigger) else {
            return;
        };
        self.trigger_node_pass(trigger, axis, node, other, is_front);
    }

    /// The origin of a boundary node is being torn down.
    ///
    /// Severs the trigger first, then unlinks the node unless a removal of
    /// it is already in flight.
    pub(crate) fn boundary_parent_remove(&mut self, node: NodeId, parent: NodeId) {
        let trigger = self
            .nodes
            .get(node)
            .and_then(|n| n.as_boundary())
            .and_then(RangeTriggerNode::trigger);

        if let Some(trigger) = trigger {
            debug!(%node, %parent, %trigger, "origin removed, uninstalling trigger");
            self.uninstall(trigger);
        }

        if self.nodes.get(node).is_some_and(|n| n.state == NodeState::Live) {
            self.remove(node);
        }
    }

    /// Drop the back-reference of a boundary node and deregister it from its
    /// origin's watchers. The node stays where it is.
    pub(crate) fn detach_boundary(&mut self, node: NodeId) -> Option<TriggerId> {
        let previous = self
            .nodes
            .get_mut(node)
            .and_then(|n| n.as_boundary_mut())
            .and_then(|b| {
                let previous = b.trigger();
                b.set_trigger(None);
                previous
            })?;

        if let Some(origin) = self.triggers.get(previous).map(|t| t.origin()) {
            if let Some(entity) = self.nodes.get_mut(origin).and_then(|n| n.as_entity_mut()) {
                entity.del_watcher_node(node);
            }
        }
        Some(previous)
    }

    /// Re-point a boundary node at another trigger.
    ///
    /// The node is deregistered from the old trigger's origin before it is
    /// registered with the new one, so it never watches two origins. With
    /// `None` the node is detached and removed. With `Some`, the target
    /// trigger must be installed; the node replaces whatever boundary that
    /// trigger had on the same side and is re-sorted at its new derived
    /// position. A trigger left without one of its boundaries uninstalls.
    pub fn set_range_trigger(&mut self, node: NodeId, trigger: Option<TriggerId>) -> bool {
        let Some(boundary) = self.nodes.get(node).filter(|n| n.is_live()).and_then(|n| n.as_boundary()) else {
            return false;
        };
        let side = boundary.side();
        let old = boundary.trigger();

        if old == trigger {
            return true;
        }

        let new_origin = match trigger {
            Some(t) => match self.triggers.get(t) {
                Some(rt) if rt.state() == TriggerState::Installed => Some((t, rt.origin(), rt.range_xz(), rt.range_y())),
                _ => return false,
            },
            None => None,
        };

        self.enter_mutation();
        if let Some(old) = old {
            self.detach_boundary(node);
            if let Some(rt) = self.triggers.get_mut(old) {
                if rt.boundary(side) == Some(node) {
                    rt.set_boundary(side, None);
                }
            }
            self.uninstall(old);
        }

        let Some((new, origin, range_xz, range_y)) = new_origin else {
            self.remove(node);
            self.exit_mutation();
            return true;
        };

        if let Some(replaced) = self.triggers.get(new).and_then(|rt| rt.boundary(side)) {
            self.detach_boundary(replaced);
            self.remove(replaced);
        }

        if let Some(coord) = self.nodes.get_mut(node) {
            coord.parent = Some(origin);
            if let Some(b) = coord.as_boundary_mut() {
                b.set_trigger(Some(new));
                b.set_range(range_xz, range_y);
            }
        }
        if let Some(entity) = self.nodes.get_mut(origin).and_then(|n| n.as_entity_mut()) {
            entity.add_watcher_node(node);
        }
        if let Some(rt) = self.triggers.get_mut(new) {
            rt.set_boundary(side, Some(node));
        }

        self.move_group(&[node]);
        self.exit_mutation();
        debug!(%node, %new, "boundary node re-pointed");
        true
    }
}
