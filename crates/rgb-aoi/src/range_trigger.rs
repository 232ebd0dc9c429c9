//! Proximity watches anchored on entity nodes.
//!
//! A trigger is a box of half-extent `range_xz` horizontally and `range_y`
//! vertically, centred on its origin. It is represented in the index by two
//! boundary nodes sitting at the box's low and high corners. An entity is
//! inside when, on every tracked axis, it sorts strictly between the two.
//! Only crossings with one of the boundaries can change that, so the trigger
//! re-evaluates containment there and raises an event on every transition.

use hashbrown::HashSet;
use tracing::{debug, trace};

use crate::axis::Axis;
use crate::coordinate_system::CoordinateSystem;
use crate::entity_node::EntityId;
use crate::error::{AoiError, AoiResult, check_range};
use crate::event::{AoiEvent, AoiEventKind};
use crate::handle::{NodeId, TriggerId};
use crate::node::{CoordinateNode, NodeFlags, NodeKind, NodeState};
use crate::trigger_node::{BoundarySide, RangeTriggerNode};

/// Install state of a trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TriggerState {
    Uninstalled,
    Installed,
}

/// One proximity watch.
#[derive(Debug)]
pub struct RangeTrigger {
    origin: NodeId,
    range_xz: f32,
    range_y: f32,
    state: TriggerState,
    positive: Option<NodeId>,
    negative: Option<NodeId>,
    /// Entity nodes currently inside.
    inside: HashSet<NodeId>,
}

impl RangeTrigger {
    fn new(origin: NodeId, range_xz: f32, range_y: f32) -> Self {
        Self {
            origin,
            range_xz,
            range_y,
            state: TriggerState::Uninstalled,
            positive: None,
            negative: None,
            inside: HashSet::new(),
        }
    }

    /// Entity node the trigger is centred on.
    #[must_use]
    pub const fn origin(&self) -> NodeId {
        self.origin
    }

    /// Horizontal half-extent.
    #[must_use]
    pub const fn range_xz(&self) -> f32 {
        self.range_xz
    }

    /// Vertical half-extent.
    #[must_use]
    pub const fn range_y(&self) -> f32 {
        self.range_y
    }

    /// Whether the boundaries are in the index.
    #[must_use]
    pub const fn state(&self) -> TriggerState {
        self.state
    }

    /// Shorthand for `state() == Installed`.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.state == TriggerState::Installed
    }

    /// Boundary node on `side`, while installed.
    #[must_use]
    pub const fn boundary(&self, side: BoundarySide) -> Option<NodeId> {
        match side {
            BoundarySide::Positive => self.positive,
            BoundarySide::Negative => self.negative,
        }
    }

    pub(crate) fn set_boundary(&mut self, side: BoundarySide, node: Option<NodeId>) {
        match side {
            BoundarySide::Positive => self.positive = node,
            BoundarySide::Negative => self.negative = node,
        }
    }

    /// Number of entities inside.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inside.len()
    }

    /// Whether no entity is inside.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inside.is_empty()
    }
}

impl CoordinateSystem {
    /// Create an uninstalled trigger anchored on entity node `origin`.
    pub fn add_trigger(&mut self, origin: NodeId, range_xz: f32, range_y: f32) -> AoiResult<TriggerId> {
        check_range(range_xz, range_y)?;
        let node = self
            .nodes
            .get(origin)
            .filter(|n| n.is_live())
            .ok_or(AoiError::UnknownNode(origin))?;
        if node.as_entity().is_none() {
            return Err(AoiError::NotAnEntity(origin));
        }

        let trigger = self.triggers.insert(RangeTrigger::new(origin, range_xz, range_y));
        self.anchored.entry(origin).or_default().push(trigger);
        Ok(trigger)
    }

    /// Create a trigger and install it right away.
    pub fn watch(&mut self, origin: NodeId, range_xz: f32, range_y: f32) -> AoiResult<TriggerId> {
        let trigger = self.add_trigger(origin, range_xz, range_y)?;
        self.install(trigger);
        Ok(trigger)
    }

    /// Install state, `None` once the trigger was destroyed.
    #[must_use]
    pub fn trigger_state(&self, trigger: TriggerId) -> Option<TriggerState> {
        self.triggers.get(trigger).map(RangeTrigger::state)
    }

    /// Put the trigger's boundaries into the index.
    ///
    /// Every entity already inside raises `Entered`. Returns `false` when the
    /// trigger is unknown, already installed, or its origin is gone; the
    /// trigger then stays as it was.
    pub fn install(&mut self, trigger: TriggerId) -> bool {
        let Some(rt) = self.triggers.get(trigger) else {
            return false;
        };
        if rt.state == TriggerState::Installed {
            return false;
        }
        let (origin, range_xz, range_y) = (rt.origin, rt.range_xz, rt.range_y);

        let origin_live = self
            .nodes
            .get(origin)
            .is_some_and(|n| n.is_live() && n.as_entity().is_some());
        if !origin_live {
            debug!(%trigger, %origin, "origin unresolved, trigger stays uninstalled");
            return false;
        }

        let mut boundaries = [None; 2];
        for (slot, (side, flag)) in [
            (BoundarySide::Positive, NodeFlags::POSITIVE_BOUNDARY),
            (BoundarySide::Negative, NodeFlags::NEGATIVE_BOUNDARY),
        ]
        .into_iter()
        .enumerate()
        {
            let seq = self.next_seq();
            let node = self.nodes.insert(CoordinateNode::new(
                NodeKind::Boundary(RangeTriggerNode::new(trigger, side, range_xz, range_y)),
                flag,
                seq,
                Some(origin),
            ));
            if let Some(entity) = self.nodes.get_mut(origin).and_then(|n| n.as_entity_mut()) {
                entity.add_watcher_node(node);
            }
            boundaries[slot] = Some(node);
        }
        let [Some(positive), Some(negative)] = boundaries else {
            return false;
        };

        if let Some(rt) = self.triggers.get_mut(trigger) {
            rt.positive = Some(positive);
            rt.negative = Some(negative);
            rt.state = TriggerState::Installed;
        }

        // Start both boundaries next to the origin and let them walk out.
        let anchor = self
            .nodes
            .get(origin)
            .filter(|n| n.is_linked(Axis::X))
            .map(|_| origin);
        self.link(positive, anchor);
        self.link(negative, anchor);
        self.move_group(&[positive, negative]);

        debug!(%trigger, %origin, range_xz, range_y, "trigger installed");
        self.check_invariants();
        true
    }

    /// Take the trigger's boundaries out of the index.
    ///
    /// Every entity inside raises `Left`, unless the origin itself is being
    /// removed. The boundary nodes lose their back-reference before they are
    /// unlinked, so a crossing delivered to them meanwhile is ignored.
    /// Idempotent: a second call raises nothing.
    pub fn uninstall(&mut self, trigger: TriggerId) -> bool {
        let Some(rt) = self.triggers.get_mut(trigger) else {
            return false;
        };
        if rt.state != TriggerState::Installed {
            return false;
        }
        rt.state = TriggerState::Uninstalled;
        let nodes = [rt.positive.take(), rt.negative.take()];
        let inside = core::mem::take(&mut rt.inside);
        let origin = rt.origin;

        let watcher = self
            .entity_of(origin)
            .filter(|_| self.nodes.get(origin).is_some_and(|n| n.is_live()));
        if let Some(watcher) = watcher {
            let mut observed: Vec<EntityId> = inside.iter().filter_map(|&n| self.entity_of(n)).collect();
            observed.sort_unstable();
            for observed in observed {
                debug!(%trigger, %watcher, %observed, "left on uninstall");
                self.push_event(AoiEvent {
                    trigger,
                    watcher,
                    observed,
                    kind: AoiEventKind::Left,
                });
            }
        }

        self.enter_mutation();
        for node in nodes.into_iter().flatten() {
            self.detach_boundary(node);
            self.remove(node);
        }
        self.exit_mutation();

        debug!(%trigger, dropped = inside.len(), "trigger uninstalled");
        true
    }

    /// Resize a trigger.
    ///
    /// When installed, the boundaries move by the difference and exactly the
    /// entities that end up on the other side of a boundary raise events.
    /// Returns whether the boundaries moved.
    pub fn set_range(&mut self, trigger: TriggerId, range_xz: f32, range_y: f32) -> AoiResult<bool> {
        check_range(range_xz, range_y)?;
        let rt = self
            .triggers
            .get_mut(trigger)
            .ok_or(AoiError::UnknownTrigger(trigger))?;
        rt.range_xz = range_xz;
        rt.range_y = range_y;
        if rt.state != TriggerState::Installed {
            return Ok(false);
        }

        let group: Vec<NodeId> = [rt.positive, rt.negative].into_iter().flatten().collect();
        for &node in &group {
            if let Some(boundary) = self.nodes.get_mut(node).and_then(|n| n.as_boundary_mut()) {
                boundary.set_range(range_xz, range_y);
            }
        }
        self.move_group(&group);

        debug!(%trigger, range_xz, range_y, "trigger resized");
        self.check_invariants();
        Ok(true)
    }

    /// Uninstall (if needed) and forget a trigger.
    pub fn destroy_trigger(&mut self, trigger: TriggerId) -> bool {
        self.uninstall(trigger);
        let Some(rt) = self.triggers.remove(trigger) else {
            return false;
        };
        if let Some(anchored) = self.anchored.get_mut(&rt.origin) {
            anchored.retain(|t| *t != trigger);
            if anchored.is_empty() {
                self.anchored.remove(&rt.origin);
            }
        }
        true
    }

    /// Whether `node` is currently inside `trigger`.
    #[must_use]
    pub fn contains(&self, trigger: TriggerId, node: NodeId) -> bool {
        self.triggers
            .get(trigger)
            .is_some_and(|rt| rt.inside.contains(&node))
    }

    /// Entities currently inside `trigger`, sorted.
    #[must_use]
    pub fn entities_in(&self, trigger: TriggerId) -> Vec<EntityId> {
        let Some(rt) = self.triggers.get(trigger) else {
            return Vec::new();
        };
        let mut entities: Vec<EntityId> = rt.inside.iter().filter_map(|&n| self.entity_of(n)).collect();
        entities.sort_unstable();
        entities
    }

    /// Triggers anchored on an entity node, in creation order.
    #[must_use]
    pub fn triggers_of(&self, origin: NodeId) -> Vec<TriggerId> {
        self.anchored
            .get(&origin)
            .map(|triggers| triggers.to_vec())
            .unwrap_or_default()
    }

    /// Containment test on committed sort keys.
    fn is_inside(&self, rt: &RangeTrigger, node: &CoordinateNode) -> bool {
        if node.state != NodeState::Live || node.is_hidden() {
            return false;
        }
        let (Some(positive), Some(negative)) = (
            rt.positive.and_then(|n| self.nodes.get(n)),
            rt.negative.and_then(|n| self.nodes.get(n)),
        ) else {
            return false;
        };

        Axis::ALL.into_iter().filter(|&a| self.tracks(a)).all(|axis| {
            let key = node.key(axis);
            negative.key(axis).before(key) && key.before(positive.key(axis))
        })
    }

    /// A node crossed one of `trigger`'s boundaries.
    pub(crate) fn trigger_node_pass(
        &mut self,
        trigger: TriggerId,
        axis: Axis,
        boundary: NodeId,
        other: NodeId,
        is_front: bool,
    ) {
        let Some(rt) = self.triggers.get(trigger) else {
            return;
        };
        if rt.state != TriggerState::Installed || other == rt.origin {
            return;
        }
        let Some(node) = self.nodes.get(other) else {
            return;
        };
        let Some(observed) = node.as_entity().map(|e| e.entity()) else {
            return;
        };

        let is_in = self.is_inside(rt, node);
        let was_in = rt.inside.contains(&other);
        trace!(%trigger, %axis, %boundary, %observed, is_front, was_in, is_in, "boundary crossed");
        if is_in == was_in {
            return;
        }

        let Some(watcher) = self.entity_of(rt.origin) else {
            return;
        };
        let kind = if is_in {
            AoiEventKind::Entered
        } else {
            AoiEventKind::Left
        };
        if let Some(rt) = self.triggers.get_mut(trigger) {
            if is_in {
                rt.inside.insert(other);
            } else {
                rt.inside.remove(&other);
            }
        }

        debug!(%trigger, %watcher, %observed, %kind, "aoi transition");
        self.push_event(AoiEvent {
            trigger,
            watcher,
            observed,
            kind,
        });
    }
}
