//! Sorted axis sequences and the update protocol.
//!
//! Every visible node is linked into one doubly linked sequence per tracked
//! axis, ordered by its cached coordinate on that axis (ties broken by
//! insertion order). Moving a node commits its new coordinates and then
//! walks it along each sequence, swapping past neighbours one at a time.
//! Every swap is a crossing and is reported to both nodes involved, in the
//! order the swaps happen.
//!
//! ```text
//!  x:  head ─ E1 ─ [T-] ─ E2 ─ O ─ E3 ─ [T+] ─ E4 ─ tail
//!                   └──────── trigger T on O ───────┘
//! ```
//!
//! Moving an entity also moves the boundary nodes of every trigger anchored
//! on it. The whole group commits first, then walks axis by axis (x, z, y).
//! While the group walks, members that have not been re-sorted yet are
//! skipped, and members never report crossings with each other.

use hashbrown::HashMap;
use smallvec::SmallVec;
use tracing::{debug, error, trace, warn};

use crate::axis::{Axis, AxisKey, Position, SENTINEL};
use crate::config::AoiConfig;
use crate::entity_node::{EntityCoordinateNode, EntityId};
use crate::error::{AoiError, AoiResult};
use crate::event::{AoiEvent, EventQueue};
use crate::handle::{Arena, NodeId, TriggerId};
use crate::node::{CoordinateNode, Links, NodeFlags, NodeKind, NodeState};
use crate::range_trigger::RangeTrigger;

/// A crossing as seen by the node that was notified.
#[cfg(test)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PassRecord {
    pub axis: Axis,
    pub receiver: NodeId,
    pub other: NodeId,
    pub is_front: bool,
}

/// The spatial index of one partition.
pub struct CoordinateSystem {
    pub(crate) config: AoiConfig,
    pub(crate) nodes: Arena<CoordinateNode, NodeId>,
    pub(crate) triggers: Arena<RangeTrigger, TriggerId>,
    /// Triggers by origin node, installed or not.
    pub(crate) anchored: HashMap<NodeId, SmallVec<[TriggerId; 2]>>,
    heads: [Option<NodeId>; 3],
    tails: [Option<NodeId>; 3],
    lens: [usize; 3],
    entities: HashMap<EntityId, NodeId>,
    next_seq: u64,
    /// Nesting of structural mutations; invariants are only checked once
    /// the outermost one finished.
    depth: u32,
    pub(crate) events: EventQueue,
    #[cfg(test)]
    pub(crate) passes: Vec<PassRecord>,
}

impl core::fmt::Debug for CoordinateSystem {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CoordinateSystem")
            .field("config", &self.config)
            .field("nodes", &self.nodes.len())
            .field("triggers", &self.triggers.len())
            .field("entities", &self.entities.len())
            .field("lens", &self.lens)
            .field("events", &self.events.len())
            .finish_non_exhaustive()
    }
}

impl Default for CoordinateSystem {
    fn default() -> Self {
        Self::new(AoiConfig::default())
    }
}

impl CoordinateSystem {
    /// Empty coordinate system.
    #[must_use]
    pub fn new(config: AoiConfig) -> Self {
        Self::with_capacity(config, 0)
    }

    /// Create a coordinate system with room for `capacity` nodes.
    #[must_use]
    pub fn with_capacity(config: AoiConfig, capacity: usize) -> Self {
        Self {
            config,
            nodes: Arena::with_capacity(capacity),
            triggers: Arena::new(),
            anchored: HashMap::new(),
            heads: [None; 3],
            tails: [None; 3],
            lens: [0; 3],
            entities: HashMap::with_capacity(capacity),
            next_seq: 0,
            depth: 0,
            events: EventQueue::new(),
            #[cfg(test)]
            passes: Vec::new(),
        }
    }

    /// Configuration the system was built with.
    #[must_use]
    pub const fn config(&self) -> &AoiConfig {
        &self.config
    }

    /// Whether `axis` has a maintained sequence.
    #[must_use]
    pub const fn tracks(&self, axis: Axis) -> bool {
        !matches!(axis, Axis::Y) || self.config.has_y
    }

    /// Number of nodes (entities and boundaries, hidden included).
    #[must_use]
    pub const fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of triggers, installed or not.
    #[must_use]
    pub const fn trigger_count(&self) -> usize {
        self.triggers.len()
    }

    /// Number of nodes linked into the sequence of `axis`.
    #[must_use]
    pub const fn axis_len(&self, axis: Axis) -> usize {
        self.lens[axis.index()]
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&CoordinateNode> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn trigger(&self, id: TriggerId) -> Option<&RangeTrigger> {
        self.triggers.get(id)
    }

    /// Coordinate node tracking `entity`.
    #[must_use]
    pub fn entity_node(&self, entity: EntityId) -> Option<NodeId> {
        self.entities.get(&entity).copied()
    }

    /// Entity tracked by `node`, if it is an entity node.
    #[must_use]
    pub fn entity_of(&self, node: NodeId) -> Option<EntityId> {
        self.nodes
            .get(node)
            .and_then(|n| n.as_entity())
            .map(EntityCoordinateNode::entity)
    }

    // ==================== Positions ====================

    /// Current position of a node, derived for boundary nodes.
    ///
    /// Removed or unknown nodes report [`Position::SENTINEL`].
    #[must_use]
    pub fn position(&self, id: NodeId) -> Position {
        let Some(node) = self.nodes.get(id) else {
            return Position::SENTINEL;
        };
        if node.state != NodeState::Live {
            return Position::SENTINEL;
        }
        match &node.kind {
            NodeKind::Entity(entity) => entity.position(),
            NodeKind::Boundary(_) => self.boundary_position(id),
        }
    }

    #[must_use]
    pub fn xx(&self, id: NodeId) -> f32 {
        self.position(id).x
    }

    #[must_use]
    pub fn yy(&self, id: NodeId) -> f32 {
        self.position(id).y
    }

    #[must_use]
    pub fn zz(&self, id: NodeId) -> f32 {
        self.position(id).z
    }

    fn key(&self, id: NodeId, axis: Axis) -> AxisKey {
        self.nodes.get(id).map_or(
            AxisKey {
                value: SENTINEL,
                seq: 0,
            },
            |n| n.key(axis),
        )
    }

    pub(crate) fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    // ==================== Sequence links ====================

    fn links(&self, id: NodeId, axis: Axis) -> Links {
        self.nodes
            .get(id)
            .map(|n| n.links[axis.index()])
            .unwrap_or_default()
    }

    fn links_mut(&mut self, id: NodeId, axis: Axis) -> Option<&mut Links> {
        self.nodes.get_mut(id).map(|n| &mut n.links[axis.index()])
    }

    /// Link `id` right after `anchor`, or at the head when there is none.
    fn link_after(&mut self, axis: Axis, id: NodeId, anchor: Option<NodeId>) {
        let a = axis.index();
        let next = match anchor {
            Some(anchor) => self.links(anchor, axis).next,
            None => self.heads[a],
        };
        self.link_between(axis, id, anchor, next);
    }

    /// Link `id` right before `anchor`, or at the tail when there is none.
    fn link_before(&mut self, axis: Axis, id: NodeId, anchor: Option<NodeId>) {
        let a = axis.index();
        let prev = match anchor {
            Some(anchor) => self.links(anchor, axis).prev,
            None => self.tails[a],
        };
        self.link_between(axis, id, prev, anchor);
    }

    fn link_between(&mut self, axis: Axis, id: NodeId, prev: Option<NodeId>, next: Option<NodeId>) {
        let a = axis.index();
        if let Some(links) = self.links_mut(id, axis) {
            debug_assert!(!links.linked, "node linked twice on {axis}");
            *links = Links {
                prev,
                next,
                linked: true,
            };
        } else {
            return;
        }

        match prev {
            Some(prev) => {
                if let Some(links) = self.links_mut(prev, axis) {
                    links.next = Some(id);
                }
            }
            None => self.heads[a] = Some(id),
        }
        match next {
            Some(next) => {
                if let Some(links) = self.links_mut(next, axis) {
                    links.prev = Some(id);
                }
            }
            None => self.tails[a] = Some(id),
        }
        self.lens[a] += 1;
    }

    fn unlink(&mut self, axis: Axis, id: NodeId) {
        let a = axis.index();
        let links = self.links(id, axis);
        if !links.linked {
            return;
        }

        match links.prev {
            Some(prev) => {
                if let Some(l) = self.links_mut(prev, axis) {
                    l.next = links.next;
                }
            }
            None => self.heads[a] = links.next,
        }
        match links.next {
            Some(next) => {
                if let Some(l) = self.links_mut(next, axis) {
                    l.prev = links.prev;
                }
            }
            None => self.tails[a] = links.prev,
        }
        if let Some(l) = self.links_mut(id, axis) {
            *l = Links::default();
        }
        self.lens[a] -= 1;
    }

    fn unlink_all(&mut self, id: NodeId) {
        for axis in Axis::ALL {
            self.unlink(axis, id);
        }
    }

    // ==================== Walking ====================

    /// Re-sort `id` on `axis` according to its committed key.
    ///
    /// Pending nodes are stepped over silently. Every other node passed is a
    /// crossing, reported in order.
    fn walk(&mut self, axis: Axis, id: NodeId) {
        let key = self.key(id, axis);
        let pending = NodeFlags::pending(axis);

        // Towards the head.
        let mut moved = false;
        let mut cursor = self.links(id, axis).prev;
        while let Some(c) = cursor {
            let Some(node) = self.nodes.get(c) else {
                break;
            };
            let prev = node.links[axis.index()].prev;
            if node.flags.contains(pending) {
                cursor = prev;
                continue;
            }
            if !node.key(axis).after(key) {
                break;
            }
            self.notify_pass(axis, id, c, false);
            moved = true;
            cursor = prev;
        }
        if moved {
            self.unlink(axis, id);
            self.link_after(axis, id, cursor);
            return;
        }

        // Towards the tail.
        let mut cursor = self.links(id, axis).next;
        while let Some(c) = cursor {
            let Some(node) = self.nodes.get(c) else {
                break;
            };
            let next = node.links[axis.index()].next;
            if node.flags.contains(pending) {
                cursor = next;
                continue;
            }
            if !node.key(axis).before(key) {
                break;
            }
            self.notify_pass(axis, id, c, true);
            moved = true;
            cursor = next;
        }
        if moved {
            self.unlink(axis, id);
            self.link_before(axis, id, cursor);
        }
    }

    /// `mover` just swapped with `other`; `is_front` when it moved towards
    /// increasing coordinates.
    fn notify_pass(&mut self, axis: Axis, mover: NodeId, other: NodeId, is_front: bool) {
        let same_group = self
            .nodes
            .get(other)
            .is_some_and(|n| n.flags.contains(NodeFlags::MOVING));
        if same_group {
            return;
        }

        trace!(%axis, %mover, %other, is_front, "node pass");
        self.on_node_pass(axis, other, mover, is_front);
        self.on_node_pass(axis, mover, other, !is_front);
    }

    /// Pass notification hook, dispatched on the receiver's kind.
    fn on_node_pass(&mut self, axis: Axis, receiver: NodeId, other: NodeId, is_front: bool) {
        #[cfg(test)]
        self.passes.push(PassRecord {
            axis,
            receiver,
            other,
            is_front,
        });

        let is_boundary = self
            .nodes
            .get(receiver)
            .is_some_and(|n| matches!(n.kind, NodeKind::Boundary(_)));
        if is_boundary {
            self.boundary_node_pass(axis, receiver, other, is_front);
        }
    }

    /// Commit the derived coordinates of every group member, then re-sort
    /// the group axis by axis.
    pub(crate) fn move_group(&mut self, group: &[NodeId]) {
        let tracked: SmallVec<[Axis; 3]> = Axis::ALL.into_iter().filter(|&a| self.tracks(a)).collect();
        for &id in group {
            let target = self.position(id);
            let Some(node) = self.nodes.get_mut(id) else {
                continue;
            };
            node.flags.insert(NodeFlags::MOVING);
            for &axis in &tracked {
                node.keys[axis.index()] = target.get(axis);
                if node.is_linked(axis) {
                    node.flags.insert(NodeFlags::pending(axis));
                }
            }
        }

        for axis in Axis::WALK_ORDER {
            if !self.tracks(axis) {
                continue;
            }
            for &id in group {
                let Some(node) = self.nodes.get_mut(id) else {
                    continue;
                };
                node.flags.remove(NodeFlags::pending(axis));
                if node.is_linked(axis) {
                    self.walk(axis, id);
                }
            }
        }

        for &id in group {
            if let Some(node) = self.nodes.get_mut(id) {
                node.flags.remove(NodeFlags::MOVING | NodeFlags::PENDING);
                if let Some(boundary) = node.as_boundary_mut() {
                    boundary.settle();
                }
            }
        }
    }

    /// Walk an entity node back to the sentinel so every trigger containing
    /// it sees it leave.
    fn retreat(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        node.keys = [SENTINEL; 3];
        node.flags.insert(NodeFlags::MOVING);

        for axis in Axis::WALK_ORDER {
            if self.nodes.get(id).is_some_and(|n| n.is_linked(axis)) {
                self.walk(axis, id);
            }
        }

        if let Some(node) = self.nodes.get_mut(id) {
            node.flags.remove(NodeFlags::MOVING);
        }
    }

    /// Link a node into every tracked sequence right after `anchor` (or at
    /// the head). The caller walks it to its rank.
    pub(crate) fn link(&mut self, id: NodeId, anchor: Option<NodeId>) {
        for axis in Axis::ALL {
            if !self.tracks(axis) {
                continue;
            }
            let anchor = anchor.filter(|&a| self.nodes.get(a).is_some_and(|n| n.is_linked(axis)));
            self.link_after(axis, id, anchor);
        }
    }

    /// Link a node at the head of every tracked sequence and walk it to its
    /// rank, as if it arrived from the sentinel.
    fn insert(&mut self, id: NodeId) {
        self.link(id, None);
        self.move_group(&[id]);
    }

    // ==================== Entities ====================

    /// Start tracking `entity` at `position`.
    ///
    /// Every installed trigger already covering `position` raises `Entered`.
    pub fn insert_entity(&mut self, entity: EntityId, position: Position) -> AoiResult<NodeId> {
        if !position.is_finite() {
            return Err(AoiError::NonFinitePosition(position));
        }
        if self.entities.contains_key(&entity) {
            return Err(AoiError::DuplicateEntity(entity));
        }

        let seq = self.next_seq();
        let id = self.nodes.insert(CoordinateNode::new(
            NodeKind::Entity(EntityCoordinateNode::new(entity, position)),
            NodeFlags::ENTITY,
            seq,
            None,
        ));
        self.entities.insert(entity, id);
        self.insert(id);

        debug!(%entity, node = %id, %position, "entity node inserted");
        self.check_invariants();
        Ok(id)
    }

    /// Move an entity node.
    ///
    /// Boundary nodes of triggers anchored on it follow. Returns `false`
    /// (and changes nothing) for removed, unknown or non-entity nodes and
    /// for non-finite coordinates.
    pub fn update_position(&mut self, id: NodeId, x: f32, y: f32, z: f32) -> bool {
        let position = Position::new(x, y, z);
        if !position.is_finite() {
            warn!(node = %id, %position, "ignoring non-finite position");
            return false;
        }

        let Some(node) = self.nodes.get_mut(id).filter(|n| n.state == NodeState::Live) else {
            debug!(node = %id, "update on removed node ignored");
            return false;
        };
        let hidden = node.is_hidden();
        let Some(entity) = node.as_entity_mut() else {
            warn!(node = %id, "boundary nodes follow their origin and cannot be moved directly");
            return false;
        };
        entity.set_position(position);
        let watchers: SmallVec<[NodeId; 8]> = entity.watchers().iter().copied().collect();

        // A hidden entity is unlinked, but its boundaries still follow it.
        let mut group: SmallVec<[NodeId; 8]> = SmallVec::new();
        if !hidden {
            group.push(id);
        }
        group.extend(watchers.into_iter().filter(|&n| self.is_attached_boundary(n)));

        self.move_group(&group);
        self.check_invariants();
        true
    }

    fn is_attached_boundary(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(|n| {
            n.is_live() && n.is_linked(Axis::X) && n.as_boundary().is_some_and(|b| b.trigger().is_some())
        })
    }

    /// Hide or reveal an entity node.
    ///
    /// Hiding walks the node out of every trigger (raising `Left`) and
    /// unlinks it; revealing links it back (raising `Entered`). The stored
    /// position keeps following [`update_position`](Self::update_position)
    /// while hidden.
    pub fn set_hidden(&mut self, id: NodeId, hidden: bool) -> bool {
        let Some(node) = self.nodes.get_mut(id).filter(|n| n.state == NodeState::Live) else {
            return false;
        };
        if node.as_entity().is_none() {
            return false;
        }
        if node.is_hidden() == hidden {
            return true;
        }

        if hidden {
            self.retreat(id);
            self.unlink_all(id);
            if let Some(node) = self.nodes.get_mut(id) {
                node.flags.insert(NodeFlags::HIDE);
            }
        } else {
            node.flags.remove(NodeFlags::HIDE);
            self.insert(id);
        }

        debug!(node = %id, hidden, "node visibility changed");
        self.check_invariants();
        true
    }

    /// Remove a node from the index.
    ///
    /// Removing an entity node destroys every trigger anchored on it, without
    /// raising `Left` for them, and raises `Left` on every other trigger that
    /// contained it. Removing a boundary node uninstalls its trigger. Safe to call repeatedly and from inside
    /// another removal: only the first call on a live node does anything.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        if node.state != NodeState::Live {
            return false;
        }
        node.state = NodeState::Removing;
        let descr = node.descr();
        self.depth += 1;

        match &node.kind {
            NodeKind::Entity(entity) => {
                let watchers: SmallVec<[NodeId; 4]> = entity.watchers().iter().copied().collect();
                let linked = node.is_linked(Axis::X);
                for watcher in watchers {
                    self.on_parent_remove(watcher, id);
                }
                if linked {
                    self.retreat(id);
                }
                for trigger in self.anchored.remove(&id).unwrap_or_default() {
                    self.destroy_trigger(trigger);
                }
            }
            NodeKind::Boundary(boundary) => {
                if let Some(trigger) = boundary.trigger() {
                    self.uninstall(trigger);
                }
            }
        }

        self.unlink_all(id);
        if let Some(node) = self.nodes.get_mut(id) {
            node.state = NodeState::Removed;
        }
        if let Some(node) = self.nodes.remove(id) {
            if let NodeKind::Entity(entity) = node.kind {
                self.entities.remove(&entity.entity());
            }
        }

        self.depth -= 1;
        debug!(node = %id, %descr, "node removed");
        self.check_invariants();
        true
    }

    /// Structural parent hook: `parent` is being removed.
    fn on_parent_remove(&mut self, child: NodeId, parent: NodeId) {
        let Some(node) = self.nodes.get(child) else {
            return;
        };
        match node.kind {
            NodeKind::Boundary(_) => self.boundary_parent_remove(child, parent),
            NodeKind::Entity(_) => {
                if node.state == NodeState::Live {
                    self.remove(child);
                }
            }
        }
    }

    // ==================== Events ====================

    pub(crate) fn push_event(&mut self, event: AoiEvent) {
        self.events.push(event);
    }

    /// Take every event raised since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<AoiEvent> {
        self.events.drain().collect()
    }

    #[must_use]
    pub const fn pending_events(&self) -> &EventQueue {
        &self.events
    }

    // ==================== Queries ====================

    /// Nodes on `axis` in sequence order.
    pub fn axis_iter(&self, axis: Axis) -> AxisIter<'_> {
        AxisIter {
            system: self,
            axis,
            cursor: self.heads[axis.index()],
        }
    }

    /// Entities within `range_xz` horizontally and `range_y` vertically of
    /// `node`, found by scanning outward along the x sequence.
    #[must_use]
    pub fn entities_near(&self, node: NodeId, range_xz: f32, range_y: f32) -> Vec<EntityId> {
        let center = self.position(node);
        let Some(start) = self.nodes.get(node).filter(|n| n.is_linked(Axis::X)) else {
            return Vec::new();
        };

        let mut found = Vec::new();
        let mut visit = |id: NodeId| {
            if id == node {
                return;
            }
            let Some(n) = self.nodes.get(id) else {
                return;
            };
            let Some(entity) = n.as_entity() else {
                return;
            };
            let p = entity.position();
            let y_ok = !self.config.has_y || (p.y - center.y).abs() <= range_y;
            if (p.z - center.z).abs() <= range_xz && y_ok {
                found.push(entity.entity());
            }
        };

        let mut cursor = start.links[Axis::X.index()].prev;
        while let Some(id) = cursor {
            let Some(n) = self.nodes.get(id) else {
                break;
            };
            if center.x - n.keys[Axis::X.index()] > range_xz {
                break;
            }
            visit(id);
            cursor = n.links[Axis::X.index()].prev;
        }

        let mut cursor = start.links[Axis::X.index()].next;
        while let Some(id) = cursor {
            let Some(n) = self.nodes.get(id) else {
                break;
            };
            if n.keys[Axis::X.index()] - center.x > range_xz {
                break;
            }
            visit(id);
            cursor = n.links[Axis::X.index()].next;
        }

        found.sort_unstable();
        found
    }

    // ==================== Invariants ====================

    /// Check every sequence and back-reference invariant.
    pub fn validate(&self) -> AoiResult<()> {
        let corrupted = |axis: Axis, reason: String| Err(AoiError::Corrupted { axis, reason });

        let visible = self
            .nodes
            .iter()
            .filter(|(_, n)| n.is_live() && !n.is_hidden())
            .count();

        for axis in Axis::ALL {
            let a = axis.index();
            if !self.tracks(axis) {
                if self.lens[a] != 0 || self.heads[a].is_some() {
                    return corrupted(axis, "untracked axis has members".into());
                }
                continue;
            }

            let mut count = 0;
            let mut prev: Option<NodeId> = None;
            let mut cursor = self.heads[a];
            while let Some(id) = cursor {
                let Some(node) = self.nodes.get(id) else {
                    return corrupted(axis, format!("stale handle {id} in sequence"));
                };
                let links = node.links[a];
                if !links.linked || links.prev != prev {
                    return corrupted(axis, format!("broken links at {}", node.descr()));
                }
                if !node.is_live() || node.is_hidden() {
                    return corrupted(axis, format!("{} is linked but not visible", node.descr()));
                }
                if let Some(p) = prev {
                    if !self.key(p, axis).before(node.key(axis)) {
                        return corrupted(axis, format!("{} is out of order", node.descr()));
                    }
                }
                let derived = self.position(id).get(axis);
                if derived.to_bits() != node.keys[a].to_bits() {
                    return corrupted(
                        axis,
                        format!("{} sorted at {} but positioned at {derived}", node.descr(), node.keys[a]),
                    );
                }
                count += 1;
                prev = Some(id);
                cursor = links.next;
            }

            if self.tails[a] != prev {
                return corrupted(axis, "tail does not match last node".into());
            }
            if count != self.lens[a] || count != visible {
                return corrupted(
                    axis,
                    format!("{count} linked, length {}, {visible} visible", self.lens[a]),
                );
            }
        }

        for (trigger, rt) in self.triggers.iter() {
            if !self.nodes.contains(rt.origin()) {
                return corrupted(Axis::X, format!("{trigger} outlived its origin {}", rt.origin()));
            }
        }

        for (id, node) in self.nodes.iter() {
            match &node.kind {
                NodeKind::Boundary(boundary) => {
                    if boundary.trigger().is_some() != node.is_linked(Axis::X) {
                        return corrupted(
                            Axis::X,
                            format!("{} has trigger {:?} but linked={}", node.descr(), boundary.trigger(), node.is_linked(Axis::X)),
                        );
                    }
                }
                NodeKind::Entity(entity) => {
                    for &watcher in entity.watchers() {
                        let owner = self
                            .nodes
                            .get(watcher)
                            .and_then(|n| n.as_boundary())
                            .and_then(|b| b.trigger())
                            .and_then(|t| self.triggers.get(t))
                            .map(RangeTrigger::origin);
                        if owner != Some(id) {
                            return corrupted(
                                Axis::X,
                                format!("{} lists watcher {watcher} it does not own", node.descr()),
                            );
                        }
                    }
                }
            }
        }

        Ok(())
    }

    pub(crate) fn enter_mutation(&mut self) {
        self.depth += 1;
    }

    pub(crate) fn exit_mutation(&mut self) {
        self.depth -= 1;
        self.check_invariants();
    }

    pub(crate) fn check_invariants(&self) {
        if !self.config.validate_updates || self.depth > 0 {
            return;
        }
        let result = self.validate();
        if let Err(err) = &result {
            error!(%err, "coordinate system invariant violated");
        }
        debug_assert!(result.is_ok(), "coordinate system invariant violated");
    }
}

/// Iterator over one axis sequence.
pub struct AxisIter<'a> {
    system: &'a CoordinateSystem,
    axis: Axis,
    cursor: Option<NodeId>,
}

impl Iterator for AxisIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.cursor?;
        self.cursor = self.system.links(id, self.axis).next;
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::AoiEventKind;
    use crate::range_trigger::TriggerState;
    use crate::trigger_node::BoundarySide;

    fn system() -> CoordinateSystem {
        CoordinateSystem::new(AoiConfig {
            validate_updates: true,
            ..AoiConfig::default()
        })
    }

    fn entity(cs: &mut CoordinateSystem, id: u64, x: f32, y: f32, z: f32) -> NodeId {
        cs.insert_entity(EntityId(id), Position::new(x, y, z)).unwrap()
    }

    fn kinds(events: &[AoiEvent]) -> Vec<(u64, u64, AoiEventKind)> {
        events
            .iter()
            .map(|e| (e.watcher.0, e.observed.0, e.kind))
            .collect()
    }

    fn x_order(cs: &CoordinateSystem) -> Vec<f32> {
        cs.axis_iter(Axis::X).map(|id| cs.xx(id)).collect()
    }

    #[test]
    fn test_enter_then_leave_along_x() {
        let mut cs = system();
        let e = entity(&mut cs, 1, 0.0, 0.0, 0.0);
        let f = entity(&mut cs, 2, 20.0, 0.0, 0.0);
        let t = cs.watch(e, 10.0, 5.0).unwrap();
        assert!(cs.drain_events().is_empty());

        let positive = cs.trigger(t).unwrap().boundary(BoundarySide::Positive).unwrap();
        cs.passes.clear();
        assert!(cs.update_position(f, 5.0, 0.0, 0.0));

        assert_eq!(kinds(&cs.drain_events()), vec![(1, 2, AoiEventKind::Entered)]);
        assert!(cs.contains(t, f));
        assert_eq!(
            cs.passes,
            vec![
                PassRecord {
                    axis: Axis::X,
                    receiver: positive,
                    other: f,
                    is_front: false,
                },
                PassRecord {
                    axis: Axis::X,
                    receiver: f,
                    other: positive,
                    is_front: true,
                },
            ]
        );

        cs.update_position(f, 30.0, 0.0, 0.0);
        assert_eq!(kinds(&cs.drain_events()), vec![(1, 2, AoiEventKind::Left)]);
        assert!(!cs.contains(t, f));
        assert!(cs.trigger(t).unwrap().is_empty());
    }

    #[test]
    fn test_horizontal_crossing_alone_does_not_enter() {
        let mut cs = system();
        let e = entity(&mut cs, 1, 0.0, 0.0, 0.0);
        let f = entity(&mut cs, 2, 20.0, 8.0, 0.0);
        let t = cs.watch(e, 10.0, 5.0).unwrap();

        cs.update_position(f, 5.0, 8.0, 0.0);
        assert!(cs.drain_events().is_empty());
        assert!(!cs.contains(t, f));

        // Dropping into vertical range completes containment.
        cs.update_position(f, 5.0, 0.0, 0.0);
        assert_eq!(kinds(&cs.drain_events()), vec![(1, 2, AoiEventKind::Entered)]);
    }

    #[test]
    fn test_every_overtaken_node_is_reported() {
        let mut cs = system();
        let a = entity(&mut cs, 1, 0.0, 0.0, 0.0);
        let b = entity(&mut cs, 2, 1.0, 0.0, 0.0);
        let c = entity(&mut cs, 3, 2.0, 0.0, 0.0);
        let d = entity(&mut cs, 4, 3.0, 0.0, 0.0);
        cs.passes.clear();

        cs.update_position(a, 2.5, 0.0, 0.0);
        let overtaken: Vec<NodeId> = cs
            .passes
            .iter()
            .filter(|p| p.receiver == a)
            .map(|p| p.other)
            .collect();
        assert_eq!(overtaken, vec![b, c]);
        assert!(cs.passes.iter().all(|p| p.axis == Axis::X && p.other != d && p.receiver != d));
        assert_eq!(x_order(&cs), vec![1.0, 2.0, 2.5, 3.0]);
    }

    #[test]
    fn test_sequences_stay_sorted_under_random_moves() {
        let mut cs = system();
        let mut state = 0x2545_f491_u32;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state % 2000) as f32 / 10.0 - 100.0
        };

        let nodes: Vec<NodeId> = (0..24).map(|i| entity(&mut cs, i, next(), next(), next())).collect();
        for &n in nodes.iter().step_by(4) {
            cs.watch(n, 15.0, 10.0).unwrap();
        }

        for _ in 0..400 {
            let n = nodes[(next().abs() as usize) % nodes.len()];
            cs.update_position(n, next(), next(), next());
            cs.validate().unwrap();
        }

        for axis in Axis::ALL {
            let keys: Vec<AxisKey> = cs.axis_iter(axis).map(|id| cs.node(id).unwrap().key(axis)).collect();
            assert!(keys.windows(2).all(|w| w[0].before(w[1])), "{axis} out of order");
        }
        // Containment matches the boxes, allowing for rounding at the edges.
        for (id, rt) in cs.triggers.iter() {
            let origin = cs.position(rt.origin());
            let inside = cs.entities_in(id);
            for &n in &nodes {
                if n == rt.origin() {
                    continue;
                }
                let p = cs.position(n);
                let d = [
                    ((p.x - origin.x).abs(), rt.range_xz()),
                    ((p.z - origin.z).abs(), rt.range_xz()),
                    ((p.y - origin.y).abs(), rt.range_y()),
                ];
                let entity = cs.entity_of(n).unwrap();
                if d.iter().all(|&(d, r)| d < r - 0.01) {
                    assert!(inside.contains(&entity), "{entity} missing from {id}");
                }
                if inside.contains(&entity) {
                    assert!(d.iter().all(|&(d, r)| d <= r + 0.01), "{entity} wrongly in {id}");
                }
            }
        }
    }

    #[test]
    fn test_moving_origin_drags_its_boundaries() {
        let mut cs = system();
        let e = entity(&mut cs, 1, 0.0, 0.0, 0.0);
        let f = entity(&mut cs, 2, 50.0, 0.0, 0.0);
        let t = cs.watch(e, 10.0, 5.0).unwrap();
        cs.passes.clear();

        cs.update_position(e, 45.0, 0.0, 0.0);
        assert_eq!(kinds(&cs.drain_events()), vec![(1, 2, AoiEventKind::Entered)]);
        let negative = cs.trigger(t).unwrap().boundary(BoundarySide::Negative).unwrap();
        assert_eq!(cs.position(negative), Position::new(35.0, -5.0, -10.0));
        assert!(cs.contains(t, f));

        // Boundaries never report crossings with their own origin.
        assert!(cs.passes.iter().all(|p| !(p.receiver == e && cs.node(p.other).is_some_and(|n| n.parent() == Some(e)))));
    }

    #[test]
    fn test_resize_only_reports_real_transitions() {
        let mut cs = system();
        let e = entity(&mut cs, 1, 0.0, 0.0, 0.0);
        let f = entity(&mut cs, 2, 8.0, 0.0, 0.0);
        let g = entity(&mut cs, 3, 15.0, 0.0, 0.0);
        let t = cs.watch(e, 10.0, 5.0).unwrap();
        assert_eq!(kinds(&cs.drain_events()), vec![(1, 2, AoiEventKind::Entered)]);

        assert!(cs.set_range(t, 9.0, 5.0).unwrap());
        assert!(cs.drain_events().is_empty());

        cs.set_range(t, 5.0, 5.0).unwrap();
        assert_eq!(kinds(&cs.drain_events()), vec![(1, 2, AoiEventKind::Left)]);

        cs.set_range(t, 20.0, 5.0).unwrap();
        let mut events = kinds(&cs.drain_events());
        events.sort_unstable_by_key(|e| e.1);
        assert_eq!(
            events,
            vec![(1, 2, AoiEventKind::Entered), (1, 3, AoiEventKind::Entered)]
        );
        assert!(cs.contains(t, f) && cs.contains(t, g));
    }

    #[test]
    fn test_vertical_resize_only_reports_real_transitions() {
        let mut cs = system();
        let e = entity(&mut cs, 1, 0.0, 0.0, 0.0);
        let f = entity(&mut cs, 2, 2.0, 4.0, 0.0);
        let g = entity(&mut cs, 3, 2.0, -20.0, 0.0);
        let t = cs.watch(e, 10.0, 5.0).unwrap();
        assert_eq!(kinds(&cs.drain_events()), vec![(1, 2, AoiEventKind::Entered)]);

        cs.set_range(t, 10.0, 3.0).unwrap();
        assert_eq!(kinds(&cs.drain_events()), vec![(1, 2, AoiEventKind::Left)]);
        assert!(!cs.contains(t, f));

        cs.set_range(t, 10.0, 8.0).unwrap();
        assert_eq!(kinds(&cs.drain_events()), vec![(1, 2, AoiEventKind::Entered)]);
        assert!(cs.contains(t, f));

        // Both boundaries move, but nobody sits between old and new edges.
        cs.set_range(t, 10.0, 6.0).unwrap();
        cs.set_range(t, 10.0, 15.0).unwrap();
        assert!(cs.drain_events().is_empty());
        assert!(cs.contains(t, f) && !cs.contains(t, g));

        let positive = cs.trigger(t).unwrap().boundary(BoundarySide::Positive).unwrap();
        assert_eq!(cs.position(positive), Position::new(10.0, 15.0, 10.0));
    }

    #[test]
    fn test_resize_rejects_bad_range() {
        let mut cs = system();
        let e = entity(&mut cs, 1, 0.0, 0.0, 0.0);
        let t = cs.watch(e, 10.0, 5.0).unwrap();
        assert!(matches!(cs.set_range(t, 0.0, 5.0), Err(AoiError::InvalidRange { .. })));
        assert_eq!(cs.trigger(t).unwrap().range_xz(), 10.0);
    }

    #[test]
    fn test_uninstall_leaves_once() {
        let mut cs = system();
        let e = entity(&mut cs, 1, 0.0, 0.0, 0.0);
        let f = entity(&mut cs, 2, 3.0, 0.0, 0.0);
        entity(&mut cs, 3, 40.0, 0.0, 0.0);
        let t = cs.watch(e, 10.0, 5.0).unwrap();
        cs.drain_events();

        assert!(cs.uninstall(t));
        assert_eq!(kinds(&cs.drain_events()), vec![(1, 2, AoiEventKind::Left)]);
        assert!(!cs.uninstall(t));
        assert!(cs.drain_events().is_empty());
        assert!(!cs.contains(t, f));
        assert_eq!(cs.trigger_state(t), Some(TriggerState::Uninstalled));
        assert_eq!(cs.len(), 3);
        assert!(cs.node(e).unwrap().as_entity().unwrap().watchers().is_empty());

        assert!(cs.install(t));
        assert!(!cs.install(t));
        assert_eq!(kinds(&cs.drain_events()), vec![(1, 2, AoiEventKind::Entered)]);
    }

    #[test]
    fn test_reinstall_keeps_enter_leave_balanced() {
        let mut cs = system();
        let e = entity(&mut cs, 1, 0.0, 0.0, 0.0);
        entity(&mut cs, 2, 3.0, 0.0, 0.0);
        let t = cs.watch(e, 10.0, 5.0).unwrap();

        let mut balance = 0_i32;
        let mut tally = |cs: &mut CoordinateSystem| {
            for event in cs.drain_events() {
                assert_eq!((event.watcher, event.observed), (EntityId(1), EntityId(2)));
                balance += match event.kind {
                    AoiEventKind::Entered => 1,
                    AoiEventKind::Left => -1,
                };
                assert!((0..=1).contains(&balance), "balance {balance}");
            }
            balance
        };
        assert_eq!(tally(&mut cs), 1);

        for _ in 0..3 {
            assert!(cs.uninstall(t));
            assert_eq!(tally(&mut cs), 0);
            assert!(cs.install(t));
            assert_eq!(tally(&mut cs), 1);
        }
    }

    #[test]
    fn test_insert_inside_installed_trigger_enters() {
        let mut cs = system();
        let e = entity(&mut cs, 1, 0.0, 0.0, 0.0);
        let t = cs.watch(e, 10.0, 5.0).unwrap();
        let f = entity(&mut cs, 2, -4.0, 1.0, 2.0);
        assert_eq!(kinds(&cs.drain_events()), vec![(1, 2, AoiEventKind::Entered)]);
        assert!(cs.contains(t, f));
    }

    #[test]
    fn test_remove_origin_cascades() {
        let mut cs = system();
        let e = entity(&mut cs, 1, 0.0, 0.0, 0.0);
        let f = entity(&mut cs, 2, 3.0, 0.0, 0.0);
        let te = cs.watch(e, 10.0, 5.0).unwrap();
        let tf = cs.watch(f, 10.0, 5.0).unwrap();
        cs.drain_events();
        let boundaries = [
            cs.trigger(te).unwrap().boundary(BoundarySide::Positive).unwrap(),
            cs.trigger(te).unwrap().boundary(BoundarySide::Negative).unwrap(),
        ];

        assert!(cs.remove(e));
        assert!(!cs.remove(e));

        // Only the surviving watcher hears about it.
        assert_eq!(kinds(&cs.drain_events()), vec![(2, 1, AoiEventKind::Left)]);
        assert_eq!(cs.trigger_state(te), None);
        assert!(cs.triggers_of(e).is_empty());
        assert_eq!(cs.trigger_count(), 1);
        assert!(cs.trigger(tf).unwrap().is_empty());
        for b in boundaries {
            assert!(cs.node(b).is_none());
            assert_eq!(cs.position(b), Position::SENTINEL);
        }
        assert_eq!(cs.position(e), Position::SENTINEL);
        assert_eq!(cs.xx(e), SENTINEL);
        assert!(cs.entity_node(EntityId(1)).is_none());
        assert!(!cs.update_position(e, 1.0, 1.0, 1.0));
        assert!(!cs.install(te));
        assert_eq!(cs.len(), 3);
        assert_eq!(cs.axis_len(Axis::X), 3);
    }

    #[test]
    fn test_removing_boundary_uninstalls_trigger() {
        let mut cs = system();
        let e = entity(&mut cs, 1, 0.0, 0.0, 0.0);
        entity(&mut cs, 2, 3.0, 0.0, 0.0);
        let t = cs.watch(e, 10.0, 5.0).unwrap();
        cs.drain_events();

        let positive = cs.trigger(t).unwrap().boundary(BoundarySide::Positive).unwrap();
        assert!(cs.remove(positive));
        assert_eq!(cs.trigger_state(t), Some(TriggerState::Uninstalled));
        assert_eq!(kinds(&cs.drain_events()), vec![(1, 2, AoiEventKind::Left)]);
        assert_eq!(cs.len(), 2);
    }

    #[test]
    fn test_hide_and_reveal() {
        let mut cs = system();
        let e = entity(&mut cs, 1, 0.0, 0.0, 0.0);
        let f = entity(&mut cs, 2, 3.0, 0.0, 0.0);
        let t = cs.watch(e, 10.0, 5.0).unwrap();
        cs.drain_events();

        assert!(cs.set_hidden(f, true));
        assert_eq!(kinds(&cs.drain_events()), vec![(1, 2, AoiEventKind::Left)]);
        assert_eq!(cs.axis_len(Axis::X), 3);

        // Hidden nodes keep their position but never enter.
        cs.update_position(f, 1.0, 0.0, 0.0);
        assert!(cs.drain_events().is_empty());
        assert_eq!(cs.position(f), Position::new(1.0, 0.0, 0.0));

        assert!(cs.set_hidden(f, false));
        assert_eq!(kinds(&cs.drain_events()), vec![(1, 2, AoiEventKind::Entered)]);
        assert!(cs.contains(t, f));

        let positive = cs.trigger(t).unwrap().boundary(BoundarySide::Positive).unwrap();
        assert!(!cs.set_hidden(positive, true));
    }

    #[test]
    fn test_hidden_origin_keeps_watching() {
        let mut cs = system();
        let e = entity(&mut cs, 1, 0.0, 0.0, 0.0);
        entity(&mut cs, 2, 100.0, 0.0, 0.0);
        cs.watch(e, 10.0, 5.0).unwrap();
        cs.set_hidden(e, true);

        cs.update_position(e, 95.0, 0.0, 0.0);
        assert_eq!(kinds(&cs.drain_events()), vec![(1, 2, AoiEventKind::Entered)]);
    }

    #[test]
    fn test_flat_world_ignores_y() {
        let mut cs = CoordinateSystem::new(AoiConfig {
            has_y: false,
            validate_updates: true,
            ..AoiConfig::default()
        });
        let e = entity(&mut cs, 1, 0.0, 0.0, 0.0);
        let f = entity(&mut cs, 2, 20.0, 100.0, 0.0);
        let t = cs.watch(e, 10.0, 5.0).unwrap();

        cs.update_position(f, 5.0, 200.0, 0.0);
        assert_eq!(kinds(&cs.drain_events()), vec![(1, 2, AoiEventKind::Entered)]);
        assert!(cs.contains(t, f));
        assert_eq!(cs.axis_len(Axis::Y), 0);
        assert_eq!(cs.axis_iter(Axis::Y).count(), 0);
    }

    #[test]
    fn test_repoint_boundary_node() {
        let mut cs = system();
        let e = entity(&mut cs, 1, 0.0, 0.0, 0.0);
        let g = entity(&mut cs, 2, 40.0, 0.0, 0.0);
        let h = entity(&mut cs, 3, 42.0, 0.0, 0.0);
        let te = cs.watch(e, 10.0, 5.0).unwrap();
        let tg = cs.watch(g, 10.0, 5.0).unwrap();
        assert_eq!(kinds(&cs.drain_events()), vec![(2, 3, AoiEventKind::Entered)]);

        let node = cs.trigger(te).unwrap().boundary(BoundarySide::Positive).unwrap();
        let replaced = cs.trigger(tg).unwrap().boundary(BoundarySide::Positive).unwrap();
        assert!(cs.set_range_trigger(node, Some(tg)));

        assert_eq!(cs.trigger_state(te), Some(TriggerState::Uninstalled));
        assert!(cs.node(replaced).is_none());
        assert_eq!(cs.trigger(tg).unwrap().boundary(BoundarySide::Positive), Some(node));
        assert_eq!(cs.position(node), Position::new(50.0, 5.0, 10.0));
        assert!(cs.node(e).unwrap().as_entity().unwrap().watchers().is_empty());
        assert!(cs.node(g).unwrap().as_entity().unwrap().watchers().contains(&node));
        assert!(cs.drain_events().is_empty());
        assert!(cs.contains(tg, h));

        // The re-pointed node still drives containment.
        cs.update_position(h, 55.0, 0.0, 0.0);
        assert_eq!(kinds(&cs.drain_events()), vec![(2, 3, AoiEventKind::Left)]);

        assert!(cs.set_range_trigger(node, None));
        assert!(cs.node(node).is_none());
        assert_eq!(cs.trigger_state(tg), Some(TriggerState::Uninstalled));
    }

    #[test]
    fn test_repoint_requires_installed_target() {
        let mut cs = system();
        let e = entity(&mut cs, 1, 0.0, 0.0, 0.0);
        let g = entity(&mut cs, 2, 40.0, 0.0, 0.0);
        let te = cs.watch(e, 10.0, 5.0).unwrap();
        let tg = cs.add_trigger(g, 10.0, 5.0).unwrap();

        let node = cs.trigger(te).unwrap().boundary(BoundarySide::Negative).unwrap();
        assert!(!cs.set_range_trigger(node, Some(tg)));
        assert!(cs.set_range_trigger(node, Some(te)));
        assert_eq!(cs.trigger_state(te), Some(TriggerState::Installed));
    }

    #[test]
    fn test_insert_rejects_bad_input() {
        let mut cs = system();
        entity(&mut cs, 1, 0.0, 0.0, 0.0);
        assert_eq!(
            cs.insert_entity(EntityId(1), Position::new(1.0, 0.0, 0.0)),
            Err(AoiError::DuplicateEntity(EntityId(1)))
        );
        assert!(matches!(
            cs.insert_entity(EntityId(2), Position::new(f32::NAN, 0.0, 0.0)),
            Err(AoiError::NonFinitePosition(_))
        ));
        assert_eq!(cs.len(), 1);
    }

    #[test]
    fn test_boundaries_cannot_be_moved_directly() {
        let mut cs = system();
        let e = entity(&mut cs, 1, 0.0, 0.0, 0.0);
        let t = cs.watch(e, 10.0, 5.0).unwrap();
        let positive = cs.trigger(t).unwrap().boundary(BoundarySide::Positive).unwrap();
        assert!(!cs.update_position(positive, 1.0, 1.0, 1.0));
        assert!(!cs.update_position(e, f32::INFINITY, 0.0, 0.0));
        assert_eq!(cs.xx(positive), 10.0);
    }

    #[test]
    fn test_entities_near_scans_outward() {
        let mut cs = system();
        let e = entity(&mut cs, 1, 0.0, 0.0, 0.0);
        entity(&mut cs, 2, 4.0, 0.0, 0.0);
        entity(&mut cs, 3, -4.0, 0.0, 3.0);
        entity(&mut cs, 4, 4.0, 30.0, 0.0);
        entity(&mut cs, 5, 40.0, 0.0, 0.0);
        cs.watch(e, 10.0, 5.0).unwrap();

        assert_eq!(cs.entities_near(e, 5.0, 5.0), vec![EntityId(2), EntityId(3)]);
        assert_eq!(cs.entities_near(e, 50.0, 50.0).len(), 4);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let mut cs = system();
        let a = entity(&mut cs, 1, 1.0, 0.0, 0.0);
        let b = entity(&mut cs, 2, 1.0, 0.0, 0.0);
        let c = entity(&mut cs, 3, 1.0, 0.0, 0.0);
        assert_eq!(cs.axis_iter(Axis::X).collect::<Vec<_>>(), vec![a, b, c]);

        cs.update_position(a, 1.0, 0.0, 0.0);
        assert_eq!(cs.axis_iter(Axis::X).collect::<Vec<_>>(), vec![a, b, c]);
    }
}
