//! Enter/leave events raised by range triggers.

use std::collections::VecDeque;
use std::fmt;

use crate::entity_node::EntityId;
use crate::handle::TriggerId;

/// What happened to the observed entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AoiEventKind {
    /// The observed entity is now inside the trigger volume.
    Entered,
    /// The observed entity is no longer inside the trigger volume.
    Left,
}

impl fmt::Display for AoiEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Entered => "entered",
            Self::Left => "left",
        })
    }
}

/// `(watcher, observed, kind)` plus the trigger that raised it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AoiEvent {
    pub trigger: TriggerId,
    /// Entity the trigger is anchored on.
    pub watcher: EntityId,
    /// Entity that crossed the trigger boundary.
    pub observed: EntityId,
    pub kind: AoiEventKind,
}

/// FIFO of events raised while the index was being updated.
///
/// Events are never delivered from inside an update; the owner drains the
/// queue once the update returned.
#[derive(Default)]
pub struct EventQueue {
    events: VecDeque<AoiEvent>,
}

impl EventQueue {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event behind everything already queued.
    pub fn push(&mut self, event: AoiEvent) {
        self.events.push_back(event);
    }

    /// Oldest queued event.
    pub fn pop(&mut self) -> Option<AoiEvent> {
        self.events.pop_front()
    }

    /// Drain all queued events in the order they were raised.
    pub fn drain(&mut self) -> impl Iterator<Item = AoiEvent> + '_ {
        self.events.drain(..)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of queued events of one kind.
    #[must_use]
    pub fn kind_len(&self, kind: AoiEventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("entered", &self.kind_len(AoiEventKind::Entered))
            .field("left", &self.kind_len(AoiEventKind::Left))
            .finish()
    }
}
