//! One spatial partition driven by the tick loop.

use rgb_aoi::{AoiConfig, AoiEventKind, CoordinateSystem, EntityId, NodeId, Position, TriggerId};
use tracing::{debug, info_span};

use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::error::{DispatchError, DispatchResult};
use crate::registry::EntityRegistry;

/// Summary of one [`Space::tick`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    pub tick: u64,
    pub entered: usize,
    pub left: usize,
    pub delivered: usize,
    pub undelivered: usize,
}

impl TickStats {
    /// Events raised during the tick, delivered or not.
    #[must_use]
    pub const fn events(&self) -> usize {
        self.entered + self.left
    }
}

/// A coordinate system addressed by entity id, plus the dispatcher that
/// delivers its events.
///
/// Mutations queue events; [`tick`](Self::tick) delivers them in the order
/// they were raised.
#[derive(Debug)]
pub struct Space {
    id: u32,
    system: CoordinateSystem,
    dispatcher: Dispatcher,
    tick: u64,
}

impl Space {
    /// Empty space with its own dispatcher.
    pub fn new(id: u32, config: AoiConfig) -> DispatchResult<Self> {
        Self::with_dispatcher(id, config, Dispatcher::new())
    }

    /// Empty space sharing `dispatcher`.
    pub fn with_dispatcher(id: u32, config: AoiConfig, dispatcher: Dispatcher) -> DispatchResult<Self> {
        config.validate()?;
        Ok(Self {
            id,
            system: CoordinateSystem::new(config),
            dispatcher,
            tick: 0,
        })
    }

    /// Partition id, used in tick spans.
    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    /// Underlying coordinate system.
    #[must_use]
    pub const fn system(&self) -> &CoordinateSystem {
        &self.system
    }

    /// Dispatcher delivering this space's events.
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Ticks completed so far.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick
    }

    fn node(&self, entity: EntityId) -> DispatchResult<NodeId> {
        self.system
            .entity_node(entity)
            .ok_or(DispatchError::UnknownEntity(entity))
    }

    /// Start tracking an entity.
    pub fn spawn(&mut self, entity: EntityId, position: Position) -> DispatchResult<NodeId> {
        if self.system.entity_node(entity).is_some() {
            return Err(DispatchError::AlreadySpawned(entity));
        }
        Ok(self.system.insert_entity(entity, position)?)
    }

    /// Stop tracking an entity. Its triggers are destroyed with it.
    pub fn despawn(&mut self, entity: EntityId) -> bool {
        self.system
            .entity_node(entity)
            .is_some_and(|node| self.system.remove(node))
    }

    /// Move an entity; returns whether it was moved.
    pub fn move_entity(&mut self, entity: EntityId, position: Position) -> DispatchResult<bool> {
        let node = self.node(entity)?;
        Ok(self.system.update_position(node, position.x, position.y, position.z))
    }

    /// Hide or reveal an entity.
    pub fn set_hidden(&mut self, entity: EntityId, hidden: bool) -> DispatchResult<bool> {
        let node = self.node(entity)?;
        Ok(self.system.set_hidden(node, hidden))
    }

    /// Current position of a spawned entity.
    #[must_use]
    pub fn position(&self, entity: EntityId) -> Option<Position> {
        self.system.entity_node(entity).map(|n| self.system.position(n))
    }

    /// Install a range trigger on `entity`.
    pub fn watch(&mut self, entity: EntityId, range_xz: f32, range_y: f32) -> DispatchResult<TriggerId> {
        let node = self.node(entity)?;
        Ok(self.system.watch(node, range_xz, range_y)?)
    }

    /// Install a range trigger with the configured default ranges.
    pub fn watch_default(&mut self, entity: EntityId) -> DispatchResult<TriggerId> {
        let config = self.system.config();
        let (range_xz, range_y) = (config.default_range_xz, config.default_range_y);
        self.watch(entity, range_xz, range_y)
    }

    /// Destroy a trigger. Entities still inside raise `Left`.
    pub fn unwatch(&mut self, trigger: TriggerId) -> bool {
        self.system.destroy_trigger(trigger)
    }

    /// Resize a trigger.
    pub fn set_range(&mut self, trigger: TriggerId, range_xz: f32, range_y: f32) -> DispatchResult<bool> {
        Ok(self.system.set_range(trigger, range_xz, range_y)?)
    }

    /// Entities inside any trigger anchored on `entity`.
    #[must_use]
    pub fn aoi(&self, entity: EntityId) -> Vec<EntityId> {
        let Some(node) = self.system.entity_node(entity) else {
            return Vec::new();
        };
        let mut seen: Vec<EntityId> = self
            .system
            .triggers_of(node)
            .into_iter()
            .flat_map(|t| self.system.entities_in(t))
            .collect();
        seen.sort_unstable();
        seen.dedup();
        seen
    }

    /// Events raised since the last tick.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.system.pending_events().len()
    }

    /// Deliver every queued event, oldest first.
    pub fn tick<R: EntityRegistry>(&mut self, registry: &mut R) -> TickStats {
        self.tick += 1;
        let _span = info_span!("aoi_tick", space = self.id, tick = self.tick).entered();

        let mut stats = TickStats {
            tick: self.tick,
            ..TickStats::default()
        };
        for event in self.system.drain_events() {
            match event.kind {
                AoiEventKind::Entered => stats.entered += 1,
                AoiEventKind::Left => stats.left += 1,
            }
            match self.dispatcher.dispatch(&event, registry) {
                DispatchOutcome::Delivered => stats.delivered += 1,
                DispatchOutcome::Unresolved | DispatchOutcome::Rejected => stats.undelivered += 1,
            }
        }

        if stats.events() > 0 {
            debug!(
                entered = stats.entered,
                left = stats.left,
                undelivered = stats.undelivered,
                "aoi events dispatched"
            );
        }
        stats
    }
}
