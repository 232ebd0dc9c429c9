//! Lookup and delivery capability for simulated entities.

use hashbrown::HashMap;
use rgb_aoi::{EntityId, TriggerId};

use crate::error::{DispatchError, DispatchResult};

/// Method invoked on the watcher when something enters its range.
pub const ON_ENTER_AOI: &str = "on_enter_aoi";
/// Method invoked on the watcher when something leaves its range.
pub const ON_LEAVE_AOI: &str = "on_leave_aoi";

/// Arguments of an AOI callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AoiArgs {
    pub observed: EntityId,
    pub trigger: TriggerId,
}

/// Resolves entity ids to live entities and invokes methods on them.
///
/// Passed explicitly to [`Dispatcher::dispatch`](crate::Dispatcher::dispatch)
/// and [`Space::tick`](crate::Space::tick); nothing is looked up globally.
pub trait EntityRegistry {
    type Handle: Copy;

    /// Live handle for `id`, `None` once the entity is gone.
    fn resolve(&self, id: EntityId) -> Option<Self::Handle>;

    fn deliver(&mut self, handle: Self::Handle, method: &'static str, args: AoiArgs) -> DispatchResult<()>;
}

/// A call received by an entity of a [`MapRegistry`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub method: &'static str,
    pub args: AoiArgs,
}

/// In-memory registry recording every delivery per entity.
#[derive(Debug, Default)]
pub struct MapRegistry {
    inboxes: HashMap<EntityId, Vec<Delivery>>,
}

impl MapRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when already registered.
    pub fn register(&mut self, id: EntityId) -> bool {
        if self.inboxes.contains_key(&id) {
            return false;
        }
        self.inboxes.insert(id, Vec::new());
        true
    }

    pub fn unregister(&mut self, id: EntityId) -> bool {
        self.inboxes.remove(&id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inboxes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inboxes.is_empty()
    }

    /// Deliveries received by `id`, oldest first.
    #[must_use]
    pub fn inbox(&self, id: EntityId) -> &[Delivery] {
        self.inboxes.get(&id).map_or(&[], Vec::as_slice)
    }

    pub fn take_inbox(&mut self, id: EntityId) -> Vec<Delivery> {
        self.inboxes.get_mut(&id).map(core::mem::take).unwrap_or_default()
    }
}

impl EntityRegistry for MapRegistry {
    type Handle = EntityId;

    fn resolve(&self, id: EntityId) -> Option<EntityId> {
        self.inboxes.contains_key(&id).then_some(id)
    }

    fn deliver(&mut self, handle: EntityId, method: &'static str, args: AoiArgs) -> DispatchResult<()> {
        let inbox = self
            .inboxes
            .get_mut(&handle)
            .ok_or(DispatchError::UnknownEntity(handle))?;
        inbox.push(Delivery { method, args });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rgb_aoi::{AoiConfig, CoordinateSystem, Position};

    fn trigger() -> TriggerId {
        let mut cs = CoordinateSystem::new(AoiConfig::default());
        let node = cs.insert_entity(EntityId(0), Position::new(0.0, 0.0, 0.0)).unwrap();
        cs.add_trigger(node, 1.0, 1.0).unwrap()
    }

    #[test]
    fn test_register_and_deliver() {
        let mut registry = MapRegistry::new();
        assert!(registry.register(EntityId(1)));
        assert!(!registry.register(EntityId(1)));
        assert_eq!(registry.resolve(EntityId(1)), Some(EntityId(1)));
        assert_eq!(registry.resolve(EntityId(2)), None);

        let args = AoiArgs {
            observed: EntityId(2),
            trigger: trigger(),
        };
        registry.deliver(EntityId(1), ON_ENTER_AOI, args).unwrap();
        assert_eq!(
            registry.inbox(EntityId(1)),
            &[Delivery {
                method: ON_ENTER_AOI,
                args,
            }]
        );
        assert_eq!(registry.take_inbox(EntityId(1)).len(), 1);
        assert!(registry.inbox(EntityId(1)).is_empty());
    }

    #[test]
    fn test_deliver_to_unregistered() {
        let mut registry = MapRegistry::new();
        let args = AoiArgs {
            observed: EntityId(2),
            trigger: trigger(),
        };
        assert_eq!(
            registry.deliver(EntityId(9), ON_LEAVE_AOI, args),
            Err(DispatchError::UnknownEntity(EntityId(9)))
        );
    }
}
