//! Routing of AOI events to observers and watcher entities.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use rgb_aoi::{AoiEvent, AoiEventKind};
use smallvec::SmallVec;
use tracing::{error, trace, warn};

use crate::observer::{Observer, ObserverId, ObserverInfo};
use crate::registry::{AoiArgs, EntityRegistry, ON_ENTER_AOI, ON_LEAVE_AOI};

/// What happened to one dispatched event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    /// The watcher could not be resolved.
    Unresolved,
    /// The watcher resolved but refused the call.
    Rejected,
}

/// Running totals since the dispatcher was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub dispatched: u64,
    pub delivered: u64,
    pub undelivered: u64,
}

#[derive(Default)]
struct DispatcherInner {
    observers: HashMap<AoiEventKind, Vec<ObserverInfo>>,
    next_observer_id: u32,
    stats: DispatchStats,
}

/// Dispatcher handle - cloneable wrapper around shared state.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<RwLock<DispatcherInner>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Method invoked on the watcher for an event kind.
    #[must_use]
    pub const fn method(kind: AoiEventKind) -> &'static str {
        match kind {
            AoiEventKind::Entered => ON_ENTER_AOI,
            AoiEventKind::Left => ON_LEAVE_AOI,
        }
    }

    /// Register an observer for one event kind.
    pub fn observe(&self, kind: AoiEventKind, observer: impl Observer) -> ObserverId {
        self.add_observer(ObserverInfo::new(kind, observer))
    }

    pub fn add_observer(&self, mut info: ObserverInfo) -> ObserverId {
        let mut inner = self.inner.write();
        let id = ObserverId::new(inner.next_observer_id);
        inner.next_observer_id += 1;
        info.id = id;

        inner.observers.entry(info.kind).or_default().push(info);
        id
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut inner = self.inner.write();
        for observers in inner.observers.values_mut() {
            if let Some(index) = observers.iter().position(|o| o.id == id) {
                observers.remove(index);
                return true;
            }
        }
        false
    }

    #[must_use]
    pub fn observer_count(&self, kind: AoiEventKind) -> usize {
        self.inner.read().observers.get(&kind).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.inner.read().stats
    }

    /// Run the observers of `event.kind`, then invoke the matching method on
    /// the watcher.
    ///
    /// A watcher that cannot be resolved or refuses the call is logged and
    /// counted, never propagated: one lost event must not stall a tick.
    pub fn dispatch<R: EntityRegistry>(&self, event: &AoiEvent, registry: &mut R) -> DispatchOutcome {
        // Observers may register further observers; run them unlocked.
        let observers: SmallVec<[ObserverInfo; 4]> = self
            .inner
            .read()
            .observers
            .get(&event.kind)
            .map(|o| o.iter().cloned().collect())
            .unwrap_or_default();
        for observer in &observers {
            observer.call(event);
        }

        let method = Self::method(event.kind);
        let outcome = match registry.resolve(event.watcher) {
            None => {
                error!(
                    watcher = %event.watcher,
                    observed = %event.observed,
                    method,
                    "aoi watcher not found, event dropped"
                );
                DispatchOutcome::Unresolved
            }
            Some(handle) => {
                let args = AoiArgs {
                    observed: event.observed,
                    trigger: event.trigger,
                };
                match registry.deliver(handle, method, args) {
                    Ok(()) => {
                        trace!(watcher = %event.watcher, observed = %event.observed, method, "aoi event delivered");
                        DispatchOutcome::Delivered
                    }
                    Err(err) => {
                        warn!(watcher = %event.watcher, %err, "aoi event rejected");
                        DispatchOutcome::Rejected
                    }
                }
            }
        };

        let mut inner = self.inner.write();
        inner.stats.dispatched += 1;
        if outcome == DispatchOutcome::Delivered {
            inner.stats.delivered += 1;
        } else {
            inner.stats.undelivered += 1;
        }
        outcome
    }
}

impl core::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("Dispatcher")
            .field("observers", &inner.observers.values().map(Vec::len).sum::<usize>())
            .field("stats", &inner.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MapRegistry;
    use rgb_aoi::{AoiConfig, CoordinateSystem, EntityId, Position, TriggerId};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn event(kind: AoiEventKind, watcher: u64) -> AoiEvent {
        let mut cs = CoordinateSystem::new(AoiConfig::default());
        let node = cs.insert_entity(EntityId(0), Position::new(0.0, 0.0, 0.0)).unwrap();
        let trigger: TriggerId = cs.add_trigger(node, 1.0, 1.0).unwrap();
        AoiEvent {
            trigger,
            watcher: EntityId(watcher),
            observed: EntityId(99),
            kind,
        }
    }

    #[test]
    fn test_observers_run_per_kind() {
        let dispatcher = Dispatcher::new();
        let entered = Arc::new(AtomicU32::new(0));
        let entered_clone = entered.clone();
        dispatcher.observe(AoiEventKind::Entered, move |_: &AoiEvent| {
            entered_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(dispatcher.observer_count(AoiEventKind::Entered), 1);
        assert_eq!(dispatcher.observer_count(AoiEventKind::Left), 0);

        let mut registry = MapRegistry::new();
        dispatcher.dispatch(&event(AoiEventKind::Entered, 1), &mut registry);
        dispatcher.dispatch(&event(AoiEventKind::Left, 1), &mut registry);
        assert_eq!(entered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_observer() {
        let dispatcher = Dispatcher::new();
        let id = dispatcher.observe(AoiEventKind::Left, |_: &AoiEvent| {});
        assert!(dispatcher.remove_observer(id));
        assert!(!dispatcher.remove_observer(id));
        assert_eq!(dispatcher.observer_count(AoiEventKind::Left), 0);
    }

    #[test]
    fn test_unresolved_watcher_is_counted() {
        let dispatcher = Dispatcher::new();
        let mut registry = MapRegistry::new();
        registry.register(EntityId(1));

        assert_eq!(
            dispatcher.dispatch(&event(AoiEventKind::Entered, 1), &mut registry),
            DispatchOutcome::Delivered
        );
        assert_eq!(
            dispatcher.dispatch(&event(AoiEventKind::Entered, 2), &mut registry),
            DispatchOutcome::Unresolved
        );
        assert_eq!(
            dispatcher.stats(),
            DispatchStats {
                dispatched: 2,
                delivered: 1,
                undelivered: 1,
            }
        );
        assert_eq!(registry.inbox(EntityId(1))[0].method, ON_ENTER_AOI);
    }

    #[test]
    fn test_observer_may_register_observers() {
        let dispatcher = Dispatcher::new();
        let handle = dispatcher.clone();
        dispatcher.observe(AoiEventKind::Entered, move |_: &AoiEvent| {
            handle.observe(AoiEventKind::Left, |_: &AoiEvent| {});
        });

        dispatcher.dispatch(&event(AoiEventKind::Entered, 1), &mut MapRegistry::new());
        assert_eq!(dispatcher.observer_count(AoiEventKind::Left), 1);
    }
}
