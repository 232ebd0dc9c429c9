//! Observers notified of every dispatched AOI event.

use std::sync::Arc;

use rgb_aoi::{AoiEvent, AoiEventKind};

/// Unique identifier for a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u32);

impl ObserverId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Callback run for each event of the kind it was registered for.
pub trait Observer: Send + Sync + 'static {
    fn observe(&self, event: &AoiEvent);
}

impl<F> Observer for F
where
    F: Fn(&AoiEvent) + Send + Sync + 'static,
{
    fn observe(&self, event: &AoiEvent) {
        self(event);
    }
}

/// Metadata for a registered observer.
#[derive(Clone)]
pub struct ObserverInfo {
    pub id: ObserverId,
    pub kind: AoiEventKind,
    pub(crate) callback: Arc<dyn Observer>,
}

impl ObserverInfo {
    pub fn new(kind: AoiEventKind, observer: impl Observer) -> Self {
        Self {
            // Assigned during registration
            id: ObserverId::new(0),
            kind,
            callback: Arc::new(observer),
        }
    }

    pub(crate) fn call(&self, event: &AoiEvent) {
        self.callback.observe(event);
    }
}

impl core::fmt::Debug for ObserverInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ObserverInfo")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rgb_aoi::{AoiConfig, CoordinateSystem, EntityId, Position};
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_closure_observer() {
        let mut cs = CoordinateSystem::new(AoiConfig::default());
        let node = cs.insert_entity(EntityId(1), Position::new(0.0, 0.0, 0.0)).unwrap();
        let trigger = cs.add_trigger(node, 1.0, 1.0).unwrap();

        let seen = Arc::new(AtomicU64::new(0));
        let seen_clone = seen.clone();
        let info = ObserverInfo::new(AoiEventKind::Entered, move |event: &AoiEvent| {
            seen_clone.fetch_add(event.observed.0, Ordering::SeqCst);
        });
        assert_eq!(info.kind, AoiEventKind::Entered);

        info.call(&AoiEvent {
            trigger,
            watcher: EntityId(1),
            observed: EntityId(42),
            kind: AoiEventKind::Entered,
        });
        assert_eq!(seen.load(Ordering::SeqCst), 42);
    }
}
