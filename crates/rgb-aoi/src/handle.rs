//! Generational handles for nodes and triggers.
//!
//! Slots are recycled, so every handle carries the generation of the slot it
//! was issued for. A handle whose generation no longer matches resolves to
//! nothing, which is how a stale watcher or boundary reference is detected
//! instead of followed.

use std::fmt;
use std::marker::PhantomData;

/// Generation counter to detect stale handles.
/// Incremented each time a slot is recycled.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Generation(u32);

impl Generation {
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{}", self.0)
    }
}

/// Untyped slot handle: index plus generation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle {
    index: u32,
    generation: Generation,
}

impl RawHandle {
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    #[must_use]
    pub const fn generation(self) -> Generation {
        self.generation
    }
}

macro_rules! typed_handle {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(RawHandle);

        impl $name {
            #[must_use]
            pub const fn raw(self) -> RawHandle {
                self.0
            }
        }

        impl From<RawHandle> for $name {
            fn from(raw: RawHandle) -> Self {
                Self(raw)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({}v{})"), self.0.index, self.0.generation.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}v{}"), self.0.index, self.0.generation.0)
            }
        }
    };
}

typed_handle!(
    /// Handle to a node slot in a [`CoordinateSystem`](crate::CoordinateSystem).
    NodeId,
    "node"
);

typed_handle!(
    /// Handle to a [`RangeTrigger`](crate::RangeTrigger) slot.
    TriggerId,
    "trigger"
);

struct Slot<T> {
    generation: Generation,
    value: Option<T>,
}

/// Slot arena with a free list and per-slot generations.
///
/// `H` is the typed handle issued by this arena.
pub struct Arena<T, H> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    len: usize,
    _handle: PhantomData<H>,
}

impl<T, H> Default for Arena<T, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, H> Arena<T, H> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            len: 0,
            _handle: PhantomData,
        }
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::with_capacity(capacity / 4),
            len: 0,
            _handle: PhantomData,
        }
    }

    /// Number of occupied slots.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T, H> Arena<T, H>
where
    H: Copy + From<RawHandle> + Into<RawHandle>,
{
    /// Store a value, reusing a recycled slot when one is available.
    pub fn insert(&mut self, value: T) -> H {
        self.insert_with(|_| value)
    }

    /// Store a value built from its own handle.
    pub fn insert_with(&mut self, build: impl FnOnce(H) -> T) -> H {
        self.len += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            let handle = H::from(RawHandle {
                index,
                generation: slot.generation,
            });
            slot.value = Some(build(handle));
            handle
        } else {
            let index = self.slots.len() as u32;
            let generation = Generation::new();
            let handle = H::from(RawHandle { index, generation });
            self.slots.push(Slot {
                generation,
                value: Some(build(handle)),
            });
            handle
        }
    }

    /// Free the slot behind `handle`, invalidating every copy of it.
    pub fn remove(&mut self, handle: H) -> Option<T> {
        let raw: RawHandle = handle.into();
        let slot = self.slots.get_mut(raw.index as usize)?;
        if slot.generation != raw.generation {
            return None;
        }

        let value = slot.value.take()?;
        slot.generation = slot.generation.next();
        self.free_list.push(raw.index);
        self.len -= 1;
        Some(value)
    }

    #[must_use]
    pub fn get(&self, handle: H) -> Option<&T> {
        let raw: RawHandle = handle.into();
        let slot = self.slots.get(raw.index as usize)?;
        if slot.generation == raw.generation {
            slot.value.as_ref()
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        let raw: RawHandle = handle.into();
        let slot = self.slots.get_mut(raw.index as usize)?;
        if slot.generation == raw.generation {
            slot.value.as_mut()
        } else {
            None
        }
    }

    #[must_use]
    pub fn contains(&self, handle: H) -> bool {
        self.get(handle).is_some()
    }

    /// Iterate over occupied slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (H, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                let raw = RawHandle {
                    index: index as u32,
                    generation: slot.generation,
                };
                (H::from(raw), value)
            })
        })
    }
}

impl From<NodeId> for RawHandle {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl From<TriggerId> for RawHandle {
    fn from(id: TriggerId) -> Self {
        id.0
    }
}
