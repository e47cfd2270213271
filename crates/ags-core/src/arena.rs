//! Generational slot arena backing every table of the audio graph.
//!
//! Each table hands out a typed key (`AudioId`, `ChannelId`, ...) carrying a
//! slot index and a generation. Slots are recycled once freed, but the
//! generation is bumped on removal so a stale key resolves to `None` instead
//! of aliasing the object that later reuses the slot.

/// A typed handle into an [`Arena`].
pub trait Key: Copy {
    /// Builds a key from raw parts. Only the arena calls this.
    fn from_parts(index: u32, generation: u32) -> Self;
    /// Slot index.
    fn slot(self) -> u32;
    /// Generation the slot had when the key was issued.
    fn generation(self) -> u32;
}

/// Declares a typed arena key with `Display` output like `audio#3`.
macro_rules! arena_key {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            index: u32,
            generation: u32,
        }

        impl $name {
            /// Returns the raw slot index.
            #[inline]
            pub fn index(self) -> u32 {
                self.index
            }
        }

        impl $crate::arena::Key for $name {
            #[inline]
            fn from_parts(index: u32, generation: u32) -> Self {
                Self { index, generation }
            }

            #[inline]
            fn slot(self) -> u32 {
                self.index
            }

            #[inline]
            fn generation(self) -> u32 {
                self.generation
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.index)
            }
        }
    };
}

pub(crate) use arena_key;

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with free-list reuse.
pub(crate) struct Arena<K, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
    _key: core::marker::PhantomData<K>,
}

impl<K: Key, T> Arena<K, T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            _key: core::marker::PhantomData,
        }
    }

    pub(crate) fn insert(&mut self, value: T) -> K {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return K::from_parts(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        K::from_parts(index, 0)
    }

    /// Key the next [`insert`](Self::insert) will return.
    pub(crate) fn next_key(&self) -> K {
        match self.free.last() {
            Some(&index) => K::from_parts(index, self.slots[index as usize].generation),
            None => K::from_parts(self.slots.len() as u32, 0),
        }
    }

    pub(crate) fn get(&self, key: K) -> Option<&T> {
        self.slots
            .get(key.slot() as usize)
            .filter(|slot| slot.generation == key.generation())
            .and_then(|slot| slot.value.as_ref())
    }

    pub(crate) fn get_mut(&mut self, key: K) -> Option<&mut T> {
        self.slots
            .get_mut(key.slot() as usize)
            .filter(|slot| slot.generation == key.generation())
            .and_then(|slot| slot.value.as_mut())
    }

    pub(crate) fn contains(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    pub(crate) fn remove(&mut self, key: K) -> Option<T> {
        let slot = self.slots.get_mut(key.slot() as usize)?;
        if slot.generation != key.generation() {
            return None;
        }
        let value = slot.value.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.slot());
        self.live -= 1;
        Some(value)
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (K::from_parts(index as u32, slot.generation), value))
        })
    }
}
