//! Native-side fixed-capacity free lists.
//!
//! Each slot is either occupied or links to the next free slot, so the free
//! list lives in the same storage as the payload. `store` pops the head,
//! `remove` pushes the slot back. Slot 0 is reserved for the null handle and
//! handles are issued in ascending order from 1.
//!
//! Two flavours share the implementation:
//!
//! - [`PointerFreeList`] maps handles to copies of pointer-like values that
//!   refer to memory owned elsewhere.
//! - [`ObjectFreeList`] owns the instances themselves, so their address stays
//!   stable for the object's whole life.
//!
//! Neither is synchronized; the native side drives all calls from one thread.
//! Exhaustion and out-of-range handles are logic errors and panic.

use std::fmt;

use crate::Handle;

enum Slot<T> {
    Free { next: Option<u32> },
    Occupied(T),
}

/// Intrusive free list over `capacity` slots.
pub struct FreeList<T> {
    name: String,
    slots: Vec<Slot<T>>,
    head: Option<u32>,
    live: usize,
}

impl<T> FreeList<T> {
    /// Create a list with `capacity` usable slots. `name` identifies the list
    /// in panic messages.
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        let mut slots = Vec::with_capacity(capacity as usize + 1);
        slots.push(Slot::Free { next: None });
        for i in 1..=capacity {
            let next = (i < capacity).then_some(i + 1);
            slots.push(Slot::Free { next });
        }
        Self {
            name: name.into(),
            slots,
            head: (capacity > 0).then_some(1),
            live: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> u32 {
        (self.slots.len() - 1) as u32
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn is_full(&self) -> bool {
        self.head.is_none()
    }

    /// Place `value` in the head slot and return its handle.
    ///
    /// # Panics
    ///
    /// If every slot is occupied.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn store(&mut self, value: T) -> Handle {
        let Some(index) = self.head else {
            panic!(
                "native free list '{}' exhausted: all {} slots in use",
                self.name,
                self.capacity()
            );
        };
        let slot = &mut self.slots[index as usize];
        self.head = match slot {
            Slot::Free { next } => *next,
            Slot::Occupied(_) => unreachable!("free list head points at an occupied slot"),
        };
        *slot = Slot::Occupied(value);
        self.live += 1;
        Handle(index)
    }

    fn check(&self, handle: Handle) {
        assert!(
            handle.index() < self.slots.len(),
            "handle {handle} out of range for native free list '{}' of {} slots",
            self.name,
            self.capacity()
        );
    }

    /// The value in `handle`'s slot; `None` for the null handle or a free slot.
    ///
    /// # Panics
    ///
    /// If `handle` is past the end of the list.
    pub fn get_ref(&self, handle: Handle) -> Option<&T> {
        self.check(handle);
        if handle.is_null() {
            return None;
        }
        match &self.slots[handle.index()] {
            Slot::Occupied(value) => Some(value),
            Slot::Free { .. } => None,
        }
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        self.check(handle);
        if handle.is_null() {
            return None;
        }
        match &mut self.slots[handle.index()] {
            Slot::Occupied(value) => Some(value),
            Slot::Free { .. } => None,
        }
    }

    /// Take the value out and push the slot onto the free list.
    ///
    /// No-op for the null handle and for slots that are already free.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        self.check(handle);
        if handle.is_null() {
            return None;
        }
        let slot = &mut self.slots[handle.index()];
        if matches!(slot, Slot::Free { .. }) {
            return None;
        }
        let previous = std::mem::replace(slot, Slot::Free { next: self.head });
        self.head = Some(handle.raw());
        self.live -= 1;
        match previous {
            Slot::Occupied(value) => Some(value),
            Slot::Free { .. } => None,
        }
    }

    /// Handles of occupied slots, ascending.
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| matches!(slot, Slot::Occupied(_)))
            .map(|(i, _)| Handle(i as u32))
    }
}

impl<T: Copy> FreeList<T> {
    /// Copy of the value in `handle`'s slot.
    pub fn get(&self, handle: Handle) -> Option<T> {
        self.get_ref(handle).copied()
    }
}

impl<T> fmt::Debug for FreeList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreeList")
            .field("name", &self.name)
            .field("capacity", &self.capacity())
            .field("live", &self.live)
            .finish()
    }
}

/// Handle -> pointer to externally owned memory.
pub type PointerFreeList<P = usize> = FreeList<P>;

/// Handle -> owned instance, for objects constructed in place on the native side.
pub type ObjectFreeList<T> = FreeList<T>;
