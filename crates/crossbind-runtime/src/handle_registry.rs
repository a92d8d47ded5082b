//! Managed-side object store.
//!
//! Array-backed store with a stack of free handles. Every object that crosses
//! to the native side is parked here and referred to by its [`Handle`].
//!
//! After `init(n)` the free stack holds `n..=1` with `n` on top, so the first
//! handle issued is `n` and freed handles are reused LIFO:
//!
//! ```
//! use crossbind_runtime::{Handle, HandleRegistry};
//!
//! let registry = HandleRegistry::new();
//! registry.init(3);
//! assert_eq!(registry.store(Some("a")).unwrap(), Handle(3));
//! assert_eq!(registry.store(Some("b")).unwrap(), Handle(2));
//! registry.remove(Handle(3));
//! assert_eq!(registry.store(Some("c")).unwrap(), Handle(3));
//! ```
//!
//! One lock guards the whole store. It serializes `store`/`get`/`remove`
//! from several threads but is not built for contention.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{Handle, RuntimeError};

struct Slots<T> {
    /// Slot 0 is permanently empty.
    objects: Vec<Option<T>>,
    /// Free handles; the top is popped next.
    free: Vec<Handle>,
}

/// Managed object store.
pub struct HandleRegistry<T> {
    inner: Mutex<Option<Slots<T>>>,
}

impl<T> HandleRegistry<T> {
    /// Create an uninitialized store. `store` fails until [`init`](Self::init).
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Slots<T>>> {
        // A panic while holding the lock leaves the slots consistent: every
        // operation mutates at most one slot and the free stack.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate `max_objects + 1` slots and preload the free stack.
    ///
    /// Re-initializing drops every stored object.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn init(&self, max_objects: u32) {
        let mut objects = Vec::with_capacity(max_objects as usize + 1);
        objects.resize_with(max_objects as usize + 1, || None);
        let free = (1..=max_objects).map(Handle).collect();
        *self.lock() = Some(Slots { objects, free });
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().is_some()
    }

    /// Park `obj` and return its handle. `None` stores nothing and returns
    /// the null handle.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn store(&self, obj: Option<T>) -> Result<Handle, RuntimeError> {
        let Some(obj) = obj else {
            return Ok(Handle::NULL);
        };
        let mut guard = self.lock();
        let slots = guard.as_mut().ok_or(RuntimeError::NotInitialized {
            what: "handle registry",
        })?;
        let handle = slots.free.pop().ok_or(RuntimeError::StoreExhausted {
            capacity: (slots.objects.len() - 1) as u32,
        })?;
        slots.objects[handle.index()] = Some(obj);
        Ok(handle)
    }

    /// Run `f` on the object behind `handle`.
    ///
    /// # Panics
    ///
    /// If `handle` is past the end of the store.
    pub fn with<R>(&self, handle: Handle, f: impl FnOnce(Option<&T>) -> R) -> R {
        if handle.is_null() {
            return f(None);
        }
        let guard = self.lock();
        let slots = guard.as_ref();
        let len = slots.map_or(0, |s| s.objects.len());
        assert!(
            handle.index() < len,
            "handle {handle} out of range for an object store of {len} slots"
        );
        f(slots.and_then(|s| s.objects[handle.index()].as_ref()))
    }

    /// Remove the object behind `handle` and recycle the handle.
    ///
    /// No-op for the null handle and for slots that are already empty.
    ///
    /// # Panics
    ///
    /// If `handle` is past the end of the store.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn remove(&self, handle: Handle) -> Option<T> {
        if handle.is_null() {
            return None;
        }
        let mut guard = self.lock();
        let slots = guard.as_mut()?;
        let len = slots.objects.len();
        assert!(
            handle.index() < len,
            "handle {handle} out of range for an object store of {len} slots"
        );
        let removed = slots.objects[handle.index()].take();
        if removed.is_some() {
            slots.free.push(handle);
        }
        removed
    }

    /// Number of handles the store was initialized with.
    pub fn capacity(&self) -> u32 {
        self.lock()
            .as_ref()
            .map_or(0, |s| (s.objects.len() - 1) as u32)
    }

    /// Number of live objects.
    pub fn live_count(&self) -> usize {
        self.lock()
            .as_ref()
            .map_or(0, |s| s.objects.len() - 1 - s.free.len())
    }

    /// Drop every object and return to the uninitialized state.
    pub fn shutdown(&self) {
        *self.lock() = None;
    }
}

impl<T: Clone> HandleRegistry<T> {
    /// The object behind `handle`; `None` for null, never-stored or removed handles.
    ///
    /// # Panics
    ///
    /// If `handle` is past the end of the store.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn get(&self, handle: Handle) -> Option<T> {
        self.with(handle, |obj| obj.cloned())
    }
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for HandleRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("capacity", &self.capacity())
            .field("live", &self.live_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn store_none_returns_null() {
        let registry: HandleRegistry<i32> = HandleRegistry::new();
        registry.init(1);
        assert_eq!(registry.store(None).unwrap(), Handle::NULL);
        assert_eq!(registry.get(Handle::NULL), None);
    }

    #[test]
    fn get_null_is_always_none() {
        let registry = HandleRegistry::new();
        assert_eq!(registry.get(Handle::NULL), None);
        registry.init(2);
        registry.store(Some(1)).unwrap();
        registry.store(Some(2)).unwrap();
        assert_eq!(registry.get(Handle::NULL), None);
    }

    #[test]
    fn store_before_init_fails() {
        let registry = HandleRegistry::new();
        assert_eq!(
            registry.store(Some(1)),
            Err(RuntimeError::NotInitialized {
                what: "handle registry"
            })
        );
    }

    #[test]
    fn first_handle_is_capacity() {
        let registry = HandleRegistry::new();
        registry.init(3);
        assert_eq!(registry.store(Some('a')).unwrap(), Handle(3));
        assert_eq!(registry.store(Some('b')).unwrap(), Handle(2));
        assert_eq!(registry.store(Some('c')).unwrap(), Handle(1));
    }

    #[test]
    fn lifo_recycling() {
        let registry = HandleRegistry::new();
        registry.init(3);
        registry.store(Some(30)).unwrap();
        let two = registry.store(Some(20)).unwrap();
        assert_eq!(two, Handle(2));
        registry.remove(two);
        assert_eq!(registry.store(Some(21)).unwrap(), Handle(2));
        assert_eq!(registry.store(Some(10)).unwrap(), Handle(1));
    }

    #[test]
    fn exhaustion_is_an_error() {
        let registry = HandleRegistry::new();
        registry.init(1);
        registry.store(Some(1)).unwrap();
        assert_eq!(
            registry.store(Some(2)),
            Err(RuntimeError::StoreExhausted { capacity: 1 })
        );
    }

    #[test]
    fn remove_then_get() {
        let registry = HandleRegistry::new();
        registry.init(4);
        let h = registry.store(Some("x".to_string())).unwrap();
        assert_eq!(registry.get(h).as_deref(), Some("x"));
        assert_eq!(registry.remove(h).as_deref(), Some("x"));
        assert_eq!(registry.get(h), None);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn remove_null_and_double_remove_are_noops() {
        let registry = HandleRegistry::new();
        registry.init(2);
        assert_eq!(registry.remove(Handle::NULL), None::<i32>);
        let h = registry.store(Some(5)).unwrap();
        registry.remove(h);
        registry.remove(h);
        // The handle was pushed back once, so two stores succeed and a third fails.
        registry.store(Some(6)).unwrap();
        registry.store(Some(7)).unwrap();
        assert!(registry.store(Some(8)).is_err());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_get_panics() {
        let registry = HandleRegistry::new();
        registry.init(2);
        registry.store(Some(1)).unwrap();
        let _ = registry.get(Handle(3));
    }

    #[test]
    fn concurrent_store_remove() {
        let registry = Arc::new(HandleRegistry::new());
        registry.init(64);
        let workers: Vec<_> = (0..4)
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..200 {
                        let h = registry.store(Some(t * 1000 + i)).unwrap();
                        assert_eq!(registry.get(h), Some(t * 1000 + i));
                        registry.remove(h);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn shutdown_resets() {
        let registry = HandleRegistry::new();
        registry.init(2);
        registry.store(Some(1)).unwrap();
        registry.shutdown();
        assert!(!registry.is_initialized());
        assert!(registry.store(Some(1)).is_err());
    }
}
