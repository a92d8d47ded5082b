//! Reference counts for managed value type proxies.
//!
//! Several native proxies may share the handle of one managed value type
//! object (for example when two calls return the same value). The count
//! decides which proxy's drop frees the managed object: only the one that
//! takes it to zero.

use crate::Handle;

/// One `i32` counter per handle slot.
#[derive(Debug, Clone)]
pub struct RefCountTable {
    name: String,
    counts: Vec<i32>,
}

impl RefCountTable {
    /// Counters for handles `1..=capacity`.
    pub fn new(name: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            counts: vec![0; capacity as usize + 1],
        }
    }

    fn slot(&mut self, handle: Handle) -> &mut i32 {
        let len = self.counts.len();
        self.counts.get_mut(handle.index()).unwrap_or_else(|| {
            panic!(
                "handle {handle} out of range for reference counts of '{}' ({} slots)",
                self.name,
                len - 1
            )
        })
    }

    /// Increment. No-op for the null handle.
    pub fn reference(&mut self, handle: Handle) {
        if handle.is_null() {
            return;
        }
        *self.slot(handle) += 1;
    }

    /// Decrement. Returns `true` when the count reached zero, meaning the
    /// caller must release the managed object now. No-op for the null handle.
    ///
    /// # Panics
    ///
    /// If the count is already zero.
    pub fn dereference(&mut self, handle: Handle) -> bool {
        if handle.is_null() {
            return false;
        }
        let name = self.name.clone();
        let count = self.slot(handle);
        assert!(
            *count > 0,
            "reference count underflow for handle {handle} of '{name}'"
        );
        *count -= 1;
        *count == 0
    }

    /// Decrement and run `release` exactly once when the count hits zero.
    pub fn dereference_with(&mut self, handle: Handle, release: impl FnOnce(Handle)) {
        if self.dereference(handle) {
            release(handle);
        }
    }

    pub fn count(&self, handle: Handle) -> i32 {
        self.counts.get(handle.index()).copied().unwrap_or(0)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_runs_once_at_zero() {
        let mut table = RefCountTable::new("Named", 4);
        let h = Handle(2);
        table.reference(h);
        table.reference(h);

        let mut released = Vec::new();
        table.dereference_with(h, |h| released.push(h));
        assert!(released.is_empty());
        assert_eq!(table.count(h), 1);

        table.dereference_with(h, |h| released.push(h));
        assert_eq!(released, vec![h]);
        assert_eq!(table.count(h), 0);
    }

    #[test]
    fn null_handle_is_ignored() {
        let mut table = RefCountTable::new("Named", 1);
        table.reference(Handle::NULL);
        assert!(!table.dereference(Handle::NULL));
        assert_eq!(table.count(Handle::NULL), 0);
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn underflow_panics() {
        let mut table = RefCountTable::new("Named", 1);
        table.dereference(Handle(1));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_panics() {
        let mut table = RefCountTable::new("Named", 1);
        table.reference(Handle(2));
    }
}
