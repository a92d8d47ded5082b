use std::fmt;

/// Opaque integer standing in for an object reference across the boundary.
///
/// Handle 0 is reserved and always means "no object". Handles are unique
/// among the live objects of one store; two stores may hand out the same
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct Handle(pub u32);

impl Handle {
    /// The null handle.
    pub const NULL: Handle = Handle(0);

    #[inline]
    pub const fn new(raw: u32) -> Self {
        Handle(raw)
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Slot index in a table.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// `None` for the null handle.
    pub fn non_null(self) -> Option<Handle> {
        (!self.is_null()).then_some(self)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u32> for Handle {
    fn from(raw: u32) -> Self {
        Handle(raw)
    }
}

impl From<Handle> for u32 {
    fn from(handle: Handle) -> Self {
        handle.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_handle() {
        assert!(Handle::NULL.is_null());
        assert!(Handle::default().is_null());
        assert_eq!(Handle::NULL.non_null(), None);
        assert_eq!(Handle::new(3).non_null(), Some(Handle(3)));
    }

    #[test]
    fn display() {
        assert_eq!(Handle::new(42).to_string(), "#42");
    }
}
