//! Single-slot exception relay.
//!
//! One slot per crossing direction holds at most one pending exception. A
//! trampoline that catches an exception writes it here and returns a default
//! value; the call site checks the slot right after the call and re-raises.
//!
//! The slot is not a queue. A second exception written before the first is
//! consumed replaces it; [`ExceptionSlot::set`] hands back the replaced one so
//! the owner can report it.
//!
//! A managed exception object that reaches native code is owned by the
//! [`ExceptionObject`] attached to it at the call-site check. The object is
//! released through the `release_object` callback once the last exception
//! value referring to it is dropped.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crossbind_core::Diagnostic;

use crate::Handle;
use crate::context::WeakContext;

/// Owning reference to a managed exception object held by native code.
pub struct ExceptionObject {
    handle: Handle,
    owner: WeakContext,
}

impl ExceptionObject {
    pub(crate) fn new(handle: Handle, owner: WeakContext) -> Self {
        Self { handle, owner }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }
}

impl Drop for ExceptionObject {
    fn drop(&mut self) {
        let Some(ctx) = self.owner.upgrade() else {
            return;
        };
        if !ctx.is_initialized() {
            return;
        }
        if let Err(err) = ctx.release_object(self.handle) {
            ctx.report(
                Diagnostic::warning(format!("exception object not released: {err}"))
                    .with_context(self.handle.to_string()),
            );
        }
    }
}

impl fmt::Debug for ExceptionObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExceptionObject").field(&self.handle).finish()
    }
}

/// An exception waiting to be re-raised on the other side.
#[derive(Debug, Clone)]
pub struct PendingException {
    /// Handle of the exception object in the thrower's store.
    pub handle: Handle,
    pub type_name: String,
    pub message: String,
    pub(crate) object: Option<Rc<ExceptionObject>>,
}

impl PendingException {
    pub fn new(handle: Handle, type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            handle,
            type_name: type_name.into(),
            message: message.into(),
            object: None,
        }
    }

    /// Whether native code owns the exception object behind `handle`.
    pub fn owns_object(&self) -> bool {
        self.object.is_some()
    }
}

impl PartialEq for PendingException {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
            && self.type_name == other.type_name
            && self.message == other.message
    }
}

impl Eq for PendingException {}

impl fmt::Display for PendingException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.type_name, self.handle, self.message)
    }
}

/// Which way the exception is crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionDirection {
    /// Thrown by a managed trampoline body, re-raised at the native call site.
    NativeCaughtManaged,
    /// Thrown by a native export, re-raised at the managed call site.
    ManagedCaughtNative,
}

/// Cell holding at most one pending exception.
#[derive(Debug, Default)]
pub struct ExceptionSlot {
    pending: RefCell<Option<PendingException>>,
}

impl ExceptionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `exception`, returning the one it replaced.
    pub fn set(&self, exception: PendingException) -> Option<PendingException> {
        self.pending.borrow_mut().replace(exception)
    }

    /// Clear the slot and return its content.
    pub fn take(&self) -> Option<PendingException> {
        self.pending.borrow_mut().take()
    }

    /// Copy of the content without clearing.
    pub fn peek(&self) -> Option<PendingException> {
        self.pending.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.borrow().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exception(message: &str) -> PendingException {
        PendingException::new(Handle(7), "System.InvalidOperationException", message)
    }

    #[test]
    fn take_clears() {
        let slot = ExceptionSlot::new();
        assert!(!slot.is_pending());
        slot.set(exception("boom"));
        assert_eq!(slot.peek().map(|e| e.message), Some("boom".to_string()));
        assert!(slot.is_pending());
        assert_eq!(slot.take().map(|e| e.message), Some("boom".to_string()));
        assert!(slot.take().is_none());
    }

    #[test]
    fn second_exception_overwrites_first() {
        let slot = ExceptionSlot::new();
        assert!(slot.set(exception("first")).is_none());
        let replaced = slot.set(exception("second"));
        assert_eq!(replaced.map(|e| e.message), Some("first".to_string()));
        assert_eq!(slot.take().map(|e| e.message), Some("second".to_string()));
    }
}
