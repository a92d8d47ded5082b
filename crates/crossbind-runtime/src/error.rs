//! Runtime errors.
//!
//! Two kinds of failure exist at runtime. Logic and configuration faults
//! (an out-of-range handle, an exhausted native free list, a reference count
//! going negative) indicate a bug in generated code or a violated capacity
//! assumption and panic. Everything in this module is recoverable: either
//! a [`RuntimeError`] from the bridge plumbing or a [`BridgeException`]
//! relayed from the other side of the boundary.

use std::rc::Rc;

use thiserror::Error;

use crate::{ExceptionObject, Handle, PendingException};

/// Recoverable failures of the bridge itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// The store or context has not been initialized, or was shut down.
    #[error("runtime not initialized: {what}")]
    NotInitialized { what: &'static str },

    /// The managed object store has no free handle left.
    #[error("object store exhausted: all {capacity} handles are in use")]
    StoreExhausted { capacity: u32 },

    /// The init handshake does not match the bindings this side was built with.
    #[error("init handshake mismatch: {detail}")]
    HandshakeMismatch { detail: String },

    /// No native export is registered under the symbol.
    #[error("unknown native export: {symbol}")]
    UnknownExport { symbol: String },

    /// A value of the wrong shape crossed the boundary.
    #[error("wire mismatch: expected {expected}, found {found}")]
    WireMismatch { expected: String, found: String },

    /// A per-type native table was used before being registered.
    #[error("no native table registered for {type_name}")]
    UnknownTable { type_name: String },

    /// A function table index past the end of the table.
    #[error("function index {index} out of range ({len} entries)")]
    FunctionIndex { index: usize, len: usize },
}

/// An exception thrown on one side of the boundary and re-raised on the other.
///
/// Carries the handle of the original exception object so the caller can
/// reach it, plus its type name and message so they survive the round trip.
///
/// An exception re-raised by [`RuntimeContext::check_exception`] owns the
/// managed object: it stays alive while any clone of the exception does and
/// is released when the last one is dropped.
///
/// [`RuntimeContext::check_exception`]: crate::RuntimeContext::check_exception
#[derive(Debug, Clone, Error)]
#[error("{type_name}: {message}")]
pub struct BridgeException {
    /// Handle of the original exception object; null for native exceptions.
    pub handle: Handle,
    pub type_name: String,
    pub message: String,
    object: Option<Rc<ExceptionObject>>,
}

impl BridgeException {
    pub fn new(handle: Handle, type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            handle,
            type_name: type_name.into(),
            message: message.into(),
            object: None,
        }
    }

    /// An exception raised by native code, with no managed object behind it.
    pub fn native(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Handle::NULL, type_name, message)
    }

    /// Whether this exception keeps its managed object alive.
    pub fn owns_object(&self) -> bool {
        self.object.is_some()
    }
}

impl PartialEq for BridgeException {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
            && self.type_name == other.type_name
            && self.message == other.message
    }
}

impl Eq for BridgeException {}

impl From<PendingException> for BridgeException {
    fn from(pending: PendingException) -> Self {
        Self {
            handle: pending.handle,
            type_name: pending.type_name,
            message: pending.message,
            object: pending.object,
        }
    }
}

impl From<BridgeException> for PendingException {
    fn from(exception: BridgeException) -> Self {
        PendingException {
            handle: exception.handle,
            type_name: exception.type_name,
            message: exception.message,
            object: exception.object,
        }
    }
}

/// Inside a native export a bridge failure surfaces to the managed caller as
/// an exception.
impl From<RuntimeError> for BridgeException {
    fn from(err: RuntimeError) -> Self {
        Self::native("System.InvalidOperationException", err.to_string())
    }
}

impl From<BridgeError> for BridgeException {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Exception(exception) => exception,
            BridgeError::Runtime(runtime) => runtime.into(),
        }
    }
}

/// Result of a cross-boundary call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The callee threw; re-raised at the call site.
    #[error(transparent)]
    Exception(#[from] BridgeException),

    /// The bridge itself failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl BridgeError {
    /// The relayed exception, if this is one.
    pub fn exception(&self) -> Option<&BridgeException> {
        match self {
            BridgeError::Exception(e) => Some(e),
            BridgeError::Runtime(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_error_becomes_native_exception() {
        let exception: BridgeException = RuntimeError::UnknownExport {
            symbol: "MyGameHandlerNativeInvoke".to_string(),
        }
        .into();
        assert!(exception.handle.is_null());
        assert_eq!(exception.type_name, "System.InvalidOperationException");
        assert!(exception.message.contains("MyGameHandlerNativeInvoke"));
    }

    #[test]
    fn relayed_exception_passes_through() {
        let original = BridgeException::new(Handle(4), "System.ArgumentException", "bad");
        let back: BridgeException = BridgeError::from(original.clone()).into();
        assert_eq!(back, original);
    }
}
