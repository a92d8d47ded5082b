//! Runtime support for crossbind bindings.
//!
//! Everything generated code needs once both sides are running:
//!
//! - [`HandleRegistry`]: the managed object store, handles issued from a
//!   LIFO free stack under one coarse lock
//! - [`PointerFreeList`] / [`ObjectFreeList`]: per-type native tables
//! - [`RefCountTable`]: shared ownership of managed value type proxies
//! - [`ExceptionSlot`]: the single-slot exception relay
//! - [`WireValue`]: the shape of every value that crosses the boundary
//! - [`Handshake`] / [`FunctionTable`] / [`ExportTable`]: wiring both sides together
//! - [`ffi`]: raw entry points and their invokers, for the C ABI
//! - [`construct_subclass`] / [`destroy_subclass`] / [`release_subclass`]: native subclasses of managed base types
//! - [`RuntimeContext`]: all of the above in one explicit value
//!
//! # Example
//!
//! ```
//! use crossbind_runtime::{FunctionEntry, Handshake, RuntimeContext, WireValue};
//!
//! let ctx = RuntimeContext::default();
//! let add = FunctionEntry::hosted(|_, args| match args {
//!     [WireValue::I32(a), WireValue::I32(b)] => WireValue::I32(a + b),
//!     _ => WireValue::Void,
//! });
//! let handshake = Handshake::new(
//!     16,
//!     FunctionEntry::hosted(|_, _| WireValue::Void),
//!     FunctionEntry::hosted(|_, _| WireValue::Void),
//! )
//! .with_member("MyGameCalcMethodAddSystemInt32SystemInt32", add);
//! ctx.init(handshake, &["MyGameCalcMethodAddSystemInt32SystemInt32"])?;
//!
//! let sum = ctx.call(0, &[WireValue::I32(2), WireValue::I32(3)])?;
//! assert_eq!(sum, WireValue::I32(5));
//! # Ok::<(), crossbind_runtime::BridgeError>(())
//! ```

mod context;
mod error;
mod exception;
pub mod ffi;
mod free_list;
mod functions;
mod handle;
mod handle_registry;
mod ref_count;
mod subclass;
mod wire;

pub use context::{MessageCallback, RuntimeConfig, RuntimeContext};
pub use crossbind_core::{Diagnostic, DiagnosticKind, Diagnostics};
pub use error::{BridgeError, BridgeException, RuntimeError};
pub use exception::{ExceptionDirection, ExceptionObject, ExceptionSlot, PendingException};
pub use free_list::{FreeList, ObjectFreeList, PointerFreeList};
pub use functions::{ExportTable, FunctionEntry, FunctionTable, Handshake, ManagedFn, NativeExport};
pub use handle::Handle;
pub use handle_registry::HandleRegistry;
pub use ref_count::RefCountTable;
pub use subclass::{
    SubclassSlot, construct_subclass, destroy_subclass, release_subclass, subclass_slot,
};
pub use wire::{RawWire, WireValue};
