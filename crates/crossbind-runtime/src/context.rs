//! The runtime context: every native-side table in one value.
//!
//! Generated native code threads a `&RuntimeContext` through initialization
//! and every crossing instead of reaching for process-wide statics, so several
//! independent contexts can live side by side (one per test, for instance).
//!
//! The context is single-threaded. Interior mutability is `Cell`/`RefCell`,
//! and no borrow is held while a trampoline runs, so a trampoline may call
//! back into the same context.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use crossbind_core::{Diagnostic, Diagnostics};

use crate::{
    BridgeError, BridgeException, ExceptionDirection, ExceptionObject, ExceptionSlot, ExportTable, FunctionEntry,
    FunctionTable, Handle, Handshake, NativeExport, ObjectFreeList, PendingException,
    PointerFreeList, RefCountTable, RuntimeError, WireValue,
};

/// Receives every diagnostic the context reports, as it is reported.
pub type MessageCallback = Box<dyn Fn(&Diagnostic)>;

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Capacity of the managed object store, passed through the handshake.
    pub max_objects: u32,
    /// How many diagnostics are kept; older ones are dropped first.
    pub diagnostics_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_objects: 1024,
            diagnostics_capacity: 256,
        }
    }
}

impl RuntimeConfig {
    pub fn with_max_objects(mut self, max_objects: u32) -> Self {
        self.max_objects = max_objects;
        self
    }

    pub fn with_diagnostics_capacity(mut self, capacity: usize) -> Self {
        self.diagnostics_capacity = capacity;
        self
    }
}

type ObjectList = ObjectFreeList<Rc<dyn Any>>;

/// Native handle tables, function pointers and exception slots.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct RuntimeContext {
    state: Rc<ContextState>,
}

/// Non-owning reference to a context, held by exception objects.
#[derive(Clone)]
pub(crate) struct WeakContext(Weak<ContextState>);

impl WeakContext {
    pub(crate) fn upgrade(&self) -> Option<RuntimeContext> {
        self.0.upgrade().map(|state| RuntimeContext { state })
    }
}

struct ContextState {
    config: RuntimeConfig,
    initialized: Cell<bool>,
    capacity: Cell<u32>,
    release_object: RefCell<Option<FunctionEntry>>,
    string_new: RefCell<Option<FunctionEntry>>,
    functions: RefCell<Option<FunctionTable>>,
    exports: RefCell<ExportTable>,
    pointer_lists: RefCell<FxHashMap<String, PointerFreeList>>,
    object_lists: RefCell<FxHashMap<String, ObjectList>>,
    ref_counts: RefCell<FxHashMap<String, RefCountTable>>,
    native_caught_managed: ExceptionSlot,
    managed_caught_native: ExceptionSlot,
    diagnostics: RefCell<Diagnostics>,
    message_callback: RefCell<Option<MessageCallback>>,
}

impl RuntimeContext {
    pub fn new(config: RuntimeConfig) -> Self {
        let diagnostics = Diagnostics::bounded(config.diagnostics_capacity);
        let state = ContextState {
            config,
            initialized: Cell::new(false),
            capacity: Cell::new(0),
            release_object: RefCell::new(None),
            string_new: RefCell::new(None),
            functions: RefCell::new(None),
            exports: RefCell::new(ExportTable::new()),
            pointer_lists: RefCell::new(FxHashMap::default()),
            object_lists: RefCell::new(FxHashMap::default()),
            ref_counts: RefCell::new(FxHashMap::default()),
            native_caught_managed: ExceptionSlot::new(),
            managed_caught_native: ExceptionSlot::new(),
            diagnostics: RefCell::new(diagnostics),
            message_callback: RefCell::new(None),
        };
        Self {
            state: Rc::new(state),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakContext {
        WeakContext(Rc::downgrade(&self.state))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.state.config
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Accept the init handshake.
    ///
    /// `expected` lists the member symbols this side was generated with, in
    /// generation order. A second `init` replaces the previous function table.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn init(&self, handshake: Handshake, expected: &[&str]) -> Result<(), RuntimeError> {
        if handshake.capacity == 0 {
            return Err(RuntimeError::HandshakeMismatch {
                detail: "capacity must be at least 1".to_string(),
            });
        }
        let table = FunctionTable::from_handshake(&handshake, expected)?;
        let members = table.len();
        self.state.capacity.set(handshake.capacity);
        *self.state.release_object.borrow_mut() = Some(handshake.release_object);
        *self.state.string_new.borrow_mut() = Some(handshake.string_new);
        *self.state.functions.borrow_mut() = Some(table);
        self.state.initialized.set(true);
        self.report(Diagnostic::info(format!(
            "initialized with capacity {} and {members} member trampolines",
            handshake.capacity
        )));
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state.initialized.get()
    }

    /// Capacity received in the handshake; 0 before `init`.
    pub fn capacity(&self) -> u32 {
        self.state.capacity.get()
    }

    /// Drop every table and function pointer. Later calls fail with
    /// [`RuntimeError::NotInitialized`] until the next `init`.
    pub fn shutdown(&self) {
        self.state.initialized.set(false);
        self.state.capacity.set(0);
        self.state.release_object.borrow_mut().take();
        self.state.string_new.borrow_mut().take();
        self.state.functions.borrow_mut().take();
        // Dropping object storage may run arbitrary destructors; keep the
        // borrows short.
        let objects = std::mem::take(&mut *self.state.object_lists.borrow_mut());
        drop(objects);
        self.state.pointer_lists.borrow_mut().clear();
        self.state.ref_counts.borrow_mut().clear();
        *self.state.exports.borrow_mut() = ExportTable::new();
        self.state.native_caught_managed.take();
        self.state.managed_caught_native.take();
    }

    fn ensure_initialized(&self, what: &'static str) -> Result<(), RuntimeError> {
        if self.state.initialized.get() {
            Ok(())
        } else {
            Err(RuntimeError::NotInitialized { what })
        }
    }

    // ---------------------------------------------------------------------
    // Native handle tables
    // ---------------------------------------------------------------------

    /// Create the pointer free list for `type_name`, replacing any existing one.
    pub fn register_pointer_list(&self, type_name: impl Into<String>, capacity: u32) {
        let name = type_name.into();
        self.state.pointer_lists
            .borrow_mut()
            .insert(name.clone(), PointerFreeList::new(name, capacity));
    }

    /// Create the whole-object free list for the base type `type_name`.
    pub fn register_object_list(&self, type_name: impl Into<String>, capacity: u32) {
        let name = type_name.into();
        self.state.object_lists
            .borrow_mut()
            .insert(name.clone(), ObjectList::new(name, capacity));
    }

    /// Create the reference count table for the managed value type `type_name`.
    pub fn register_ref_counts(&self, type_name: impl Into<String>, capacity: u32) {
        let name = type_name.into();
        self.state.ref_counts
            .borrow_mut()
            .insert(name.clone(), RefCountTable::new(name, capacity));
    }

    fn unknown_table(type_name: &str) -> RuntimeError {
        RuntimeError::UnknownTable {
            type_name: type_name.to_string(),
        }
    }

    /// # Panics
    ///
    /// If the list is exhausted.
    pub fn store_pointer(&self, type_name: &str, pointer: usize) -> Result<Handle, RuntimeError> {
        self.ensure_initialized("pointer free list")?;
        let mut lists = self.state.pointer_lists.borrow_mut();
        let list = lists
            .get_mut(type_name)
            .ok_or_else(|| Self::unknown_table(type_name))?;
        Ok(list.store(pointer))
    }

    pub fn get_pointer(&self, type_name: &str, handle: Handle) -> Result<Option<usize>, RuntimeError> {
        self.ensure_initialized("pointer free list")?;
        let lists = self.state.pointer_lists.borrow();
        let list = lists
            .get(type_name)
            .ok_or_else(|| Self::unknown_table(type_name))?;
        Ok(list.get(handle))
    }

    pub fn remove_pointer(
        &self,
        type_name: &str,
        handle: Handle,
    ) -> Result<Option<usize>, RuntimeError> {
        self.ensure_initialized("pointer free list")?;
        let mut lists = self.state.pointer_lists.borrow_mut();
        let list = lists
            .get_mut(type_name)
            .ok_or_else(|| Self::unknown_table(type_name))?;
        Ok(list.remove(handle))
    }

    /// Place `object` in the whole-object list of `type_name`.
    ///
    /// # Panics
    ///
    /// If the list is exhausted.
    pub fn allocate_object(
        &self,
        type_name: &str,
        object: Rc<dyn Any>,
    ) -> Result<Handle, RuntimeError> {
        self.ensure_initialized("object free list")?;
        let mut lists = self.state.object_lists.borrow_mut();
        let list = lists
            .get_mut(type_name)
            .ok_or_else(|| Self::unknown_table(type_name))?;
        Ok(list.store(object))
    }

    /// The object in `handle`'s slot. The returned `Rc` keeps the list
    /// unborrowed while the caller uses it.
    pub fn object(&self, type_name: &str, handle: Handle) -> Result<Option<Rc<dyn Any>>, RuntimeError> {
        self.ensure_initialized("object free list")?;
        let lists = self.state.object_lists.borrow();
        let list = lists
            .get(type_name)
            .ok_or_else(|| Self::unknown_table(type_name))?;
        Ok(list.get_ref(handle).cloned())
    }

    /// Give the slot back to the whole-object list.
    pub fn release_object_storage(
        &self,
        type_name: &str,
        handle: Handle,
    ) -> Result<Option<Rc<dyn Any>>, RuntimeError> {
        self.ensure_initialized("object free list")?;
        let removed = {
            let mut lists = self.state.object_lists.borrow_mut();
            let list = lists
                .get_mut(type_name)
                .ok_or_else(|| Self::unknown_table(type_name))?;
            list.remove(handle)
        };
        Ok(removed)
    }

    /// Increment the reference count of a managed value type handle.
    pub fn reference(&self, type_name: &str, handle: Handle) -> Result<(), RuntimeError> {
        self.ensure_initialized("reference counts")?;
        let mut tables = self.state.ref_counts.borrow_mut();
        let table = tables
            .get_mut(type_name)
            .ok_or_else(|| Self::unknown_table(type_name))?;
        table.reference(handle);
        Ok(())
    }

    /// Decrement the reference count; at zero the managed object is released
    /// through the `release_object` callback. Returns whether it was released.
    ///
    /// # Panics
    ///
    /// If the count is already zero.
    pub fn dereference(&self, type_name: &str, handle: Handle) -> Result<bool, BridgeError> {
        self.ensure_initialized("reference counts")?;
        let released = {
            let mut tables = self.state.ref_counts.borrow_mut();
            let table = tables
                .get_mut(type_name)
                .ok_or_else(|| Self::unknown_table(type_name))?;
            table.dereference(handle)
        };
        if released {
            self.release_object(handle)?;
            self.report(
                Diagnostic::info(format!("released managed value type {handle}"))
                    .with_context(type_name),
            );
        }
        Ok(released)
    }

    pub fn ref_count(&self, type_name: &str, handle: Handle) -> Result<i32, RuntimeError> {
        let tables = self.state.ref_counts.borrow();
        let table = tables
            .get(type_name)
            .ok_or_else(|| Self::unknown_table(type_name))?;
        Ok(table.count(handle))
    }

    // ---------------------------------------------------------------------
    // Calls into managed code
    // ---------------------------------------------------------------------

    fn invoke_entry(
        &self,
        entry: &FunctionEntry,
        symbol: &str,
        args: &[WireValue],
    ) -> Result<WireValue, RuntimeError> {
        match entry {
            FunctionEntry::Hosted(f) => Ok(f(self, args)),
            FunctionEntry::Raw(raw) => raw.call(args).inspect_err(|err| {
                self.report(Diagnostic::error(format!("raw call failed: {err}")).with_context(symbol));
            }),
        }
    }

    /// Call member trampoline `index` and run the post-call exception check.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call(&self, index: usize, args: &[WireValue]) -> Result<WireValue, BridgeError> {
        self.ensure_initialized("function table")?;
        let (entry, symbol) = {
            let functions = self.state.functions.borrow();
            let table = functions
                .as_ref()
                .ok_or(RuntimeError::NotInitialized { what: "function table" })?;
            let entry = table.entry(index)?.clone();
            (entry, table.symbol(index).unwrap_or_default().to_string())
        };
        let result = self.invoke_entry(&entry, &symbol, args)?;
        self.check_exception()?;
        Ok(result)
    }

    /// [`call`](Self::call) by symbol instead of index.
    pub fn call_symbol(&self, symbol: &str, args: &[WireValue]) -> Result<WireValue, BridgeError> {
        let index = self
            .state
            .functions
            .borrow()
            .as_ref()
            .and_then(|table| table.index_of(symbol));
        match index {
            Some(index) => self.call(index, args),
            None if !self.is_initialized() => Err(RuntimeError::NotInitialized {
                what: "function table",
            }
            .into()),
            None => Err(RuntimeError::HandshakeMismatch {
                detail: format!("no member trampoline named {symbol}"),
            }
            .into()),
        }
    }

    /// Index of `symbol` in the function table.
    pub fn function_index(&self, symbol: &str) -> Option<usize> {
        self.state.functions.borrow().as_ref()?.index_of(symbol)
    }

    /// Ask the managed side to drop the object behind `handle`.
    pub fn release_object(&self, handle: Handle) -> Result<(), BridgeError> {
        if handle.is_null() {
            return Ok(());
        }
        self.ensure_initialized("release_object")?;
        let entry = self
            .state
            .release_object
            .borrow()
            .clone()
            .ok_or(RuntimeError::NotInitialized { what: "release_object" })?;
        self.invoke_entry(&entry, "ReleaseObject", &[WireValue::Handle(handle)])?;
        self.check_exception()?;
        Ok(())
    }

    /// Create a managed string from `text` and return its handle.
    pub fn string_new(&self, text: &str) -> Result<Handle, BridgeError> {
        self.ensure_initialized("string_new")?;
        let entry = self
            .state
            .string_new
            .borrow()
            .clone()
            .ok_or(RuntimeError::NotInitialized { what: "string_new" })?;
        let result = self.invoke_entry(&entry, "StringNew", &[WireValue::Utf8(Rc::from(text))])?;
        self.check_exception()?;
        Ok(result.as_handle()?)
    }

    // ---------------------------------------------------------------------
    // Exception relay
    // ---------------------------------------------------------------------

    fn slot(&self, direction: ExceptionDirection) -> &ExceptionSlot {
        match direction {
            ExceptionDirection::NativeCaughtManaged => &self.state.native_caught_managed,
            ExceptionDirection::ManagedCaughtNative => &self.state.managed_caught_native,
        }
    }

    fn raise(&self, direction: ExceptionDirection, exception: PendingException) {
        let summary = exception.to_string();
        if let Some(replaced) = self.slot(direction).set(exception) {
            self.report(
                Diagnostic::warning(format!(
                    "pending exception {replaced} overwritten by {summary} before it was consumed"
                ))
                .with_context(format!("{direction:?}")),
            );
        }
    }

    /// Called by a managed trampoline that caught an exception.
    pub fn raise_managed_exception(&self, exception: PendingException) {
        self.report(
            Diagnostic::error(format!("managed exception caught in trampoline: {exception}"))
                .with_context("NativeCaughtManaged"),
        );
        self.raise(ExceptionDirection::NativeCaughtManaged, exception);
    }

    /// Called by a native-invoke trampoline whose body failed.
    pub fn raise_native_exception(&self, exception: PendingException) {
        self.report(
            Diagnostic::error(format!("native exception caught in export: {exception}"))
                .with_context("ManagedCaughtNative"),
        );
        self.raise(ExceptionDirection::ManagedCaughtNative, exception);
    }

    /// Post-call check at a native call site: clear and re-raise.
    ///
    /// The returned exception takes ownership of the managed exception
    /// object; dropping it releases the object.
    pub fn check_exception(&self) -> Result<(), BridgeException> {
        match self.state.native_caught_managed.take() {
            Some(mut pending) => {
                if pending.object.is_none() && !pending.handle.is_null() {
                    pending.object = Some(Rc::new(ExceptionObject::new(
                        pending.handle,
                        self.downgrade(),
                    )));
                }
                Err(pending.into())
            }
            None => Ok(()),
        }
    }

    /// Post-call check at a managed call site.
    pub fn check_native_exception(&self) -> Result<(), BridgeException> {
        match self.state.managed_caught_native.take() {
            Some(pending) => Err(pending.into()),
            None => Ok(()),
        }
    }

    /// Look at a slot without consuming it.
    pub fn pending_exception(&self, direction: ExceptionDirection) -> Option<PendingException> {
        self.slot(direction).peek()
    }

    // ---------------------------------------------------------------------
    // Native exports
    // ---------------------------------------------------------------------

    pub fn register_export(&self, symbol: impl Into<String>, export: NativeExport) {
        self.state.exports.borrow_mut().register(symbol, export);
    }

    pub fn resolve_export(&self, symbol: &str) -> Result<NativeExport, RuntimeError> {
        self.ensure_initialized("export table")?;
        self.state.exports.borrow().resolve(symbol)
    }

    pub fn has_export(&self, symbol: &str) -> bool {
        self.state.exports.borrow().contains(symbol)
    }

    /// Run a native export the way its trampoline does: a failure is parked
    /// in the managed-caught-native slot and a void result is returned.
    pub fn invoke_export(&self, symbol: &str, args: &[WireValue]) -> Result<WireValue, RuntimeError> {
        let export = self.resolve_export(symbol)?;
        match export(self, args) {
            Ok(value) => Ok(value),
            Err(exception) => {
                self.raise_native_exception(exception.into());
                Ok(WireValue::Void)
            }
        }
    }

    /// [`invoke_export`](Self::invoke_export) followed by the managed-side check.
    pub fn call_export(&self, symbol: &str, args: &[WireValue]) -> Result<WireValue, BridgeError> {
        let result = self.invoke_export(symbol, args)?;
        self.check_native_exception()?;
        Ok(result)
    }

    // ---------------------------------------------------------------------
    // Diagnostics
    // ---------------------------------------------------------------------

    pub fn report(&self, diagnostic: Diagnostic) {
        if let Some(callback) = self.state.message_callback.borrow().as_ref() {
            callback(&diagnostic);
        }
        self.state.diagnostics.borrow_mut().add_diagnostic(diagnostic);
    }

    /// Snapshot of the retained diagnostics.
    pub fn diagnostics(&self) -> Diagnostics {
        self.state.diagnostics.borrow().clone()
    }

    pub fn clear_diagnostics(&self) {
        self.state.diagnostics.borrow_mut().clear();
    }

    pub fn set_message_callback(&self, callback: impl Fn(&Diagnostic) + 'static) {
        *self.state.message_callback.borrow_mut() = Some(Box::new(callback));
    }

    pub fn clear_message_callback(&self) {
        self.state.message_callback.borrow_mut().take();
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("config", &self.state.config)
            .field("initialized", &self.state.initialized.get())
            .field("capacity", &self.state.capacity.get())
            .field("exports", &*self.state.exports.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbind_core::DiagnosticKind;

    fn released_log() -> Rc<RefCell<Vec<Handle>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn context_with(members: Vec<(&str, FunctionEntry)>, released: Rc<RefCell<Vec<Handle>>>) -> RuntimeContext {
        let ctx = RuntimeContext::default();
        let release = FunctionEntry::hosted(move |_, args| {
            if let Some(WireValue::Handle(h)) = args.first() {
                released.borrow_mut().push(*h);
            }
            WireValue::Void
        });
        let string_new = FunctionEntry::hosted(|_, _| WireValue::Handle(Handle(42)));
        let mut handshake = Handshake::new(8, release, string_new);
        let mut symbols = Vec::new();
        for (symbol, entry) in members {
            symbols.push(symbol);
            handshake = handshake.with_member(symbol, entry);
        }
        ctx.init(handshake, &symbols).unwrap();
        ctx
    }

    #[test]
    fn calls_before_init_fail() {
        let ctx = RuntimeContext::default();
        ctx.register_pointer_list("Calc", 4);
        assert!(matches!(
            ctx.store_pointer("Calc", 0x10),
            Err(RuntimeError::NotInitialized { .. })
        ));
        assert!(matches!(
            ctx.call(0, &[]),
            Err(BridgeError::Runtime(RuntimeError::NotInitialized { .. }))
        ));
    }

    #[test]
    fn add_through_function_table() {
        let add = FunctionEntry::hosted(|_, args| {
            let a = i32::try_from(args[0].clone()).unwrap();
            let b = i32::try_from(args[1].clone()).unwrap();
            WireValue::I32(a + b)
        });
        let ctx = context_with(vec![("MyGameCalcMethodAddSystemInt32SystemInt32", add)], released_log());
        let result = ctx
            .call_symbol(
                "MyGameCalcMethodAddSystemInt32SystemInt32",
                &[WireValue::I32(2), WireValue::I32(3)],
            )
            .unwrap();
        assert_eq!(result, WireValue::I32(5));
    }

    #[test]
    fn dereference_releases_once() {
        let released = released_log();
        let ctx = context_with(Vec::new(), released.clone());
        ctx.register_ref_counts("MyGame.Named", 8);
        let h = Handle(3);
        ctx.reference("MyGame.Named", h).unwrap();
        ctx.reference("MyGame.Named", h).unwrap();

        assert!(!ctx.dereference("MyGame.Named", h).unwrap());
        assert!(released.borrow().is_empty());
        assert!(ctx.dereference("MyGame.Named", h).unwrap());
        assert_eq!(*released.borrow(), vec![h]);
    }

    #[test]
    fn thrown_exception_reaches_call_site() {
        let throws = FunctionEntry::hosted(|ctx, _| {
            ctx.raise_managed_exception(PendingException::new(
                Handle(5),
                "System.InvalidOperationException",
                "calc is broken",
            ));
            WireValue::I32(0)
        });
        let ctx = context_with(vec![("MyGameCalcMethodFail", throws)], released_log());
        let err = ctx.call(0, &[]).unwrap_err();
        let exception = err.exception().unwrap();
        assert_eq!(exception.message, "calc is broken");
        assert_eq!(exception.handle, Handle(5));
        assert!(ctx.pending_exception(ExceptionDirection::NativeCaughtManaged).is_none());
        assert!(ctx.diagnostics().has_errors());
    }

    #[test]
    fn consumed_exception_releases_its_object() {
        let released = released_log();
        let throws = FunctionEntry::hosted(|ctx, _| {
            ctx.raise_managed_exception(PendingException::new(Handle(5), "System.Exception", "x"));
            WireValue::Void
        });
        let ctx = context_with(vec![("MyGameCalcMethodFail", throws)], released.clone());
        let err = ctx.call(0, &[]).unwrap_err();
        let exception = err.exception().unwrap().clone();
        assert!(exception.owns_object());

        drop(err);
        assert!(released.borrow().is_empty());
        drop(exception);
        assert_eq!(*released.borrow(), vec![Handle(5)]);
    }

    #[test]
    fn overwrite_is_reported() {
        let ctx = context_with(Vec::new(), released_log());
        ctx.raise_managed_exception(PendingException::new(Handle(1), "E", "first"));
        ctx.raise_managed_exception(PendingException::new(Handle(2), "E", "second"));
        assert!(ctx.diagnostics().has_warnings());
        assert_eq!(ctx.check_exception().unwrap_err().message, "second");
    }

    #[test]
    fn export_failure_is_parked() {
        let ctx = context_with(Vec::new(), released_log());
        ctx.register_export(
            "MyGameBaseCalcUpdate",
            Rc::new(|_: &RuntimeContext, _: &[WireValue]| {
                Err(BridgeException::native("NativeError", "bad update"))
            }),
        );
        assert_eq!(ctx.invoke_export("MyGameBaseCalcUpdate", &[]).unwrap(), WireValue::Void);
        assert!(ctx.pending_exception(ExceptionDirection::ManagedCaughtNative).is_some());
        assert_eq!(ctx.check_native_exception().unwrap_err().message, "bad update");

        let err = ctx.call_export("MyGameBaseCalcUpdate", &[]).unwrap_err();
        assert_eq!(err.exception().map(|e| e.type_name.as_str()), Some("NativeError"));
    }

    #[test]
    fn string_new_returns_handle() {
        let ctx = context_with(Vec::new(), released_log());
        assert_eq!(ctx.string_new("hello").unwrap(), Handle(42));
    }

    #[test]
    fn object_storage_round_trip() {
        let ctx = context_with(Vec::new(), released_log());
        ctx.register_object_list("MyGame.BaseCalc", 2);
        let h = ctx.allocate_object("MyGame.BaseCalc", Rc::new(7_i32)).unwrap();
        let object = ctx.object("MyGame.BaseCalc", h).unwrap().unwrap();
        assert_eq!(object.downcast_ref::<i32>(), Some(&7));
        assert!(ctx.release_object_storage("MyGame.BaseCalc", h).unwrap().is_some());
        assert!(ctx.object("MyGame.BaseCalc", h).unwrap().is_none());
    }

    #[test]
    fn unknown_table() {
        let ctx = context_with(Vec::new(), released_log());
        assert!(matches!(
            ctx.store_pointer("Missing", 1),
            Err(RuntimeError::UnknownTable { .. })
        ));
    }

    #[test]
    fn shutdown_disables_everything() {
        let ctx = context_with(Vec::new(), released_log());
        ctx.register_pointer_list("Calc", 2);
        ctx.store_pointer("Calc", 0x10).unwrap();
        ctx.shutdown();
        assert!(!ctx.is_initialized());
        assert!(matches!(
            ctx.get_pointer("Calc", Handle(1)),
            Err(RuntimeError::NotInitialized { .. })
        ));
        assert!(ctx.string_new("x").is_err());
    }

    #[test]
    fn message_callback_sees_reports() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let ctx = RuntimeContext::new(RuntimeConfig::default().with_diagnostics_capacity(2));
        let sink = seen.clone();
        ctx.set_message_callback(move |d| sink.borrow_mut().push(d.kind));
        ctx.report(Diagnostic::info("one"));
        ctx.report(Diagnostic::warning("two"));
        ctx.report(Diagnostic::error("three"));
        assert_eq!(
            *seen.borrow(),
            vec![DiagnosticKind::Info, DiagnosticKind::Warning, DiagnosticKind::Error]
        );
        assert_eq!(ctx.diagnostics().len(), 2);
    }

    thread_local! {
        static FFI_RELEASED: RefCell<Vec<u32>> = const { RefCell::new(Vec::new()) };
    }

    extern "C" fn ffi_release(handle: u32) {
        FFI_RELEASED.with(|r| r.borrow_mut().push(handle));
    }

    extern "C" fn ffi_string_new(_utf8: *const std::ffi::c_char) -> u32 {
        9
    }

    extern "C" fn ffi_add(a: i32, b: i32) -> i32 {
        a + b
    }

    unsafe fn invoke_add(address: usize, args: &[WireValue]) -> Result<WireValue, RuntimeError> {
        let f = unsafe { std::mem::transmute::<usize, extern "C" fn(i32, i32) -> i32>(address) };
        let a = i32::try_from(crate::ffi::raw_arg(args, 0)?.clone())?;
        let b = i32::try_from(crate::ffi::raw_arg(args, 1)?.clone())?;
        Ok(WireValue::from(f(a, b)))
    }

    #[test]
    fn raw_entries_call_through_their_invokers() {
        let ctx = RuntimeContext::default();
        let invokers: &[crate::ffi::RawInvoker] = &[invoke_add];
        let pointers = [ffi_release as usize, ffi_string_new as usize, ffi_add as usize];
        let handshake = unsafe { Handshake::from_raw(4, &pointers, &["Add"], invokers) }.unwrap();
        ctx.init(handshake, &["Add"]).unwrap();

        assert_eq!(
            ctx.call(0, &[WireValue::I32(20), WireValue::I32(22)]).unwrap(),
            WireValue::I32(42)
        );
        assert_eq!(ctx.string_new("x").unwrap(), Handle(9));
        ctx.release_object(Handle(5)).unwrap();
        assert_eq!(FFI_RELEASED.with(|r| r.borrow().clone()), vec![5]);

        // a wire mismatch is a bridge error, not a call with garbage
        assert!(matches!(
            ctx.call(0, &[WireValue::F32(1.0), WireValue::I32(1)]),
            Err(BridgeError::Runtime(RuntimeError::WireMismatch { .. }))
        ));
    }

    #[test]
    fn zero_capacity_rejected() {
        let ctx = RuntimeContext::default();
        let noop = || FunctionEntry::hosted(|_, _| WireValue::Void);
        let handshake = Handshake::new(0, noop(), noop());
        assert!(ctx.init(handshake, &[]).is_err());
    }
}
