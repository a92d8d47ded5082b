//! In-process bridge.
//!
//! Executes a [`BindingPlan`] without a managed runtime. The "managed side"
//! is a [`ManagedHost`]: a [`HandleRegistry`] of `Rc<dyn Any>` objects and
//! one Rust closure per trampoline symbol standing in for the managed body.
//! [`HostedBridge::handshake`] wraps every closure the way a generated C#
//! trampoline wraps its body:
//!
//! - the body runs inside a catch; declared exception types are matched
//!   before the catch-all
//! - a caught exception is stored in the host, its handle written to the
//!   native-caught-managed slot, and a zero value of the return type returned
//!
//! Native call sites are [`RuntimeContext::call`], exactly what generated
//! native code calls, so the post-call check-and-rethrow runs unchanged.
//!
//! ```
//! use crossbind::hosted::HostedBridge;
//! use crossbind::{BindingSpec, Generator, RuntimeContext, TypeCatalog, TypeShape, TypeSpec, WireValue};
//!
//! let mut catalog = TypeCatalog::with_system_types();
//! catalog.register(TypeShape::class("MyGame.Calc").method("static int Twice(int x)")?)?;
//! let spec = BindingSpec::new().with_type(TypeSpec::new("MyGame.Calc").method("Twice", &["int"]));
//! let plan = Generator::new(&catalog).plan(&spec)?;
//!
//! let bridge = HostedBridge::new(plan);
//! bridge.implement("MyGameCalcMethodTwiceSystemInt32", |_, _, args| match args {
//!     [WireValue::I32(x)] => Ok(WireValue::I32(x * 2)),
//!     _ => Ok(WireValue::I32(0)),
//! });
//!
//! let ctx = RuntimeContext::default();
//! bridge.open(&ctx, 16)?;
//! let doubled = ctx.call(0, &[WireValue::I32(21)])?;
//! assert_eq!(doubled, WireValue::I32(42));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crossbind_codegen::{BindingPlan, MemberBinding, WireType};
use crossbind_core::TypeKind;
use crossbind_runtime::{
    BridgeError, Diagnostic, FunctionEntry, Handle, HandleRegistry, Handshake, PendingException,
    RuntimeContext, RuntimeError, WireValue,
};

/// An exception thrown by a hosted managed body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{type_name}: {message}")]
pub struct ManagedThrow {
    pub type_name: String,
    pub message: String,
}

impl ManagedThrow {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
        }
    }
}

/// Body of one hosted managed trampoline. Receives the wire arguments in
/// trampoline order: native handle (stub constructors), `this`, parameters.
pub type ManagedImpl =
    Rc<dyn Fn(&ManagedHost, &RuntimeContext, &[WireValue]) -> Result<WireValue, ManagedThrow>>;

/// Managed half of a native subclass instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedStub {
    native: Cell<Handle>,
    /// Full name of the stub type.
    pub stub_type: String,
}

impl HostedStub {
    pub fn new(native: Handle, stub_type: impl Into<String>) -> Self {
        Self {
            native: Cell::new(native),
            stub_type: stub_type.into(),
        }
    }

    /// Handle of the native subclass slot; null once detached.
    pub fn native(&self) -> Handle {
        self.native.get()
    }

    /// Forget the native instance. Later overrides return zero and `Dispose`
    /// does nothing, as in the generated stub.
    pub fn detach(&self) {
        self.native.set(Handle::NULL);
    }
}

/// The hosted managed runtime: an object store and trampoline bodies.
pub struct ManagedHost {
    objects: HandleRegistry<Rc<dyn Any>>,
    implementations: RefCell<FxHashMap<String, ManagedImpl>>,
    released: Cell<usize>,
}

impl ManagedHost {
    pub fn new() -> Self {
        Self {
            objects: HandleRegistry::new(),
            implementations: RefCell::new(FxHashMap::default()),
            released: Cell::new(0),
        }
    }

    /// The managed object store.
    pub fn objects(&self) -> &HandleRegistry<Rc<dyn Any>> {
        &self.objects
    }

    pub fn store(&self, object: Rc<dyn Any>) -> Result<Handle, RuntimeError> {
        self.objects.store(Some(object))
    }

    pub fn store_value<T: Any>(&self, value: T) -> Result<Handle, RuntimeError> {
        self.store(Rc::new(value))
    }

    pub fn get(&self, handle: Handle) -> Option<Rc<dyn Any>> {
        self.objects.get(handle)
    }

    /// The object behind `handle` if it is a `T`.
    pub fn get_as<T: Any>(&self, handle: Handle) -> Option<Rc<T>> {
        self.get(handle)?.downcast::<T>().ok()
    }

    /// Managed strings are stored as `String`.
    pub fn string(&self, handle: Handle) -> Option<Rc<String>> {
        self.get_as::<String>(handle)
    }

    pub fn live_count(&self) -> usize {
        self.objects.live_count()
    }

    /// How many objects the release callback has removed.
    pub fn released_count(&self) -> usize {
        self.released.get()
    }

    pub fn implement(
        &self,
        symbol: impl Into<String>,
        body: impl Fn(&ManagedHost, &RuntimeContext, &[WireValue]) -> Result<WireValue, ManagedThrow> + 'static,
    ) {
        self.implementations
            .borrow_mut()
            .insert(symbol.into(), Rc::new(body));
    }

    fn implementation(&self, symbol: &str) -> Option<ManagedImpl> {
        self.implementations.borrow().get(symbol).cloned()
    }

    fn release(&self, handle: Handle) {
        // The removed object drops after the store lock is released.
        if let Some(object) = self.objects.remove(handle) {
            if let Some(stub) = object.downcast_ref::<HostedStub>() {
                stub.detach();
            }
            self.released.set(self.released.get() + 1);
        }
    }

    /// Catch `thrown` the way a trampoline's catch clauses do.
    fn catch(&self, ctx: &RuntimeContext, symbol: &str, declared: &[String], thrown: ManagedThrow) {
        let clause = if declared.iter().any(|d| *d == thrown.type_name) {
            thrown.type_name.as_str()
        } else {
            "System.Exception"
        };
        ctx.report(Diagnostic::info(format!("caught by catch ({clause})")).with_context(symbol));
        let handle = self.store(Rc::new(thrown.clone())).unwrap_or_else(|err| {
            ctx.report(Diagnostic::warning(format!("exception object not stored: {err}")).with_context(symbol));
            Handle::NULL
        });
        ctx.raise_managed_exception(PendingException::new(handle, thrown.type_name, thrown.message));
    }
}

impl Default for ManagedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ManagedHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedHost")
            .field("live", &self.live_count())
            .field("implementations", &self.implementations.borrow().len())
            .field("released", &self.released.get())
            .finish()
    }
}

/// Runs a plan in-process against a [`ManagedHost`].
pub struct HostedBridge {
    plan: Rc<BindingPlan>,
    host: Rc<ManagedHost>,
}

impl HostedBridge {
    pub fn new(plan: BindingPlan) -> Self {
        Self {
            plan: Rc::new(plan),
            host: Rc::new(ManagedHost::new()),
        }
    }

    pub fn plan(&self) -> &BindingPlan {
        &self.plan
    }

    pub fn host(&self) -> &ManagedHost {
        &self.host
    }

    /// Provide the managed body of the trampoline `symbol`. May be called
    /// before or after [`open`](Self::open).
    pub fn implement(
        &self,
        symbol: impl Into<String>,
        body: impl Fn(&ManagedHost, &RuntimeContext, &[WireValue]) -> Result<WireValue, ManagedThrow> + 'static,
    ) {
        self.host.implement(symbol, body);
    }

    /// Initialize the host store with `capacity` handles and build the
    /// handshake: release, string construction, then one entry per member in
    /// plan order.
    pub fn handshake(&self, capacity: u32) -> Handshake {
        self.host.objects.init(capacity);

        let host = Rc::clone(&self.host);
        let release = FunctionEntry::hosted(move |_, args| {
            if let Some(WireValue::Handle(handle)) = args.first() {
                host.release(*handle);
            }
            WireValue::Void
        });

        let host = Rc::clone(&self.host);
        let string_new = FunctionEntry::hosted(move |ctx, args| {
            let text = args.first().and_then(|a| a.as_utf8().ok()).unwrap_or_default();
            match host.store_value(text.to_string()) {
                Ok(handle) => WireValue::Handle(handle),
                Err(err) => {
                    host.catch(
                        ctx,
                        "StringNew",
                        &[],
                        ManagedThrow::new("System.OutOfMemoryException", err.to_string()),
                    );
                    WireValue::Handle(Handle::NULL)
                }
            }
        });

        let mut handshake = Handshake::new(capacity, release, string_new);
        for ty in &self.plan.types {
            for member in &ty.members {
                handshake = handshake.with_member(member.symbol.clone(), self.trampoline(member, None));
            }
        }
        for base in &self.plan.base_types {
            for ctor in &base.constructors {
                let entry = self.trampoline(ctor, Some(base.stub.full_name()));
                handshake = handshake.with_member(ctor.symbol.clone(), entry);
            }
        }
        handshake
    }

    fn trampoline(&self, member: &MemberBinding, stub_type: Option<String>) -> FunctionEntry {
        let host = Rc::clone(&self.host);
        let plan = Rc::clone(&self.plan);
        let symbol = member.symbol.clone();
        let declared: Vec<String> = member
            .descriptor
            .exceptions
            .iter()
            .map(|e| e.to_string())
            .collect();
        let ret = member.ret.clone();

        FunctionEntry::hosted(move |ctx, args| {
            let outcome = match (host.implementation(&symbol), &stub_type) {
                (Some(body), _) => body(&host, ctx, args),
                (None, Some(stub_type)) => default_stub(&host, stub_type, args),
                (None, None) => Err(ManagedThrow::new(
                    "System.MissingMethodException",
                    format!("no managed body for {symbol}"),
                )),
            };
            match outcome {
                Ok(value) => value,
                Err(thrown) => {
                    host.catch(ctx, &symbol, &declared, thrown);
                    zero_value(&plan, &ret)
                }
            }
        })
    }

    /// Accept the handshake into `ctx` and create the native tables the
    /// generated `init` would create.
    pub fn open(&self, ctx: &RuntimeContext, capacity: u32) -> Result<(), RuntimeError> {
        let symbols = self.plan.handshake_symbols();
        ctx.init(self.handshake(capacity), &symbols)?;
        for ty in self.plan.types.iter().filter(|t| t.has_proxy()) {
            let name = ty.full_name();
            ctx.register_pointer_list(name.clone(), ty.capacity.max(1));
            if ty.descriptor.kind == TypeKind::ManagedValueType {
                ctx.register_ref_counts(name.clone(), ctx.capacity());
            }
            if ty.native_invoke.is_some() {
                ctx.register_object_list(name, ty.capacity.max(1));
            }
        }
        for base in &self.plan.base_types {
            let name = base.stub.full_name();
            ctx.register_object_list(name.clone(), base.capacity.max(1));
            ctx.register_ref_counts(name, ctx.capacity());
        }
        Ok(())
    }

    /// Call a member trampoline by symbol from the native side.
    pub fn call(&self, ctx: &RuntimeContext, symbol: &str, args: &[WireValue]) -> Result<WireValue, BridgeError> {
        ctx.call_symbol(symbol, args)
    }

    /// Managed code calling an overridden member on a stub: forwards to the
    /// native-invoke export with the stub's native handle first. A detached
    /// stub returns zero without crossing.
    pub fn call_override(
        &self,
        ctx: &RuntimeContext,
        stub: Handle,
        symbol: &str,
        args: &[WireValue],
    ) -> Result<WireValue, BridgeError> {
        let native = self.stub(stub)?.native();
        if native.is_null() {
            let ret = self
                .plan
                .native_invokes()
                .find(|invoke| invoke.symbol == symbol)
                .map(|invoke| invoke.ret.clone())
                .ok_or_else(|| RuntimeError::UnknownExport {
                    symbol: symbol.to_string(),
                })?;
            return Ok(zero_value(&self.plan, &ret));
        }
        let mut forwarded = Vec::with_capacity(args.len() + 1);
        forwarded.push(WireValue::Handle(native));
        forwarded.extend_from_slice(args);
        ctx.call_export(symbol, &forwarded)
    }

    /// Managed `Dispose` on a stub: calls the release export of its base type
    /// once, then detaches the stub.
    pub fn dispose_stub(&self, ctx: &RuntimeContext, stub: Handle) -> Result<(), BridgeError> {
        let record = self.stub(stub)?;
        let native = record.native();
        if native.is_null() {
            return Ok(());
        }
        let base = self
            .plan
            .find_base_type(&record.stub_type)
            .ok_or_else(|| RuntimeError::UnknownTable {
                type_name: record.stub_type.clone(),
            })?;
        record.detach();
        ctx.call_export(&base.release_symbol, &[WireValue::Handle(native)])?;
        Ok(())
    }

    fn stub(&self, stub: Handle) -> Result<Rc<HostedStub>, RuntimeError> {
        self.host
            .get_as::<HostedStub>(stub)
            .ok_or_else(|| RuntimeError::WireMismatch {
                expected: "stub handle".to_string(),
                found: format!("handle {stub}"),
            })
    }
}

impl fmt::Debug for HostedBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostedBridge")
            .field("members", &self.plan.member_count())
            .field("host", &self.host)
            .finish()
    }
}

/// The managed stub constructor without a custom body: store the stub
/// linked to the native handle in `args[0]`.
fn default_stub(host: &ManagedHost, stub_type: &str, args: &[WireValue]) -> Result<WireValue, ManagedThrow> {
    let native = args
        .first()
        .and_then(|a| a.as_handle().ok())
        .ok_or_else(|| ManagedThrow::new("System.ArgumentException", "missing native handle"))?;
    host.store_value(HostedStub::new(native, stub_type))
        .map(WireValue::Handle)
        .map_err(|err| ManagedThrow::new("System.OutOfMemoryException", err.to_string()))
}

/// `default(T)` in wire form.
fn zero_value(plan: &BindingPlan, wire: &WireType) -> WireValue {
    match wire {
        WireType::Void => WireValue::Void,
        WireType::Primitive(kind) => WireValue::zero(*kind),
        WireType::Handle => WireValue::Handle(Handle::NULL),
        WireType::Pointer => WireValue::Pointer(0),
        WireType::Struct(ty) => {
            let fields = plan
                .types
                .iter()
                .find(|t| t.descriptor.type_ref == *ty)
                .map(|t| t.fields.iter().map(|f| zero_value(plan, &f.wire)).collect())
                .unwrap_or_default();
            WireValue::Struct(fields)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbind_core::PrimitiveKind;

    #[test]
    fn zero_values() {
        let plan = BindingPlan::default();
        assert_eq!(zero_value(&plan, &WireType::Void), WireValue::Void);
        assert_eq!(
            zero_value(&plan, &WireType::Primitive(PrimitiveKind::Double)),
            WireValue::F64(0.0)
        );
        assert_eq!(zero_value(&plan, &WireType::Handle), WireValue::Handle(Handle::NULL));
    }

    #[test]
    fn release_callback_removes_from_host() {
        let bridge = HostedBridge::new(BindingPlan::default());
        let ctx = RuntimeContext::default();
        bridge.open(&ctx, 4).unwrap();
        let handle = ctx.string_new("hello").unwrap();
        assert_eq!(handle, Handle(4));
        assert_eq!(bridge.host().string(handle).unwrap().as_str(), "hello");

        ctx.release_object(handle).unwrap();
        assert!(bridge.host().get(handle).is_none());
        assert_eq!(bridge.host().released_count(), 1);
    }

    #[test]
    fn caught_exception_is_stored_until_consumed() {
        let bridge = HostedBridge::new(BindingPlan::default());
        let host = bridge.host();
        let ctx = RuntimeContext::default();
        bridge.open(&ctx, 4).unwrap();
        host.catch(&ctx, "Test", &[], ManagedThrow::new("System.Exception", "boom"));
        let err = ctx.check_exception().unwrap_err();
        assert_eq!(err.message, "boom");
        assert!(host.get_as::<ManagedThrow>(err.handle).is_some());

        let handle = err.handle;
        drop(err);
        assert!(host.get(handle).is_none());
        assert_eq!(host.live_count(), 0);
    }

    #[test]
    fn released_stub_is_detached() {
        let bridge = HostedBridge::new(BindingPlan::default());
        let ctx = RuntimeContext::default();
        bridge.open(&ctx, 4).unwrap();
        let handle = bridge
            .host()
            .store_value(HostedStub::new(Handle(1), "MyGame.BaseBehaviour"))
            .unwrap();
        let stub = bridge.host().get_as::<HostedStub>(handle).unwrap();
        ctx.release_object(handle).unwrap();
        assert!(stub.native().is_null());
    }
}
