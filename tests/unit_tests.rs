//! End-to-end tests of the runtime protocol.
//!
//! Every test generates a plan from a small catalog and runs it through the
//! hosted bridge, calling trampolines the way generated native code does:
//! `RuntimeContext::call` with the member's table index.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crossbind::hosted::{HostedBridge, ManagedThrow};
use crossbind::runtime::{
    ExceptionDirection, PendingException, SubclassSlot, construct_subclass, destroy_subclass,
    release_subclass, subclass_slot,
};
use crossbind::codegen::MemberBinding;
use crossbind::{
    BaseTypeSpec, BindingPlan, BindingSpec, BridgeError, BridgeException, DelegateSpec, Generator,
    Handle, HandleRegistry, MethodSpec, RuntimeContext, RuntimeError, TypeCatalog, TypeShape,
    TypeSpec, WireValue,
};

// =============================================================================
// Fixtures
// =============================================================================

fn catalog() -> TypeCatalog {
    let mut catalog = TypeCatalog::with_system_types();
    catalog
        .register_all(vec![
            TypeShape::class("MyGame.Calc")
                .constructor("()")
                .unwrap()
                .method("int Add(int a, int b)")
                .unwrap()
                .method("void Fail()")
                .unwrap()
                .method("bool TryHalve(int value, out int half)")
                .unwrap()
                .method("static MyGame.Named Label(string text)")
                .unwrap(),
            TypeShape::class("MyGame.CalcException")
                .base("System.Exception")
                .unwrap(),
            TypeShape::value_type("MyGame.Named")
                .field("public string Text")
                .unwrap()
                .field("public int Id")
                .unwrap(),
            TypeShape::class("MyGame.Behaviour")
                .abstract_type()
                .method("abstract void Update(float dt)")
                .unwrap()
                .method("virtual int Score(int bonus)")
                .unwrap(),
            TypeShape::delegate("MyGame.Handler")
                .invoke("int Invoke(int x)")
                .unwrap(),
            TypeShape::generic_class("MyGame.Box", &["T"])
                .constructor("()")
                .unwrap()
                .method("T Get()")
                .unwrap(),
        ])
        .unwrap();
    catalog
}

fn calc_spec() -> BindingSpec {
    BindingSpec::new()
        .with_type(
            TypeSpec::new("MyGame.Calc")
                .constructor(&[])
                .method("Add", &["int", "int"])
                .method_with(MethodSpec::new("Fail", &[]).throws("MyGame.CalcException"))
                .method("TryHalve", &["int", "int"])
                .method("Label", &["string"]),
        )
        .with_type(TypeSpec::new("MyGame.Named").read_only_field("Id"))
}

fn plan(spec: &BindingSpec) -> BindingPlan {
    Generator::new(&catalog()).plan(spec).unwrap()
}

fn member<'p>(plan: &'p BindingPlan, owner: &str, name: &str) -> &'p MemberBinding {
    plan.members()
        .find(|m| m.descriptor.owner.full_name() == owner && m.descriptor.name == name)
        .unwrap_or_else(|| panic!("no member {owner}.{name}"))
}

fn index(plan: &BindingPlan, owner: &str, name: &str) -> usize {
    member(plan, owner, name).index
}

fn symbol(plan: &BindingPlan, owner: &str, name: &str) -> String {
    member(plan, owner, name).symbol.clone()
}

/// Managed `Calc`: an accumulator so tests can tell instances apart.
struct Calc {
    bias: i32,
}

/// A bridge over `calc_spec` with managed bodies for every Calc member.
fn calc_bridge() -> (HostedBridge, RuntimeContext) {
    let plan = plan(&calc_spec());
    let ctor = symbol(&plan, "MyGame.Calc", "");
    let add = symbol(&plan, "MyGame.Calc", "Add");
    let fail = symbol(&plan, "MyGame.Calc", "Fail");
    let try_halve = symbol(&plan, "MyGame.Calc", "TryHalve");

    let bridge = HostedBridge::new(plan);
    bridge.implement(ctor, |host, _, _| {
        host.store_value(Calc { bias: 0 })
            .map(WireValue::Handle)
            .map_err(|e| ManagedThrow::new("System.OutOfMemoryException", e.to_string()))
    });
    bridge.implement(add, |host, _, args| match args {
        [WireValue::Handle(this), WireValue::I32(a), WireValue::I32(b)] => {
            let calc = host
                .get_as::<Calc>(*this)
                .ok_or_else(|| ManagedThrow::new("System.NullReferenceException", "no Calc"))?;
            Ok(WireValue::I32(a + b + calc.bias))
        }
        _ => Err(ManagedThrow::new("System.ArgumentException", "bad arguments")),
    });
    bridge.implement(fail, |_, _, _| {
        Err(ManagedThrow::new("MyGame.CalcException", "calculator on fire"))
    });
    bridge.implement(try_halve, |_, _, args| match args {
        [_, WireValue::I32(value), half] => {
            half.write_ref(WireValue::I32(value / 2))
                .map_err(|e| ManagedThrow::new("System.ArgumentException", e.to_string()))?;
            Ok(WireValue::Bool(value % 2 == 0))
        }
        _ => Err(ManagedThrow::new("System.ArgumentException", "bad arguments")),
    });

    let ctx = RuntimeContext::default();
    bridge.open(&ctx, 16).unwrap();
    (bridge, ctx)
}

// =============================================================================
// Handle registry
// =============================================================================

#[test]
fn store_null_returns_null_handle() {
    let registry = HandleRegistry::<String>::new();
    registry.init(1);
    assert_eq!(registry.store(None).unwrap(), Handle::NULL);
    assert!(registry.get(Handle::NULL).is_none());

    registry.store(Some("x".to_string())).unwrap();
    assert!(registry.get(Handle::NULL).is_none());
}

#[test]
fn stored_objects_come_back() {
    let registry = HandleRegistry::new();
    registry.init(8);
    for word in ["alpha", "beta", "gamma"] {
        let handle = registry.store(Some(word)).unwrap();
        assert!(!handle.is_null());
        assert_eq!(registry.get(handle), Some(word));
    }
}

#[test]
fn handles_are_recycled_lifo() {
    let registry = HandleRegistry::new();
    registry.init(3);
    let handles: Vec<Handle> = (0..3).map(|i| registry.store(Some(i)).unwrap()).collect();
    assert_eq!(handles, vec![Handle(3), Handle(2), Handle(1)]);

    registry.remove(Handle(2));
    assert_eq!(registry.get(Handle(2)), None);
    assert_eq!(registry.store(Some(9)).unwrap(), Handle(2));
}

#[test]
fn exhausted_store_is_an_error() {
    let registry = HandleRegistry::new();
    assert!(matches!(
        registry.store(Some(1)),
        Err(RuntimeError::NotInitialized { .. })
    ));
    registry.init(1);
    registry.store(Some(1)).unwrap();
    assert!(matches!(
        registry.store(Some(2)),
        Err(RuntimeError::StoreExhausted { capacity: 1 })
    ));
}

#[test]
#[should_panic(expected = "out of range")]
fn out_of_range_handle_panics() {
    let registry = HandleRegistry::<i32>::new();
    registry.init(2);
    registry.get(Handle(3));
}

// =============================================================================
// Trampolines
// =============================================================================

#[test]
fn add_round_trips() {
    let (bridge, ctx) = calc_bridge();
    let plan = bridge.plan();
    let calc = ctx
        .call(index(plan, "MyGame.Calc", ""), &[])
        .unwrap()
        .as_handle()
        .unwrap();
    assert_eq!(calc, Handle(16));

    let sum = ctx
        .call(
            index(plan, "MyGame.Calc", "Add"),
            &[WireValue::Handle(calc), WireValue::I32(2), WireValue::I32(3)],
        )
        .unwrap();
    assert_eq!(sum, WireValue::I32(5));
    assert_eq!(i32::try_from(sum).unwrap(), 2 + 3);
}

#[test]
fn out_parameter_is_written_back() {
    let (bridge, ctx) = calc_bridge();
    let calc = ctx
        .call(index(bridge.plan(), "MyGame.Calc", ""), &[])
        .unwrap();
    let half = WireValue::new_ref(WireValue::I32(0));
    let even = ctx
        .call(
            index(bridge.plan(), "MyGame.Calc", "TryHalve"),
            &[calc, WireValue::I32(10), half.clone()],
        )
        .unwrap();
    assert_eq!(even, WireValue::Bool(true));
    assert_eq!(half.read_ref().unwrap(), WireValue::I32(5));
}

#[test]
fn declared_exception_reaches_call_site() {
    let (bridge, ctx) = calc_bridge();
    let err = ctx
        .call(index(bridge.plan(), "MyGame.Calc", "Fail"), &[WireValue::Handle(Handle(1))])
        .unwrap_err();
    let BridgeError::Exception(exception) = err else {
        panic!("expected a relayed exception, got {err:?}");
    };
    assert_eq!(exception.type_name, "MyGame.CalcException");
    assert_eq!(exception.message, "calculator on fire");

    // the handle refers to the original managed exception object
    let original = bridge.host().get_as::<ManagedThrow>(exception.handle).unwrap();
    assert_eq!(original.message, exception.message);

    // the slot was consumed by the check
    assert!(ctx.check_exception().is_ok());
    assert!(ctx
        .diagnostics()
        .iter()
        .any(|d| d.message.contains("catch (MyGame.CalcException)")));
}

#[test]
fn undeclared_exception_hits_catch_all() {
    let (bridge, ctx) = calc_bridge();
    let err = ctx
        .call(
            index(bridge.plan(), "MyGame.Calc", "Add"),
            &[WireValue::Handle(Handle::NULL), WireValue::I32(1), WireValue::I32(1)],
        )
        .unwrap_err();
    assert_eq!(err.exception().unwrap().type_name, "System.NullReferenceException");
    assert!(ctx
        .diagnostics()
        .iter()
        .any(|d| d.message.contains("catch (System.Exception)")));
}

#[test]
fn member_without_body_throws_missing_method() {
    let (bridge, ctx) = calc_bridge();
    let err = ctx
        .call(index(bridge.plan(), "MyGame.Calc", "Label"), &[WireValue::Handle(Handle::NULL)])
        .unwrap_err();
    assert_eq!(err.exception().unwrap().type_name, "System.MissingMethodException");
}

#[test]
fn relayed_exceptions_do_not_exhaust_the_store() {
    let plan = plan(&calc_spec());
    let fail = symbol(&plan, "MyGame.Calc", "Fail");
    let bridge = HostedBridge::new(plan);
    bridge.implement(fail, |_, _, _| {
        Err(ManagedThrow::new("MyGame.CalcException", "calculator on fire"))
    });
    let ctx = RuntimeContext::default();
    bridge.open(&ctx, 3).unwrap();

    let index = index(bridge.plan(), "MyGame.Calc", "Fail");
    for _ in 0..3 {
        let err = ctx.call(index, &[WireValue::Handle(Handle::NULL)]).unwrap_err();
        assert!(err.exception().unwrap().owns_object());
    }
    assert_eq!(bridge.host().live_count(), 0);
    assert!(!ctx.string_new("still room").unwrap().is_null());
}

#[test]
fn second_pending_exception_overwrites_first() {
    let ctx = RuntimeContext::default();
    ctx.raise_managed_exception(PendingException::new(Handle(1), "System.Exception", "first"));
    ctx.raise_managed_exception(PendingException::new(Handle(2), "System.Exception", "second"));
    assert_eq!(
        ctx.pending_exception(ExceptionDirection::NativeCaughtManaged)
            .unwrap()
            .message,
        "second"
    );
    assert!(ctx.diagnostics().has_warnings());
    assert_eq!(ctx.check_exception().unwrap_err().handle, Handle(2));
    assert!(ctx.check_exception().is_ok());
}

// =============================================================================
// Reference counting
// =============================================================================

#[test]
fn managed_value_type_released_exactly_once() {
    let (bridge, ctx) = calc_bridge();
    let host = bridge.host();
    let named = host.store_value("player".to_string()).unwrap();
    let live = host.live_count();

    ctx.reference("MyGame.Named", named).unwrap();
    ctx.reference("MyGame.Named", named).unwrap();
    assert!(!ctx.dereference("MyGame.Named", named).unwrap());
    assert_eq!(host.released_count(), 0);
    assert!(host.get(named).is_some());

    assert!(ctx.dereference("MyGame.Named", named).unwrap());
    assert_eq!(host.released_count(), 1);
    assert_eq!(host.live_count(), live - 1);
    assert!(host.get(named).is_none());
}

#[test]
fn null_handle_reference_is_ignored() {
    let (_bridge, ctx) = calc_bridge();
    ctx.reference("MyGame.Named", Handle::NULL).unwrap();
    assert_eq!(ctx.ref_count("MyGame.Named", Handle::NULL).unwrap(), 0);
}

// =============================================================================
// Strings, handshake, shutdown
// =============================================================================

#[test]
fn strings_cross_by_handle() {
    let (bridge, ctx) = calc_bridge();
    let handle = ctx.string_new("héllo").unwrap();
    assert_eq!(bridge.host().string(handle).unwrap().as_str(), "héllo");
    ctx.release_object(handle).unwrap();
    assert!(bridge.host().string(handle).is_none());
}

#[test]
fn handshake_must_match_bindings() {
    let bridge = HostedBridge::new(plan(&calc_spec()));
    let ctx = RuntimeContext::default();
    let err = ctx
        .init(bridge.handshake(8), &["MyGameCalcConstructor"])
        .unwrap_err();
    assert!(matches!(err, RuntimeError::HandshakeMismatch { .. }));
    assert!(!ctx.is_initialized());
}

#[test]
fn shutdown_rejects_later_calls() {
    let (_bridge, ctx) = calc_bridge();
    ctx.shutdown();
    assert!(matches!(
        ctx.call(0, &[]),
        Err(BridgeError::Runtime(RuntimeError::NotInitialized { .. }))
    ));
}

// =============================================================================
// Generics
// =============================================================================

#[test]
fn generic_instantiation_is_deterministic() {
    let spec = BindingSpec::new().with_type(
        TypeSpec::new("MyGame.Box")
            .instantiate(&["int"])
            .instantiate(&["string"])
            .instantiate(&["int"])
            .constructor(&[])
            .method("Get", &[]),
    );
    let catalog = catalog();
    let first = Generator::new(&catalog).generate(&spec).unwrap();
    let second = Generator::new(&catalog).generate(&spec).unwrap();

    assert_eq!(first.plan.handshake_symbols(), second.plan.handshake_symbols());
    assert_eq!(first.native.source, second.native.source);
    assert_eq!(first.managed.source, second.managed.source);

    // the repeated tuple is bound once
    assert_eq!(first.plan.types.len(), 2);
    assert!(first.diagnostics.has_warnings());
}

// =============================================================================
// Base types
// =============================================================================

trait Behaviour {
    fn update(&self, _dt: f32) -> Result<(), BridgeException> {
        Ok(())
    }

    fn score(&self, _bonus: i32) -> Result<i32, BridgeException> {
        Ok(0)
    }
}

#[derive(Default)]
struct Player {
    elapsed: Cell<f32>,
}

impl Behaviour for Player {
    fn update(&self, dt: f32) -> Result<(), BridgeException> {
        self.elapsed.set(self.elapsed.get() + dt);
        if dt < 0.0 {
            return Err(BridgeException::native("System.ArgumentOutOfRangeException", "negative dt"));
        }
        Ok(())
    }
}

const STUB: &str = "MyGame.BaseBehaviour";

/// What the generated native module registers for `MyGame.Behaviour`.
fn register_behaviour_exports(ctx: &RuntimeContext, plan: &BindingPlan) {
    let base = plan.find_base_type("MyGame.Behaviour").unwrap();
    for invoke in &base.overrides {
        let name = invoke.descriptor.name.clone();
        ctx.register_export(
            invoke.symbol.clone(),
            Rc::new(move |ctx: &RuntimeContext, args: &[WireValue]| -> Result<WireValue, BridgeException> {
                let native = args[0].as_handle()?;
                let slot = subclass_slot::<dyn Behaviour>(ctx, STUB, native)?;
                match name.as_str() {
                    "Update" => {
                        slot.overrides().update(f32::try_from(args[1].clone())?)?;
                        Ok(WireValue::Void)
                    }
                    _ => Ok(WireValue::I32(slot.overrides().score(i32::try_from(args[1].clone())?)?)),
                }
            }),
        );
    }
    ctx.register_export(
        base.release_symbol.clone(),
        Rc::new(|ctx: &RuntimeContext, args: &[WireValue]| -> Result<WireValue, BridgeException> {
            release_subclass::<dyn Behaviour>(ctx, STUB, args[0].as_handle()?)?;
            Ok(WireValue::Void)
        }),
    );
}

fn behaviour_bridge() -> (HostedBridge, RuntimeContext) {
    let spec = BindingSpec::new().with_base_type(
        BaseTypeSpec::new("MyGame.Behaviour")
            .capacity(4)
            .override_method("Update", &["float"])
            .override_method("Score", &["int"]),
    );
    let bridge = HostedBridge::new(plan(&spec));
    let ctx = RuntimeContext::default();
    bridge.open(&ctx, 8).unwrap();
    register_behaviour_exports(&ctx, bridge.plan());
    (bridge, ctx)
}

fn construct_player(
    bridge: &HostedBridge,
    ctx: &RuntimeContext,
    player: Player,
) -> Rc<SubclassSlot<dyn Behaviour>> {
    let ctor = bridge.plan().base_types[0].constructors[0].index;
    construct_subclass::<dyn Behaviour>(ctx, STUB, Box::new(player), |native| {
        ctx.call(ctor, &[WireValue::Handle(native)])
    })
    .unwrap()
}

#[test]
fn managed_call_reaches_native_override() {
    let (bridge, ctx) = behaviour_bridge();
    let player = construct_player(&bridge, &ctx, Player::default());
    let (native, managed) = (player.native(), player.managed());
    assert_eq!(native, Handle(1));
    assert_eq!(ctx.ref_count(STUB, managed).unwrap(), 1);

    let update = bridge.plan().base_types[0].overrides[0].symbol.clone();
    bridge
        .call_override(&ctx, managed, &update, &[WireValue::F32(0.25)])
        .unwrap();
    bridge
        .call_override(&ctx, managed, &update, &[WireValue::F32(0.5)])
        .unwrap();
    let slot = subclass_slot::<dyn Behaviour>(&ctx, STUB, native).unwrap();
    assert_eq!(slot.managed(), managed);

    // members the subclass leaves alone keep the zero default
    let score = bridge.plan().base_types[0].overrides[1].symbol.clone();
    let result = bridge
        .call_override(&ctx, managed, &score, &[WireValue::I32(7)])
        .unwrap();
    assert_eq!(result, WireValue::I32(0));
}

#[test]
fn native_exception_reaches_managed_caller() {
    let (bridge, ctx) = behaviour_bridge();
    let managed = construct_player(&bridge, &ctx, Player::default()).managed();
    let update = bridge.plan().base_types[0].overrides[0].symbol.clone();
    let err = bridge
        .call_override(&ctx, managed, &update, &[WireValue::F32(-1.0)])
        .unwrap_err();
    assert_eq!(err.exception().unwrap().message, "negative dt");
    assert!(ctx.check_native_exception().is_ok());
}

#[test]
fn dispose_runs_destruction_in_order() {
    let (bridge, ctx) = behaviour_bridge();
    let player = construct_player(&bridge, &ctx, Player::default());
    let (native, managed) = (player.native(), player.managed());
    bridge.dispose_stub(&ctx, managed).unwrap();

    // managed stub released through the reference count, native slot freed
    assert_eq!(bridge.host().released_count(), 1);
    assert!(bridge.host().get(managed).is_none());
    assert!(ctx.object(STUB, native).unwrap().is_none());
    assert!(player.managed().is_null());

    // native drop after managed dispose is a no-op
    destroy_subclass(&ctx, STUB, &player).unwrap();
    assert_eq!(bridge.host().released_count(), 1);

    // the freed slot is reused
    let again = construct_player(&bridge, &ctx, Player::default());
    assert_eq!(again.native(), native);
}

#[test]
fn stale_owner_cannot_destroy_reused_slot() {
    let (bridge, ctx) = behaviour_bridge();
    let first = construct_player(&bridge, &ctx, Player::default());
    let first_managed = first.managed();
    bridge.dispose_stub(&ctx, first_managed).unwrap();
    let second = construct_player(&bridge, &ctx, Player::default());
    // both handles come back from the free lists
    assert_eq!(second.native(), first.native());
    assert_eq!(second.managed(), first_managed);
    let released = bridge.host().released_count();

    // the first owner drops late; the second instance stays intact
    destroy_subclass(&ctx, STUB, &first).unwrap();
    assert_eq!(bridge.host().released_count(), released);
    assert!(bridge.host().get(second.managed()).is_some());
    let current = subclass_slot::<dyn Behaviour>(&ctx, STUB, second.native()).unwrap();
    assert!(Rc::ptr_eq(&current, &second));

    let update = bridge.plan().base_types[0].overrides[0].symbol.clone();
    bridge
        .call_override(&ctx, second.managed(), &update, &[WireValue::F32(1.0)])
        .unwrap();
}

#[test]
fn disposing_twice_releases_once() {
    let (bridge, ctx) = behaviour_bridge();
    let player = construct_player(&bridge, &ctx, Player::default());
    let managed = player.managed();
    let stub = bridge.host().get_as::<crossbind::hosted::HostedStub>(managed).unwrap();
    bridge.dispose_stub(&ctx, managed).unwrap();
    assert!(stub.native().is_null());
    assert_eq!(bridge.host().released_count(), 1);
}

#[test]
fn calling_disposed_stub_fails() {
    let (bridge, ctx) = behaviour_bridge();
    let player = construct_player(&bridge, &ctx, Player::default());
    let managed = player.managed();
    destroy_subclass(&ctx, STUB, &player).unwrap();
    let update = bridge.plan().base_types[0].overrides[0].symbol.clone();
    assert!(bridge
        .call_override(&ctx, managed, &update, &[WireValue::F32(1.0)])
        .is_err());
}

// =============================================================================
// Delegates
// =============================================================================

type HandlerTarget = dyn Fn(&RuntimeContext, i32) -> Result<i32, BridgeException>;

#[test]
fn native_function_as_delegate_target() {
    let spec = BindingSpec::new().with_delegate(DelegateSpec::new("MyGame.Handler").capacity(2));
    let bridge = HostedBridge::new(plan(&spec));
    let ctx = RuntimeContext::default();
    bridge.open(&ctx, 4).unwrap();

    let symbol = bridge.plan().types[0].native_invoke.as_ref().unwrap().symbol.clone();
    assert_eq!(symbol, "MyGameHandlerNativeInvoke");
    ctx.register_export(
        symbol.clone(),
        Rc::new(|ctx: &RuntimeContext, args: &[WireValue]| -> Result<WireValue, BridgeException> {
            let target = ctx
                .object("MyGame.Handler", args[0].as_handle()?)?
                .ok_or_else(|| BridgeException::native("System.ObjectDisposedException", "released"))?
                .downcast::<Box<HandlerTarget>>()
                .map_err(|_| BridgeException::native("System.InvalidCastException", "not a target"))?;
            Ok(WireValue::I32((**target)(ctx, i32::try_from(args[1].clone())?)?))
        }),
    );

    let calls = Rc::new(RefCell::new(Vec::new()));
    let seen = calls.clone();
    let target: Box<HandlerTarget> = Box::new(move |_, x| {
        seen.borrow_mut().push(x);
        Ok(x * 10)
    });
    let handle = ctx.allocate_object("MyGame.Handler", Rc::new(target)).unwrap();

    let result = ctx
        .call_export(&symbol, &[WireValue::Handle(handle), WireValue::I32(4)])
        .unwrap();
    assert_eq!(result, WireValue::I32(40));
    assert_eq!(*calls.borrow(), vec![4]);
}
