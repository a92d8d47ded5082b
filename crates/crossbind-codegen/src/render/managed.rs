//! Managed (C#) target.
//!
//! Emits one file holding:
//!
//! - `ObjectStore`: the handle registry (slot 0 null, LIFO free stack, one lock)
//! - `Bindings`: every trampoline, its delegate type, the native imports and `Open`
//! - one stub class per base type, forwarding overrides to native exports

use crossbind_core::naming::{
    INIT_SYMBOL, SET_MANAGED_EXCEPTION_SYMBOL, TAKE_NATIVE_EXCEPTION_SYMBOL,
};
use crossbind_core::{
    MemberKind, OperatorArity, Operator, ParamFlags, TypeDescriptor, TypeKind, TypeRef,
};

use super::{CodeWriter, RenderOptions, Renderer};
use crate::ir::{BaseTypeBinding, BindingPlan, MemberBinding, NativeInvokeBinding, WireParam, WireType};

/// Renders the managed half of the bindings.
#[derive(Debug, Clone, Default)]
pub struct ManagedRenderer {
    options: RenderOptions,
}

impl ManagedRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }
}

impl Renderer for ManagedRenderer {
    fn file_name(&self) -> String {
        "Bindings.cs".to_string()
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn render(&self, plan: &BindingPlan) -> String {
        let mut w = CodeWriter::new();
        w.line("// Generated by crossbind. Do not edit.");
        w.line("using System;");
        w.line("using System.Runtime.InteropServices;");
        w.blank();
        w.braced(format!("namespace {}", self.options.managed_namespace), |w| {
            render_object_store(w);
            w.blank();
            render_native_exception(w);
            w.blank();
            w.braced("public static class Bindings", |w| {
                self.render_bindings(w, plan);
            });
            for base in &plan.base_types {
                w.blank();
                render_stub(w, base);
            }
        });
        w.finish()
    }
}

// =============================================================================
// Type spelling
// =============================================================================

/// Typed managed spelling.
fn cs_type(ty: &TypeDescriptor) -> String {
    match ty.kind {
        TypeKind::None => "void".to_string(),
        TypeKind::Pointer => "System.IntPtr".to_string(),
        TypeKind::Primitive => ty
            .primitive
            .map_or_else(|| ty.full_name(), |p| p.keyword().to_string()),
        _ => ty.full_name(),
    }
}

/// Wire spelling: what a trampoline signature carries.
fn cs_wire(wire: &WireType, ty: &TypeDescriptor) -> String {
    match wire {
        WireType::Void => "void".to_string(),
        WireType::Primitive(kind) if ty.kind == TypeKind::Primitive => kind.keyword().to_string(),
        WireType::Primitive(_) | WireType::Struct(_) => cs_type(ty),
        WireType::Handle => "uint".to_string(),
        WireType::Pointer => "System.IntPtr".to_string(),
    }
}

/// Wire value named `name` as a typed value.
fn from_wire(name: &str, ty: &TypeDescriptor) -> String {
    if ty.kind.is_handle() {
        format!("({})ObjectStore.Get({name})", cs_type(ty))
    } else {
        name.to_string()
    }
}

/// Typed value `expr` in wire form.
fn to_wire(expr: &str, ty: &TypeDescriptor) -> String {
    if ty.kind.is_handle() {
        format!("ObjectStore.Store({expr})")
    } else {
        expr.to_string()
    }
}

fn ref_keyword(flags: ParamFlags) -> &'static str {
    if flags.contains(ParamFlags::OUT) {
        "out "
    } else if flags.contains(ParamFlags::REF) {
        "ref "
    } else {
        ""
    }
}

fn wire_param(param: &WireParam) -> String {
    format!(
        "{}{} {}",
        ref_keyword(param.descriptor.flags),
        cs_wire(&param.wire, &param.descriptor.ty),
        param.name()
    )
}

// =============================================================================
// Fixed parts
// =============================================================================

/// Native exports use the C calling convention and UTF-16 `char`.
const IMPORT: &str =
    "[DllImport(PluginName, CallingConvention = CallingConvention.Cdecl, CharSet = CharSet.Unicode)]";

fn render_object_store(w: &mut CodeWriter) {
    w.braced("public static class ObjectStore", |w| {
        w.line("static object[] objects;");
        w.line("static uint[] handles;");
        w.line("static int nextHandleIndex;");
        w.line("static readonly object storeLock = new object();");
        w.blank();
        w.braced("public static void Init(int maxObjects)", |w| {
            w.braced("lock (storeLock)", |w| {
                w.line("objects = new object[maxObjects + 1];");
                w.line("handles = new uint[maxObjects];");
                w.line("for (int i = 0; i < maxObjects; i++) handles[i] = (uint)(i + 1);");
                w.line("nextHandleIndex = maxObjects - 1;");
            });
        });
        w.blank();
        w.braced("public static uint Store(object obj)", |w| {
            w.line("if (obj == null) return 0;");
            w.braced("lock (storeLock)", |w| {
                w.line("if (handles == null) throw new InvalidOperationException(\"ObjectStore used before Init\");");
                w.line("if (nextHandleIndex < 0) throw new InvalidOperationException(\"ObjectStore exhausted\");");
                w.line("uint handle = handles[nextHandleIndex--];");
                w.line("objects[handle] = obj;");
                w.line("return handle;");
            });
        });
        w.blank();
        w.braced("public static object Get(uint handle)", |w| {
            w.braced("lock (storeLock)", |w| w.line("return objects[handle];"));
        });
        w.blank();
        w.braced("public static object Remove(uint handle)", |w| {
            w.line("if (handle == 0) return null;");
            w.braced("lock (storeLock)", |w| {
                w.line("object obj = objects[handle];");
                w.line("if (obj == null) return null;");
                w.line("objects[handle] = null;");
                w.line("handles[++nextHandleIndex] = handle;");
                w.line("return obj;");
            });
        });
    });
}

fn render_native_exception(w: &mut CodeWriter) {
    w.braced("public class NativeException : Exception", |w| {
        w.line("public NativeException(string message) : base(message) {}");
    });
    w.blank();
    w.line("// A stub whose handle was released forgets its native instance.");
    w.braced("public interface INativeStub", |w| w.line("void Detach();"));
}

// =============================================================================
// Bindings class
// =============================================================================

impl ManagedRenderer {
    fn render_bindings(&self, w: &mut CodeWriter, plan: &BindingPlan) {
        w.fmt_line(format_args!(
            "const string PluginName = \"{}\";",
            self.options.library_name
        ));
        w.fmt_line(format_args!(
            "public const int MaxManagedObjects = {};",
            plan.store_capacity()
        ));
        w.blank();

        self.render_imports(w, plan);
        w.blank();
        render_open(w, plan);
        w.blank();

        w.line("[UnmanagedFunctionPointer(CallingConvention.Cdecl)]");
        w.line("delegate void ReleaseObjectDelegateType(uint handle);");
        w.line("static readonly ReleaseObjectDelegateType ReleaseObjectDelegate = new ReleaseObjectDelegateType(ReleaseObject);");
        w.line("static void ReleaseObject(uint handle) { (ObjectStore.Remove(handle) as INativeStub)?.Detach(); }");
        w.blank();
        w.line("[UnmanagedFunctionPointer(CallingConvention.Cdecl)]");
        w.line("delegate uint StringNewDelegateType(IntPtr utf8);");
        w.line("static readonly StringNewDelegateType StringNewDelegate = new StringNewDelegateType(StringNew);");
        w.line("static uint StringNew(IntPtr utf8) { return ObjectStore.Store(Marshal.PtrToStringUTF8(utf8)); }");
        w.blank();
        w.braced("public static void CheckNativeException()", |w| {
            w.fmt_line(format_args!("uint handle = {TAKE_NATIVE_EXCEPTION_SYMBOL}();"));
            w.line("if (handle != 0) throw new NativeException((string)ObjectStore.Remove(handle));");
        });

        for ty in &plan.types {
            for member in &ty.members {
                w.blank();
                self.render_trampoline(w, member, None);
            }
        }
        for base in &plan.base_types {
            for ctor in &base.constructors {
                w.blank();
                self.render_trampoline(w, ctor, Some(base));
            }
        }
    }

    fn render_imports(&self, w: &mut CodeWriter, plan: &BindingPlan) {
        let mut init_params = vec![
            "int capacity".to_string(),
            "IntPtr releaseObject".to_string(),
            "IntPtr stringNew".to_string(),
        ];
        init_params.extend(plan.members().map(|m| format!("IntPtr {}", m.symbol)));
        w.line(IMPORT);
        w.fmt_line(format_args!(
            "static extern void {INIT_SYMBOL}({});",
            init_params.join(", ")
        ));
        w.line(IMPORT);
        w.fmt_line(format_args!(
            "static extern void {SET_MANAGED_EXCEPTION_SYMBOL}(uint handle, [MarshalAs(UnmanagedType.LPUTF8Str)] string typeName, [MarshalAs(UnmanagedType.LPUTF8Str)] string message);"
        ));
        w.line(IMPORT);
        w.fmt_line(format_args!(
            "static extern uint {TAKE_NATIVE_EXCEPTION_SYMBOL}();"
        ));
        for invoke in plan.native_invokes() {
            w.line(IMPORT);
            w.fmt_line(format_args!("public static extern {};", import_signature(invoke)));
        }
        for base in &plan.base_types {
            w.line(IMPORT);
            w.fmt_line(format_args!(
                "public static extern void {}(uint nativeHandle);",
                base.release_symbol
            ));
        }
    }

    fn render_trampoline(
        &self,
        w: &mut CodeWriter,
        member: &MemberBinding,
        stub: Option<&BaseTypeBinding>,
    ) {
        let symbol = &member.symbol;
        let descriptor = &member.descriptor;
        let ret_ty = if descriptor.kind.is_constructor() {
            stub.map_or(&descriptor.owner, |s| &s.stub)
        } else {
            &descriptor.return_type
        };
        let ret_wire = if descriptor.kind.is_constructor() {
            WireType::of(ret_ty)
        } else {
            member.ret.clone()
        };
        let ret = cs_wire(&ret_wire, ret_ty);

        let mut params = Vec::new();
        if stub.is_some() {
            params.push("uint nativeHandle".to_string());
        }
        if let Some(this) = &member.this {
            params.push(format!("{} thisHandle", cs_wire(this, &descriptor.owner)));
        }
        params.extend(member.params.iter().map(wire_param));
        let params = params.join(", ");

        if self.options.emit_comments {
            w.fmt_line(format_args!("// {}", descriptor.signature()));
        }
        w.line("[UnmanagedFunctionPointer(CallingConvention.Cdecl, CharSet = CharSet.Unicode)]");
        w.fmt_line(format_args!("delegate {ret} {symbol}DelegateType({params});"));
        w.fmt_line(format_args!(
            "static readonly {symbol}DelegateType {symbol}Delegate = new {symbol}DelegateType({symbol});"
        ));
        w.braced(format!("static {ret} {symbol}({params})"), |w| {
            w.braced("try", |w| {
                render_body(w, member, stub, ret_ty);
            });
            let mut catches: Vec<String> = descriptor
                .exceptions
                .iter()
                .map(|e| e.to_string())
                .filter(|e| e != "System.Exception")
                .collect();
            catches.push("System.Exception".to_string());
            for exception in catches {
                w.braced(format!("catch ({exception} ex)"), |w| {
                    w.line("Console.Error.WriteLine(ex);");
                    w.fmt_line(format_args!(
                        "{SET_MANAGED_EXCEPTION_SYMBOL}(ObjectStore.Store(ex), ex.GetType().FullName, ex.Message);"
                    ));
                    if ret != "void" {
                        w.fmt_line(format_args!("return default({ret});"));
                    }
                });
            }
        });
    }
}

fn render_open(w: &mut CodeWriter, plan: &BindingPlan) {
    w.braced("public static void Open()", |w| w.line("Open(MaxManagedObjects);"));
    w.blank();
    w.braced("public static void Open(int capacity)", |w| {
        w.line("ObjectStore.Init(capacity);");
        let mut args = vec![
            "capacity".to_string(),
            "Marshal.GetFunctionPointerForDelegate(ReleaseObjectDelegate)".to_string(),
            "Marshal.GetFunctionPointerForDelegate(StringNewDelegate)".to_string(),
        ];
        args.extend(
            plan.members()
                .map(|m| format!("Marshal.GetFunctionPointerForDelegate({}Delegate)", m.symbol)),
        );
        w.fmt_line(format_args!("{INIT_SYMBOL}("));
        w.indent(|w| {
            let last = args.len() - 1;
            for (i, arg) in args.iter().enumerate() {
                w.line(if i == last { format!("{arg});") } else { format!("{arg},") });
            }
        });
    });
}

fn import_signature(invoke: &NativeInvokeBinding) -> String {
    let mut params = vec!["uint nativeHandle".to_string()];
    params.extend(invoke.params.iter().map(wire_param));
    format!(
        "{} {}({})",
        cs_wire(&invoke.ret, &invoke.descriptor.return_type),
        invoke.symbol,
        params.join(", ")
    )
}

// =============================================================================
// Trampoline bodies
// =============================================================================

enum Call {
    /// An expression producing the result.
    Value(String),
    /// A statement; the member returns nothing.
    Statement(String),
}

fn render_body(
    w: &mut CodeWriter,
    member: &MemberBinding,
    stub: Option<&BaseTypeBinding>,
    ret_ty: &TypeDescriptor,
) {
    let descriptor = &member.descriptor;
    if member.this.is_some() {
        w.fmt_line(format_args!(
            "var thiz = {};",
            from_wire("thisHandle", &descriptor.owner)
        ));
    }

    // by-ref handles round-trip through a typed local
    let mut post = Vec::new();
    let args: Vec<String> = member
        .params
        .iter()
        .map(|p| {
            let name = p.name();
            let ty = &p.descriptor.ty;
            let keyword = ref_keyword(p.descriptor.flags);
            if p.by_ref && ty.kind.is_handle() {
                w.fmt_line(format_args!("var {name}Local = {};", from_wire(name, ty)));
                post.push(format!("{name} = ObjectStore.Store({name}Local);"));
                format!("{keyword}{name}Local")
            } else if p.by_ref {
                format!("{keyword}{name}")
            } else {
                from_wire(name, ty)
            }
        })
        .collect();

    let call = call_expression(w, member, stub, &args);
    match call {
        Call::Value(expr) => {
            w.fmt_line(format_args!("var result = {expr};"));
            for line in &post {
                w.line(line);
            }
            w.fmt_line(format_args!("return {};", to_wire("result", ret_ty)));
        }
        Call::Statement(stmt) => {
            w.fmt_line(format_args!("{stmt};"));
            for line in &post {
                w.line(line);
            }
        }
    }
}

fn call_expression(
    w: &mut CodeWriter,
    member: &MemberBinding,
    stub: Option<&BaseTypeBinding>,
    args: &[String],
) -> Call {
    let descriptor = &member.descriptor;
    let owner = cs_type(&descriptor.owner);
    let target = if member.this.is_some() { "thiz".to_string() } else { owner.clone() };
    let arg = |i: usize| args.get(i).cloned().unwrap_or_default();
    let all = args.join(", ");
    let name = &descriptor.name;
    let value = |expr: String| {
        if descriptor.return_type.is_void() && !descriptor.kind.is_constructor() {
            Call::Statement(expr)
        } else {
            Call::Value(expr)
        }
    };

    match descriptor.kind {
        MemberKind::Constructor => match stub {
            Some(base) => {
                let mut stub_args = vec!["nativeHandle".to_string()];
                stub_args.extend(args.iter().cloned());
                Call::Value(format!("new {}({})", base.stub.full_name(), stub_args.join(", ")))
            }
            None => Call::Value(format!("new {owner}({all})")),
        },
        MemberKind::Method => {
            let generics = if descriptor.generic_args.is_empty() {
                String::new()
            } else {
                let names: Vec<String> =
                    descriptor.generic_args.iter().map(TypeRef::to_string).collect();
                format!("<{}>", names.join(", "))
            };
            value(format!("{target}.{name}{generics}({all})"))
        }
        MemberKind::PropertyGet | MemberKind::FieldGet => Call::Value(format!("{target}.{name}")),
        MemberKind::PropertySet | MemberKind::FieldSet => {
            Call::Statement(format!("{target}.{name} = {}", arg(0)))
        }
        MemberKind::EventAdd => Call::Statement(format!("{target}.{name} += {}", arg(0))),
        MemberKind::EventRemove => Call::Statement(format!("{target}.{name} -= {}", arg(0))),
        MemberKind::Operator(op) => Call::Value(operator_expression(w, op, descriptor, args)),
        MemberKind::Box => Call::Value(format!("(object){}", arg(0))),
        MemberKind::Unbox => Call::Value(format!("({owner}){}", arg(0))),
        MemberKind::ArrayConstructor => {
            let element = match &descriptor.owner.type_ref {
                TypeRef::Array { element, .. } => element.to_string(),
                other => other.to_string(),
            };
            Call::Value(format!("new {element}[{all}]"))
        }
        MemberKind::ArrayLength => Call::Value(format!("{target}.Length")),
        MemberKind::ArrayGetLength => Call::Value(format!("{target}.GetLength({})", arg(0))),
        MemberKind::ArrayGetItem => Call::Value(format!("{target}[{all}]")),
        MemberKind::ArraySetItem => {
            let (value_arg, indices) = args.split_last().map_or((String::new(), &[][..]), |(v, i)| (v.clone(), i));
            Call::Statement(format!("{target}[{}] = {value_arg}", indices.join(", ")))
        }
        MemberKind::DelegateInvoke => value(format!("{target}({all})")),
        MemberKind::DelegateAdd => {
            Call::Value(format!("({owner})System.Delegate.Combine({target}, {})", arg(0)))
        }
        MemberKind::DelegateRemove => {
            Call::Value(format!("({owner})System.Delegate.Remove({target}, {})", arg(0)))
        }
    }
}

fn operator_expression(
    w: &mut CodeWriter,
    op: Operator,
    descriptor: &crossbind_core::MemberDescriptor,
    args: &[String],
) -> String {
    let a = args.first().cloned().unwrap_or_default();
    match (op, op.arity()) {
        (Operator::Increment | Operator::Decrement, _) => {
            w.fmt_line(format_args!("var operand = {a};"));
            w.fmt_line(format_args!("{}operand;", op.symbol()));
            "operand".to_string()
        }
        (Operator::True, _) => format!("({a} ? true : false)"),
        (Operator::False, _) => format!("({a} ? false : true)"),
        (_, OperatorArity::Unary) => format!("{}{a}", op.symbol()),
        (_, OperatorArity::Binary) => {
            let b = args.get(1).cloned().unwrap_or_default();
            format!("{a} {} {b}", op.symbol())
        }
        (_, OperatorArity::Conversion) => format!("({}){a}", cs_type(&descriptor.return_type)),
    }
}

// =============================================================================
// Base-type stubs
// =============================================================================

fn render_stub(w: &mut CodeWriter, base: &BaseTypeBinding) {
    let stub_name = base.stub.name.base_name().to_string();
    w.braced(
        format!(
            "public class {stub_name} : {}, IDisposable, INativeStub",
            base.base.full_name()
        ),
        |w| {
            w.line("public uint NativeHandle;");
            for ctor in &base.constructors {
                w.blank();
                let declared: Vec<String> = ctor
                    .descriptor
                    .params
                    .iter()
                    .map(|p| format!("{} {}", cs_type(&p.ty), p.name))
                    .collect();
                let mut params = vec!["uint nativeHandle".to_string()];
                params.extend(declared);
                let forwarded: Vec<&str> =
                    ctor.descriptor.params.iter().map(|p| p.name.as_str()).collect();
                let chain = if base.is_interface {
                    String::new()
                } else {
                    format!(" : base({})", forwarded.join(", "))
                };
                w.braced(
                    format!("public {stub_name}({}){chain}", params.join(", ")),
                    |w| w.line("NativeHandle = nativeHandle;"),
                );
            }
            w.blank();
            w.braced("public void Detach()", |w| w.line("NativeHandle = 0;"));
            w.blank();
            w.braced("public void Dispose()", |w| {
                w.braced("if (NativeHandle != 0)", |w| {
                    w.line("uint nativeHandle = NativeHandle;");
                    w.line("NativeHandle = 0;");
                    w.fmt_line(format_args!("Bindings.{}(nativeHandle);", base.release_symbol));
                });
            });

            let modifier = if base.is_interface { "public" } else { "public override" };
            let mut rendered_properties: Vec<&str> = Vec::new();
            for invoke in &base.overrides {
                let descriptor = &invoke.descriptor;
                match descriptor.kind {
                    MemberKind::PropertyGet | MemberKind::PropertySet => {
                        if rendered_properties.contains(&descriptor.name.as_str()) {
                            continue;
                        }
                        rendered_properties.push(&descriptor.name);
                        w.blank();
                        render_property_override(w, base, &descriptor.name, modifier);
                    }
                    _ => {
                        w.blank();
                        render_method_override(w, invoke, modifier);
                    }
                }
            }
        },
    );
}

fn forward_args(invoke: &NativeInvokeBinding) -> String {
    let mut args = vec!["NativeHandle".to_string()];
    args.extend(invoke.params.iter().map(|p| {
        format!("{}{}", ref_keyword(p.descriptor.flags), to_wire(p.name(), &p.descriptor.ty))
    }));
    args.join(", ")
}

fn render_forward(w: &mut CodeWriter, invoke: &NativeInvokeBinding) {
    let ret = &invoke.descriptor.return_type;
    if ret.is_void() {
        w.line("if (NativeHandle == 0) return;");
        w.fmt_line(format_args!("Bindings.{}({});", invoke.symbol, forward_args(invoke)));
        w.line("Bindings.CheckNativeException();");
    } else {
        w.fmt_line(format_args!("if (NativeHandle == 0) return default({});", cs_type(ret)));
        w.fmt_line(format_args!(
            "var result = Bindings.{}({});",
            invoke.symbol,
            forward_args(invoke)
        ));
        w.line("Bindings.CheckNativeException();");
        w.fmt_line(format_args!("return {};", from_wire("result", ret)));
    }
}

fn render_method_override(w: &mut CodeWriter, invoke: &NativeInvokeBinding, modifier: &str) {
    let descriptor = &invoke.descriptor;
    let params: Vec<String> = descriptor
        .params
        .iter()
        .map(|p| format!("{}{} {}", ref_keyword(p.flags), cs_type(&p.ty), p.name))
        .collect();
    w.braced(
        format!(
            "{modifier} {} {}({})",
            cs_type(&descriptor.return_type),
            descriptor.name,
            params.join(", ")
        ),
        |w| render_forward(w, invoke),
    );
}

fn render_property_override(w: &mut CodeWriter, base: &BaseTypeBinding, name: &str, modifier: &str) {
    let getter = base
        .overrides
        .iter()
        .find(|o| o.descriptor.kind == MemberKind::PropertyGet && o.descriptor.name == name);
    let setter = base
        .overrides
        .iter()
        .find(|o| o.descriptor.kind == MemberKind::PropertySet && o.descriptor.name == name);
    let ty = getter
        .map(|g| g.descriptor.return_type.clone())
        .or_else(|| setter.and_then(|s| s.descriptor.params.first().map(|p| p.ty.clone())))
        .unwrap_or_else(TypeDescriptor::void);
    w.braced(format!("{modifier} {} {name}", cs_type(&ty)), |w| {
        if let Some(getter) = getter {
            w.braced("get", |w| render_forward(w, getter));
        }
        if let Some(setter) = setter {
            w.braced("set", |w| render_forward(w, setter));
        }
    });
}
