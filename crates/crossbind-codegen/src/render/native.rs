//! Native (Rust) target.
//!
//! The output is one module that depends on `crossbind-runtime` only:
//!
//! - a proxy struct per handle type, owning its handle and releasing it on drop
//! - an enum per bound enum and a `#[repr(C)]` mirror per full value type
//! - an overrides trait, a subclass wrapper and the native-invoke exports per base type
//! - `init`, which accepts the handshake and registers every native table and export
//! - one typed invoker per member trampoline and the `extern "C"` entry points
//!   the managed side imports
//!
//! Every call site goes through [`RuntimeContext::call`], which runs the
//! post-call exception check, so a managed exception comes back as
//! `Err(BridgeError::Exception(..))`.
//!
//! [`RuntimeContext::call`]: https://docs.rs/crossbind-runtime

use rustc_hash::{FxHashMap, FxHashSet};

use crossbind_core::naming::{
    INIT_SYMBOL, SET_MANAGED_EXCEPTION_SYMBOL, TAKE_NATIVE_EXCEPTION_SYMBOL, to_snake_case,
};
use crossbind_core::{
    MemberKind, NativeOperator, OperatorArity, PrimitiveKind, TypeDescriptor, TypeKind, TypeRef,
};

use super::{CodeWriter, RenderOptions, Renderer};
use crate::ir::{
    BaseTypeBinding, BindingPlan, MemberBinding, NativeInvokeBinding, TypeBinding, WireParam,
    WireType,
};
use crate::scan::TypeRole;

/// Renders the native half of the bindings.
#[derive(Debug, Clone, Default)]
pub struct NativeRenderer {
    options: RenderOptions,
}

impl NativeRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }
}

impl Renderer for NativeRenderer {
    fn file_name(&self) -> String {
        format!("{}.rs", self.options.native_module)
    }

    #[cfg_attr(feature = "profiling", profiling::function)]
    fn render(&self, plan: &BindingPlan) -> String {
        let names = Names::build(plan);
        let mut w = CodeWriter::new();
        render_header(&mut w, plan);

        for ty in &plan.types {
            match ty.descriptor.kind {
                TypeKind::Enum if ty.role == TypeRole::Exposed && names.has_enum(&ty.descriptor) => {
                    w.blank();
                    render_enum(&mut w, ty, &names);
                }
                TypeKind::FullValueType if ty.role == TypeRole::Exposed => {
                    w.blank();
                    render_mirror(&mut w, ty, &names);
                }
                _ => {}
            }
        }
        for ty in plan.types.iter().filter(|t| t.has_proxy()) {
            w.blank();
            render_proxy(&mut w, ty, &names, self.options.emit_comments);
        }
        for ty in &plan.types {
            if ty.role == TypeRole::Boxing {
                for member in &ty.members {
                    w.blank();
                    render_free_function(&mut w, member, &names);
                }
            }
        }
        for ty in plan.types.iter().filter(|t| t.native_invoke.is_some()) {
            w.blank();
            render_delegate_target(&mut w, ty, &names);
        }
        for base in &plan.base_types {
            w.blank();
            render_base_type(&mut w, base, &names);
        }
        w.blank();
        render_init(&mut w, plan, &names);
        w.blank();
        render_entry_points(&mut w, plan, &names);
        w.finish()
    }
}

// =============================================================================
// Naming
// =============================================================================

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "box", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "gen", "if", "impl", "in", "let", "loop", "match", "mod",
    "move", "mut", "pub", "ref", "return", "static", "struct", "trait", "true", "type", "unsafe",
    "use", "where", "while", "yield",
];

/// snake_case identifier, raw if it collides with a keyword.
fn ident(name: &str) -> String {
    let snake = to_snake_case(name);
    if KEYWORDS.contains(&snake.as_str()) {
        format!("r#{snake}")
    } else if snake.is_empty() {
        "value".to_string()
    } else {
        snake
    }
}

/// Native type identifiers, decided once per plan so collisions between
/// equal base names in different namespaces fall back to the full fragment.
struct Names {
    idents: FxHashMap<TypeRef, String>,
    enums: FxHashSet<TypeRef>,
    mirrors: FxHashSet<TypeRef>,
    /// Mirrors whose layout matches the managed struct, so they can cross a
    /// C signature by value.
    c_mirrors: FxHashSet<TypeRef>,
    proxies: FxHashSet<TypeRef>,
}

impl Names {
    fn build(plan: &BindingPlan) -> Self {
        let mut names = Names {
            idents: FxHashMap::default(),
            enums: FxHashSet::default(),
            mirrors: FxHashSet::default(),
            c_mirrors: FxHashSet::default(),
            proxies: FxHashSet::default(),
        };
        let mut taken = FxHashSet::default();
        let mut claim = |ty: &TypeDescriptor, names: &mut Names| {
            if names.idents.contains_key(&ty.type_ref) {
                return;
            }
            let short = match &ty.type_ref {
                TypeRef::Named { name, args } if args.is_empty() => name.base_name().to_string(),
                other => other.symbol_fragment(),
            };
            let chosen = if taken.insert(short.clone()) {
                short
            } else {
                let full = ty.symbol_prefix();
                taken.insert(full.clone());
                full
            };
            names.idents.insert(ty.type_ref.clone(), chosen);
        };
        for ty in &plan.types {
            let d = &ty.descriptor;
            match d.kind {
                TypeKind::Enum if ty.role == TypeRole::Exposed && !ty.enum_values.is_empty() => {
                    names.enums.insert(d.type_ref.clone());
                    claim(d, &mut names);
                }
                TypeKind::FullValueType if ty.role == TypeRole::Exposed => {
                    names.mirrors.insert(d.type_ref.clone());
                    if has_c_layout(ty) {
                        names.c_mirrors.insert(d.type_ref.clone());
                    }
                    claim(d, &mut names);
                }
                TypeKind::Reference | TypeKind::ManagedValueType => {
                    names.proxies.insert(d.type_ref.clone());
                    claim(d, &mut names);
                }
                _ => {}
            }
        }
        for base in &plan.base_types {
            claim(&base.stub, &mut names);
        }
        names
    }

    fn ident_of(&self, ty: &TypeDescriptor) -> String {
        self.idents
            .get(&ty.type_ref)
            .cloned()
            .unwrap_or_else(|| ty.symbol_prefix())
    }

    fn has_enum(&self, ty: &TypeDescriptor) -> bool {
        self.enums.contains(&ty.type_ref)
    }

    /// How a value of `ty` looks in typed native code.
    fn native(&self, ty: &TypeDescriptor) -> Native {
        match ty.kind {
            TypeKind::None => Native::Unit,
            TypeKind::Pointer => Native::Pointer,
            TypeKind::Primitive => Native::Primitive(ty.primitive.unwrap_or(PrimitiveKind::Int32)),
            TypeKind::Enum if self.enums.contains(&ty.type_ref) => Native::Enum(self.ident_of(ty)),
            TypeKind::Enum => Native::Primitive(ty.primitive.unwrap_or(PrimitiveKind::Int32)),
            TypeKind::FullValueType if self.mirrors.contains(&ty.type_ref) => {
                Native::Mirror(self.ident_of(ty))
            }
            TypeKind::FullValueType => Native::Wire,
            TypeKind::Reference | TypeKind::ManagedValueType => {
                if self.proxies.contains(&ty.type_ref) {
                    Native::Proxy(self.ident_of(ty))
                } else {
                    Native::Object
                }
            }
        }
    }

    /// How a wire value is spelled in a C signature; `None` for a value type
    /// without a C layout.
    fn c_value(&self, wire: &WireType) -> Option<CValue> {
        Some(match wire {
            WireType::Void => CValue::Unit,
            WireType::Primitive(PrimitiveKind::Boolean) => CValue::Bool,
            WireType::Primitive(PrimitiveKind::Char) => CValue::Char,
            WireType::Primitive(kind) => CValue::Primitive(*kind),
            WireType::Handle => CValue::Handle,
            WireType::Pointer => CValue::Pointer,
            WireType::Struct(ty) if self.c_mirrors.contains(ty) => {
                CValue::Mirror(self.idents.get(ty)?.clone())
            }
            WireType::Struct(_) => return None,
        })
    }

    /// Like [`native`](Self::native), but handle kinds stay raw handles.
    /// Used where native code implements a member rather than calls it.
    fn raw(&self, ty: &TypeDescriptor) -> Native {
        match self.native(ty) {
            Native::Proxy(_) | Native::Object => Native::RawHandle,
            other => other,
        }
    }
}

/// Native spelling of one value.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Native {
    Unit,
    Primitive(PrimitiveKind),
    Enum(String),
    Mirror(String),
    /// A full value type without a generated mirror.
    Wire,
    Proxy(String),
    /// A handle type without a generated proxy.
    Object,
    RawHandle,
    Pointer,
}

impl Native {
    fn spell(&self) -> String {
        match self {
            Native::Unit => "()".to_string(),
            Native::Primitive(kind) => kind.native_name().to_string(),
            Native::Enum(name) | Native::Mirror(name) => name.clone(),
            Native::Wire => "WireValue".to_string(),
            Native::Proxy(name) => format!("{name}<'ctx>"),
            Native::Object => "ManagedObject<'ctx>".to_string(),
            Native::RawHandle => "Handle".to_string(),
            Native::Pointer => "usize".to_string(),
        }
    }

    /// Spelling of a by-value parameter; proxies are borrowed.
    fn param(&self) -> String {
        match self {
            Native::Proxy(name) => format!("&{name}<'_>"),
            Native::Object => "&ManagedObject<'_>".to_string(),
            Native::Mirror(name) => format!("&{name}"),
            Native::Wire => "&WireValue".to_string(),
            other => other.spell(),
        }
    }

    /// `expr` converted to a `WireValue`.
    fn to_wire(&self, expr: &str) -> String {
        match self {
            Native::Unit => "WireValue::Void".to_string(),
            Native::Primitive(PrimitiveKind::Char) => format!("WireValue::Char({expr})"),
            Native::Primitive(_) => format!("WireValue::from({expr})"),
            Native::Enum(_) | Native::Mirror(_) => format!("{expr}.to_wire()"),
            Native::Wire => format!("{expr}.clone()"),
            Native::Proxy(_) | Native::Object => format!("WireValue::Handle({expr}.handle())"),
            Native::RawHandle => format!("WireValue::Handle({expr})"),
            Native::Pointer => format!("WireValue::Pointer({expr})"),
        }
    }

    /// The owned `WireValue` expression `expr` converted back; `?` applies
    /// to a `RuntimeError`.
    fn from_wire(&self, expr: &str, ctx: &str) -> String {
        match self {
            Native::Unit => format!("<()>::try_from({expr})?"),
            Native::Primitive(PrimitiveKind::Char) => format!("{expr}.as_char()?"),
            Native::Primitive(kind) => format!("<{}>::try_from({expr})?", kind.native_name()),
            Native::Enum(name) | Native::Mirror(name) => format!("{name}::from_wire(&{expr})?"),
            Native::Wire => expr.to_string(),
            Native::Proxy(name) => format!("{name}::from_handle({ctx}, {expr}.as_handle()?)?"),
            Native::Object => format!("ManagedObject::from_handle({ctx}, {expr}.as_handle()?)"),
            Native::RawHandle => format!("{expr}.as_handle()?"),
            Native::Pointer => format!("{expr}.as_pointer()?"),
        }
    }

    fn is_copy(&self) -> bool {
        matches!(
            self,
            Native::Primitive(_) | Native::Enum(_) | Native::Mirror(_) | Native::RawHandle | Native::Pointer
        )
    }
}

/// Plain primitive or pointer fields only: `bool` and `char` marshal with a
/// different width by default.
fn has_c_layout(ty: &TypeBinding) -> bool {
    !ty.fields.is_empty()
        && ty.fields.iter().all(|f| match f.ty.kind {
            TypeKind::Primitive => !matches!(
                f.ty.primitive,
                Some(PrimitiveKind::Boolean | PrimitiveKind::Char) | None
            ),
            TypeKind::Pointer => true,
            _ => false,
        })
}

/// A value in a C signature.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CValue {
    Unit,
    /// Four-byte `BOOL`.
    Bool,
    /// UTF-16 code unit.
    Char,
    Primitive(PrimitiveKind),
    Handle,
    Pointer,
    Mirror(String),
}

impl CValue {
    fn spell(&self) -> String {
        match self {
            CValue::Unit => "()".to_string(),
            CValue::Bool => "i32".to_string(),
            CValue::Char => "u16".to_string(),
            CValue::Primitive(kind) => kind.native_name().to_string(),
            CValue::Handle => "u32".to_string(),
            CValue::Pointer => "usize".to_string(),
            CValue::Mirror(name) => name.clone(),
        }
    }

    /// The owned `WireValue` expression `expr` decoded; `?` applies to a
    /// `RuntimeError`.
    fn from_wire(&self, expr: &str) -> String {
        match self {
            CValue::Unit => format!("<()>::try_from({expr})?"),
            CValue::Bool => format!("i32::from(bool::try_from({expr})?)"),
            CValue::Char => format!("{expr}.as_char()?"),
            CValue::Primitive(kind) => format!("<{}>::try_from({expr})?", kind.native_name()),
            CValue::Handle => format!("{expr}.as_handle()?.raw()"),
            CValue::Pointer => format!("{expr}.as_pointer()?"),
            CValue::Mirror(name) => format!("{name}::from_wire(&{expr})?"),
        }
    }

    fn to_wire(&self, expr: &str) -> String {
        match self {
            CValue::Unit => "WireValue::Void".to_string(),
            CValue::Bool => format!("WireValue::Bool({expr} != 0)"),
            CValue::Char => format!("WireValue::Char({expr})"),
            CValue::Primitive(_) => format!("WireValue::from({expr})"),
            CValue::Handle => format!("WireValue::Handle(Handle({expr}))"),
            CValue::Pointer => format!("WireValue::Pointer({expr})"),
            CValue::Mirror(_) => format!("{expr}.to_wire()"),
        }
    }
}

/// Deduplicates function names within one impl block.
#[derive(Default)]
struct FnNames(FxHashMap<String, usize>);

impl FnNames {
    fn claim(&mut self, name: String) -> String {
        let count = self.0.entry(name.clone()).or_insert(0);
        *count += 1;
        if *count == 1 { name } else { format!("{name}_{}", *count - 1) }
    }
}

fn member_fn_name(member: &crossbind_core::MemberDescriptor, names: &Names) -> String {
    let name = &member.name;
    match member.kind {
        MemberKind::Constructor | MemberKind::ArrayConstructor => "new".to_string(),
        MemberKind::Method => ident(name),
        MemberKind::PropertyGet | MemberKind::FieldGet => ident(name),
        MemberKind::PropertySet | MemberKind::FieldSet => format!("set_{}", to_snake_case(name)),
        MemberKind::EventAdd => format!("add_{}", to_snake_case(name)),
        MemberKind::EventRemove => format!("remove_{}", to_snake_case(name)),
        MemberKind::Operator(op) => match (op.native(), op.arity()) {
            (_, OperatorArity::Conversion) => format!(
                "convert_to_{}",
                to_snake_case(&names.ident_of(&member.return_type))
            ),
            (NativeOperator::Inherent(method), _) => method.to_string(),
            (NativeOperator::Trait { method, .. }, _) => format!("op_{method}"),
            (NativeOperator::From, _) => "from_value".to_string(),
        },
        MemberKind::Box => format!("box_{}", to_snake_case(&member.owner.symbol_prefix())),
        MemberKind::Unbox => format!("unbox_{}", to_snake_case(&member.owner.symbol_prefix())),
        MemberKind::ArrayLength => "len".to_string(),
        MemberKind::ArrayGetLength => "get_length".to_string(),
        MemberKind::ArrayGetItem => "get".to_string(),
        MemberKind::ArraySetItem => "set".to_string(),
        MemberKind::DelegateInvoke => "invoke".to_string(),
        MemberKind::DelegateAdd => "combine".to_string(),
        MemberKind::DelegateRemove => "remove".to_string(),
    }
}

// =============================================================================
// Header and footer
// =============================================================================

fn render_header(w: &mut CodeWriter, plan: &BindingPlan) {
    w.line("//! Generated by crossbind. Do not edit.");
    w.line("//!");
    w.line("//! C entry points the managed side imports, all running on [`context`]:");
    w.line("//!");
    w.fmt_line(format_args!(
        "//! - `{INIT_SYMBOL}` -> [`init`] with a [`Handshake::from_raw`]"
    ));
    w.fmt_line(format_args!(
        "//! - `{SET_MANAGED_EXCEPTION_SYMBOL}` -> `RuntimeContext::raise_managed_exception`"
    ));
    w.fmt_line(format_args!(
        "//! - `{TAKE_NATIVE_EXCEPTION_SYMBOL}` -> `RuntimeContext::check_native_exception`"
    ));
    w.line("//! - every entry of [`EXPORT_SYMBOLS`] -> `RuntimeContext::invoke_export`");
    w.blank();
    w.line("#![allow(dead_code, non_snake_case, unused_imports, unused_mut, clippy::all)]");
    w.blank();
    w.line("use std::ffi::c_char;");
    w.line("use std::rc::Rc;");
    w.blank();
    w.line("use crossbind_runtime::ffi::{self, RawInvoker, raw_arg};");
    w.line("use crossbind_runtime::{");
    w.indent(|w| {
        w.line("BridgeError, BridgeException, Diagnostic, Handle, Handshake, PendingException, RuntimeContext,");
        w.line("RuntimeError, SubclassSlot, WireValue, construct_subclass, destroy_subclass, release_subclass,");
        w.line("subclass_slot,");
    });
    w.line("};");
    w.blank();

    w.line("/// Member trampolines in handshake order.");
    w.line("pub const MEMBER_SYMBOLS: &[&str] = &[");
    w.indent(|w| {
        for symbol in plan.handshake_symbols() {
            w.fmt_line(format_args!("\"{symbol}\","));
        }
    });
    w.line("];");
    w.blank();
    w.line("/// Native exports the managed side resolves by name.");
    w.line("pub const EXPORT_SYMBOLS: &[&str] = &[");
    w.indent(|w| {
        for symbol in plan.export_symbols() {
            w.fmt_line(format_args!("\"{symbol}\","));
        }
    });
    w.line("];");
    w.blank();

    w.block(
        "fn arg(args: &[WireValue], index: usize) -> Result<WireValue, BridgeException> {",
        "}",
        |w| {
            w.line("args.get(index).cloned().ok_or_else(|| {");
            w.indent(|w| {
                w.line("BridgeException::native(\"System.ArgumentException\", format!(\"missing argument {index}\"))");
            });
            w.line("})");
        },
    );
    w.blank();

    w.line("/// Owning handle to a managed object that has no generated proxy.");
    w.block("pub struct ManagedObject<'ctx> {", "}", |w| {
        w.line("ctx: &'ctx RuntimeContext,");
        w.line("handle: Handle,");
    });
    w.blank();
    w.block("impl<'ctx> ManagedObject<'ctx> {", "}", |w| {
        w.block(
            "pub fn from_handle(ctx: &'ctx RuntimeContext, handle: Handle) -> Self {",
            "}",
            |w| w.line("Self { ctx, handle }"),
        );
        w.blank();
        w.line("/// A new managed string.");
        w.block(
            "pub fn new_string(ctx: &'ctx RuntimeContext, text: &str) -> Result<Self, BridgeError> {",
            "}",
            |w| w.line("Ok(Self::from_handle(ctx, ctx.string_new(text)?))"),
        );
        w.blank();
        w.block("pub fn handle(&self) -> Handle {", "}", |w| w.line("self.handle"));
        w.blank();
        w.line("/// Give up ownership without releasing.");
        w.block("pub fn into_handle(self) -> Handle {", "}", |w| {
            w.line("let handle = self.handle;");
            w.line("std::mem::forget(self);");
            w.line("handle");
        });
    });
    w.blank();
    w.block("impl Drop for ManagedObject<'_> {", "}", |w| {
        w.block("fn drop(&mut self) {", "}", |w| {
            w.block("if let Err(err) = self.ctx.release_object(self.handle) {", "}", |w| {
                w.line("self.ctx.report(Diagnostic::warning(format!(\"release failed: {err}\")).with_context(self.handle.to_string()));");
            });
        });
    });
}

fn render_init(w: &mut CodeWriter, plan: &BindingPlan, names: &Names) {
    w.line("/// Accept the handshake, then create every native table and register every export.");
    w.block(
        "pub fn init(ctx: &RuntimeContext, handshake: Handshake) -> Result<(), RuntimeError> {",
        "}",
        |w| {
            w.line("ctx.init(handshake, MEMBER_SYMBOLS)?;");
            for ty in plan.types.iter().filter(|t| t.has_proxy()) {
                let name = ty.full_name();
                w.fmt_line(format_args!(
                    "ctx.register_pointer_list(\"{name}\", {});",
                    ty.capacity.max(1)
                ));
                if ty.descriptor.kind == TypeKind::ManagedValueType {
                    w.fmt_line(format_args!(
                        "ctx.register_ref_counts(\"{name}\", ctx.capacity());"
                    ));
                }
                if ty.native_invoke.is_some() {
                    w.fmt_line(format_args!(
                        "ctx.register_object_list(\"{name}\", {});",
                        ty.capacity.max(1)
                    ));
                }
            }
            for base in &plan.base_types {
                let name = base.stub.full_name();
                w.fmt_line(format_args!(
                    "ctx.register_object_list(\"{name}\", {});",
                    base.capacity.max(1)
                ));
                w.fmt_line(format_args!(
                    "ctx.register_ref_counts(\"{name}\", ctx.capacity());"
                ));
            }
            for ty in plan.types.iter().filter(|t| t.native_invoke.is_some()) {
                w.fmt_line(format_args!(
                    "{}::register_exports(ctx);",
                    names.ident_of(&ty.descriptor)
                ));
            }
            for base in &plan.base_types {
                w.fmt_line(format_args!(
                    "{}::register_exports(ctx);",
                    names.ident_of(&base.stub)
                ));
            }
            w.line("Ok(())");
        },
    );
}

// =============================================================================
// Value types
// =============================================================================

fn render_enum(w: &mut CodeWriter, ty: &TypeBinding, names: &Names) {
    let name = names.ident_of(&ty.descriptor);
    let repr = ty
        .descriptor
        .primitive
        .unwrap_or(PrimitiveKind::Int32)
        .native_name();
    let mut seen = FxHashMap::default();
    let mut aliases = Vec::new();
    for (member, value) in &ty.enum_values {
        match seen.get(value) {
            Some(first) => aliases.push((member.clone(), Clone::clone(first))),
            None => {
                seen.insert(*value, member.clone());
            }
        }
    }
    let variants: Vec<&(String, i64)> = ty
        .enum_values
        .iter()
        .filter(|(member, value)| seen.get(value) == Some(member))
        .collect();

    w.fmt_line(format_args!("/// `{}`", ty.full_name()));
    w.fmt_line(format_args!("#[repr({repr})]"));
    w.line("#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]");
    w.block(format!("pub enum {name} {{"), "}", |w| {
        for (i, (member, value)) in variants.iter().enumerate() {
            if i == 0 {
                w.line("#[default]");
            }
            w.fmt_line(format_args!("{member} = {value},"));
        }
    });
    w.blank();
    w.block(format!("impl {name} {{"), "}", |w| {
        w.fmt_line(format_args!(
            "pub const TYPE_NAME: &'static str = \"{}\";",
            ty.full_name()
        ));
        for (alias, first) in &aliases {
            w.fmt_line(format_args!("pub const {alias}: Self = Self::{first};"));
        }
        w.blank();
        w.block("pub fn to_wire(self) -> WireValue {", "}", |w| {
            w.fmt_line(format_args!("WireValue::from(self as {repr})"));
        });
        w.blank();
        w.block(
            "pub fn from_wire(value: &WireValue) -> Result<Self, RuntimeError> {",
            "}",
            |w| {
                w.block("match value.as_i64_lossy()? {", "}", |w| {
                    for (member, value) in &variants {
                        w.fmt_line(format_args!("{value} => Ok(Self::{member}),"));
                    }
                    w.line("other => Err(RuntimeError::WireMismatch {");
                    w.indent(|w| {
                        w.line("expected: Self::TYPE_NAME.to_string(),");
                        w.line("found: format!(\"value {other}\"),");
                    });
                    w.line("}),");
                });
            },
        );
        render_value_members(w, ty, names);
    });
}

fn render_mirror(w: &mut CodeWriter, ty: &TypeBinding, names: &Names) {
    let name = names.ident_of(&ty.descriptor);
    let fields: Vec<(String, Native)> = ty
        .fields
        .iter()
        .map(|f| (ident(&f.name), names.native(&f.ty)))
        .collect();
    let copy = if fields.iter().all(|(_, n)| n.is_copy()) { "Copy, " } else { "" };

    w.fmt_line(format_args!("/// Mirror of `{}`.", ty.full_name()));
    w.line("#[repr(C)]");
    w.fmt_line(format_args!("#[derive(Debug, Clone, {copy}PartialEq, Default)]"));
    w.block(format!("pub struct {name} {{"), "}", |w| {
        for (field, native) in &fields {
            w.fmt_line(format_args!("pub {field}: {},", native.spell()));
        }
    });
    w.blank();
    w.block(format!("impl {name} {{"), "}", |w| {
        w.fmt_line(format_args!(
            "pub const TYPE_NAME: &'static str = \"{}\";",
            ty.full_name()
        ));
        w.blank();
        w.block("pub fn to_wire(&self) -> WireValue {", "}", |w| {
            let parts: Vec<String> = fields
                .iter()
                .map(|(field, native)| native.to_wire(&format!("self.{field}")))
                .collect();
            w.fmt_line(format_args!("WireValue::Struct(vec![{}])", parts.join(", ")));
        });
        w.blank();
        w.block(
            "pub fn from_wire(value: &WireValue) -> Result<Self, RuntimeError> {",
            "}",
            |w| {
                let bindings: Vec<String> = (0..fields.len()).map(|i| format!("f{i}")).collect();
                w.fmt_line(format_args!(
                    "let [{}] = value.as_struct()? else {{",
                    bindings.join(", ")
                ));
                w.indent(|w| {
                    w.line("return Err(RuntimeError::WireMismatch {");
                    w.indent(|w| {
                        w.line("expected: Self::TYPE_NAME.to_string(),");
                        w.line("found: value.shape_name(),");
                    });
                    w.line("});");
                });
                w.line("};");
                w.line("Ok(Self {");
                w.indent(|w| {
                    for (i, (field, native)) in fields.iter().enumerate() {
                        let expr = native.from_wire(&format!("f{i}.clone()"), "ctx");
                        w.fmt_line(format_args!("{field}: {expr},"));
                    }
                });
                w.line("})");
            },
        );
        render_value_members(w, ty, names);
    });
}

/// Members of an enum or mirror. These types carry no context, so every
/// function takes one.
fn render_value_members(w: &mut CodeWriter, ty: &TypeBinding, names: &Names) {
    let mut fn_names = FnNames::default();
    for member in &ty.members {
        w.blank();
        let name = fn_names.claim(member_fn_name(&member.descriptor, names));
        let receiver = match (&member.this, ty.descriptor.kind) {
            (None, _) => None,
            (Some(_), TypeKind::Enum) => Some(("self", "self.to_wire()".to_string())),
            (Some(_), _) => Some(("&self", "self.to_wire()".to_string())),
        };
        render_call_fn(w, member, names, &name, receiver, CtxSource::FnParam { generic: true });
    }
}

// =============================================================================
// Proxies
// =============================================================================

fn render_proxy(w: &mut CodeWriter, ty: &TypeBinding, names: &Names, comments: bool) {
    let name = names.ident_of(&ty.descriptor);
    let counted = ty.descriptor.kind == TypeKind::ManagedValueType;

    w.fmt_line(format_args!("/// Proxy of managed `{}`.", ty.full_name()));
    if counted {
        w.line("///");
        w.line("/// Clones share the handle; the last one dropped frees the managed object.");
    }
    w.block(format!("pub struct {name}<'ctx> {{"), "}", |w| {
        w.line("ctx: &'ctx RuntimeContext,");
        w.line("handle: Handle,");
    });
    w.blank();
    w.block(format!("impl<'ctx> {name}<'ctx> {{"), "}", |w| {
        w.fmt_line(format_args!(
            "pub const TYPE_NAME: &'static str = \"{}\";",
            ty.full_name()
        ));
        w.blank();
        w.line("/// Take ownership of a handle issued by the managed store.");
        w.block(
            "pub fn from_handle(ctx: &'ctx RuntimeContext, handle: Handle) -> Result<Self, RuntimeError> {",
            "}",
            |w| {
                if counted {
                    w.line("ctx.reference(Self::TYPE_NAME, handle)?;");
                }
                w.line("Ok(Self { ctx, handle })");
            },
        );
        w.blank();
        w.block("pub fn handle(&self) -> Handle {", "}", |w| w.line("self.handle"));
        w.blank();
        w.block("pub fn is_null(&self) -> bool {", "}", |w| w.line("self.handle.is_null()"));

        let mut fn_names = FnNames::default();
        render_pointer_list_fns(w, &mut fn_names);
        for member in &ty.members {
            if trait_operator(member, ty).is_some() {
                continue;
            }
            w.blank();
            if comments {
                w.fmt_line(format_args!("/// `{}`", member.descriptor.signature()));
            }
            let name = fn_names.claim(member_fn_name(&member.descriptor, names));
            let receiver = member
                .this
                .as_ref()
                .map(|_| ("&self", "WireValue::Handle(self.handle)".to_string()));
            let ctx = if receiver.is_some() { CtxSource::SelfField } else { CtxSource::FnParam { generic: false } };
            render_call_fn(w, member, names, &name, receiver, ctx);
        }
    });

    for member in &ty.members {
        if let Some((path, method)) = trait_operator(member, ty) {
            w.blank();
            render_operator_impl(w, member, names, &name, path, method);
        }
    }

    if counted {
        w.blank();
        w.block(format!("impl Clone for {name}<'_> {{"), "}", |w| {
            w.block("fn clone(&self) -> Self {", "}", |w| {
                w.block("if let Err(err) = self.ctx.reference(Self::TYPE_NAME, self.handle) {", "}", |w| {
                    w.line("self.ctx.report(Diagnostic::warning(format!(\"reference failed: {err}\")).with_context(Self::TYPE_NAME));");
                });
                w.line("Self { ctx: self.ctx, handle: self.handle }");
            });
        });
    }

    w.blank();
    w.block(format!("impl Drop for {name}<'_> {{"), "}", |w| {
        w.block("fn drop(&mut self) {", "}", |w| {
            w.block("if self.handle.is_null() {", "}", |w| w.line("return;"));
            let release = if counted {
                "self.ctx.dereference(Self::TYPE_NAME, self.handle).map(|_| ())"
            } else {
                "self.ctx.release_object(self.handle)"
            };
            w.fmt_line(format_args!("if let Err(err) = {release} {{"));
            w.indent(|w| {
                w.line("self.ctx.report(Diagnostic::warning(format!(\"release failed: {err}\")).with_context(Self::TYPE_NAME));");
            });
            w.line("}");
        });
    });
}

/// Accessors of the type's pointer free list, for native objects the
/// managed side refers to by handle.
fn render_pointer_list_fns(w: &mut CodeWriter, fn_names: &mut FnNames) {
    let store = fn_names.claim("store_pointer".to_string());
    let get = fn_names.claim("pointer".to_string());
    let remove = fn_names.claim("remove_pointer".to_string());
    w.blank();
    w.line("/// Park a native pointer in this type's pointer list and return its handle.");
    w.block(
        format!("pub fn {store}(ctx: &RuntimeContext, pointer: usize) -> Result<Handle, RuntimeError> {{"),
        "}",
        |w| w.line("ctx.store_pointer(Self::TYPE_NAME, pointer)"),
    );
    w.blank();
    w.block(
        format!("pub fn {get}(ctx: &RuntimeContext, handle: Handle) -> Result<Option<usize>, RuntimeError> {{"),
        "}",
        |w| w.line("ctx.get_pointer(Self::TYPE_NAME, handle)"),
    );
    w.blank();
    w.block(
        format!("pub fn {remove}(ctx: &RuntimeContext, handle: Handle) -> Result<Option<usize>, RuntimeError> {{"),
        "}",
        |w| w.line("ctx.remove_pointer(Self::TYPE_NAME, handle)"),
    );
}

/// Operators that map onto a `std::ops` trait: the first operand must be the
/// proxy itself.
fn trait_operator(member: &MemberBinding, ty: &TypeBinding) -> Option<(&'static str, &'static str)> {
    let MemberKind::Operator(op) = member.descriptor.kind else {
        return None;
    };
    let NativeOperator::Trait { path, method } = op.native() else {
        return None;
    };
    let first = member.params.first()?;
    (first.descriptor.ty.type_ref == ty.descriptor.type_ref).then_some((path, method))
}

fn render_operator_impl(
    w: &mut CodeWriter,
    member: &MemberBinding,
    names: &Names,
    owner: &str,
    path: &str,
    method: &str,
) {
    let ret = names.native(&member.descriptor.return_type);
    let rhs = member.params.get(1).map(|p| names.native(&p.descriptor.ty));
    let header = match &rhs {
        Some(rhs) => format!(
            "impl<'ctx> {path}<{}> for &{owner}<'ctx> {{",
            rhs.param().replace("'_", "'ctx")
        ),
        None => format!("impl<'ctx> {path} for &{owner}<'ctx> {{"),
    };
    w.block(header, "}", |w| {
        w.fmt_line(format_args!(
            "type Output = Result<{}, BridgeError>;",
            ret.spell()
        ));
        w.blank();
        let signature = match &rhs {
            Some(rhs) => format!(
                "fn {method}(self, rhs: {}) -> Self::Output {{",
                rhs.param().replace("'_", "'ctx")
            ),
            None => format!("fn {method}(self) -> Self::Output {{"),
        };
        w.block(signature, "}", |w| {
            w.line("let ctx = self.ctx;");
            let mut args = vec!["WireValue::Handle(self.handle)".to_string()];
            if let Some(rhs) = &rhs {
                args.push(rhs.to_wire("rhs"));
            }
            w.fmt_line(format_args!(
                "let result = ctx.call({}, &[{}])?;",
                member.index,
                args.join(", ")
            ));
            w.fmt_line(format_args!("Ok({})", ret.from_wire("result", "ctx")));
        });
    });
}

// =============================================================================
// Call sites
// =============================================================================

enum CtxSource {
    /// Instance member of a proxy: `self.ctx`.
    SelfField,
    /// A `ctx` parameter. `generic` declares the `'ctx` lifetime on the
    /// function, for impls that do not have one.
    FnParam { generic: bool },
}

fn render_free_function(w: &mut CodeWriter, member: &MemberBinding, names: &Names) {
    let name = member_fn_name(&member.descriptor, names);
    render_call_fn(w, member, names, &name, None, CtxSource::FnParam { generic: true });
}

/// One function calling one managed trampoline.
fn render_call_fn(
    w: &mut CodeWriter,
    member: &MemberBinding,
    names: &Names,
    name: &str,
    receiver: Option<(&str, String)>,
    ctx: CtxSource,
) {
    let descriptor = &member.descriptor;
    let ret = if descriptor.kind.is_constructor() {
        names.native(&descriptor.owner)
    } else {
        names.native(&descriptor.return_type)
    };
    let returns_self = matches!(&ret, Native::Proxy(_)) && descriptor.kind.is_constructor();

    let mut params = Vec::new();
    let mut generics = "";
    if let Some((recv, _)) = &receiver {
        params.push(recv.to_string());
    }
    match ctx {
        CtxSource::SelfField => {}
        CtxSource::FnParam { generic } => {
            if generic {
                generics = "<'ctx>";
            }
            params.push("ctx: &'ctx RuntimeContext".to_string());
        }
    }
    for p in &member.params {
        params.push(param_decl(p, names));
    }
    let ret_spell = if returns_self { "Self".to_string() } else { ret.spell() };
    w.block(
        format!(
            "pub fn {name}{generics}({}) -> Result<{ret_spell}, BridgeError> {{",
            params.join(", ")
        ),
        "}",
        |w| {
            if matches!(ctx, CtxSource::SelfField) {
                w.line("let ctx = self.ctx;");
            }
            let mut args = Vec::new();
            if let Some((_, this)) = &receiver {
                args.push(this.clone());
            }
            for p in &member.params {
                args.push(param_arg(w, p, names));
            }
            let call = format!("ctx.call({}, &[{}])?", member.index, args.join(", "));
            if ret == Native::Unit {
                w.fmt_line(format_args!("{call};"));
                write_back(w, member, names);
                w.line("Ok(())");
            } else {
                w.fmt_line(format_args!("let result = {call};"));
                write_back(w, member, names);
                w.fmt_line(format_args!("Ok({})", ret.from_wire("result", "ctx")));
            }
        },
    );
}

fn param_decl(param: &WireParam, names: &Names) -> String {
    let native = names.native(&param.descriptor.ty);
    let name = ident(param.name());
    if param.by_ref {
        format!("{name}: &mut {}", native.spell())
    } else {
        format!("{name}: {}", native.param())
    }
}

/// The wire argument for `param`; by-ref parameters get a cell first, and
/// the argument shares it so [`write_back`] can read it after the call.
fn param_arg(w: &mut CodeWriter, param: &WireParam, names: &Names) -> String {
    let native = names.native(&param.descriptor.ty);
    let name = ident(param.name());
    if param.by_ref {
        let cell = format!("{}_ref", name.trim_start_matches("r#"));
        w.fmt_line(format_args!(
            "let {cell} = WireValue::new_ref({});",
            native.to_wire(&format!("(*{name})"))
        ));
        format!("{cell}.clone()")
    } else {
        native.to_wire(&name)
    }
}

fn write_back(w: &mut CodeWriter, member: &MemberBinding, names: &Names) {
    for p in member.params.iter().filter(|p| p.by_ref) {
        let native = names.native(&p.descriptor.ty);
        let name = ident(p.name());
        let cell = format!("{}_ref", name.trim_start_matches("r#"));
        w.fmt_line(format_args!(
            "*{name} = {};",
            native.from_wire(&format!("{cell}.read_ref()?"), "ctx")
        ));
    }
}

// =============================================================================
// Native-invoke exports
// =============================================================================

/// Body of an export: decode `args[first..]`, call `target`, encode the result.
fn render_export_body(
    w: &mut CodeWriter,
    invoke: &NativeInvokeBinding,
    names: &Names,
    first: usize,
    target: &str,
) {
    let mut call_args = vec!["ctx".to_string()];
    for (i, p) in invoke.params.iter().enumerate() {
        let native = names.raw(&p.descriptor.ty);
        let name = ident(p.name());
        let index = first + i;
        if p.by_ref {
            w.fmt_line(format_args!("let {name}_cell = arg(args, {index})?;"));
            w.fmt_line(format_args!(
                "let mut {name} = {};",
                native.from_wire(&format!("{name}_cell.read_ref()?"), "ctx")
            ));
            call_args.push(format!("&mut {name}"));
        } else {
            w.fmt_line(format_args!(
                "let {name} = {};",
                native.from_wire(&format!("arg(args, {index})?"), "ctx")
            ));
            call_args.push(if matches!(native, Native::Mirror(_) | Native::Wire) {
                format!("&{name}")
            } else {
                name
            });
        }
    }
    let ret = names.raw(&invoke.descriptor.return_type);
    w.fmt_line(format_args!("let result = {target}({})?;", call_args.join(", ")));
    for p in invoke.params.iter().filter(|p| p.by_ref) {
        let native = names.raw(&p.descriptor.ty);
        let name = ident(p.name());
        w.fmt_line(format_args!(
            "{name}_cell.write_ref({})?;",
            native.to_wire(&name)
        ));
    }
    if ret == Native::Unit {
        w.line("let () = result;");
        w.line("Ok(WireValue::Void)");
    } else {
        w.fmt_line(format_args!("Ok({})", ret.to_wire("result")));
    }
}

/// Raw parameter list for native implementations.
fn raw_params(invoke: &NativeInvokeBinding, names: &Names, prefix: &str) -> Vec<String> {
    invoke
        .params
        .iter()
        .map(|p| {
            let native = names.raw(&p.descriptor.ty);
            let name = format!("{prefix}{}", ident(p.name()).trim_start_matches("r#"));
            if p.by_ref {
                format!("{name}: &mut {}", native.spell())
            } else {
                format!("{name}: {}", native.param())
            }
        })
        .collect()
}

fn render_delegate_target(w: &mut CodeWriter, ty: &TypeBinding, names: &Names) {
    let Some(invoke) = &ty.native_invoke else {
        return;
    };
    let name = names.ident_of(&ty.descriptor);
    let ret = names.raw(&invoke.descriptor.return_type);
    let param_types: Vec<String> = raw_params(invoke, names, "")
        .into_iter()
        .map(|p| p.split_once(": ").map(|(_, t)| t.to_string()).unwrap_or(p))
        .collect();
    let mut fn_args = vec!["&RuntimeContext".to_string()];
    fn_args.extend(param_types);

    w.fmt_line(format_args!(
        "/// A native function that a managed `{}` can target.",
        ty.full_name()
    ));
    w.fmt_line(format_args!(
        "pub type {name}Target = dyn Fn({}) -> Result<{}, BridgeException>;",
        fn_args.join(", "),
        ret.spell()
    ));
    w.blank();
    w.block(format!("impl<'ctx> {name}<'ctx> {{"), "}", |w| {
        w.line("/// Park a native target; the managed side invokes it through the returned handle.");
        w.block(
            format!(
                "pub fn register_target(ctx: &RuntimeContext, target: impl Fn({}) -> Result<{}, BridgeException> + 'static) -> Result<Handle, RuntimeError> {{",
                fn_args.join(", "),
                ret.spell()
            ),
            "}",
            |w| {
                w.fmt_line(format_args!(
                    "ctx.allocate_object(Self::TYPE_NAME, Rc::new(Box::new(target) as Box<{name}Target>))"
                ));
            },
        );
        w.blank();
        w.block("pub fn release_target(ctx: &RuntimeContext, target: Handle) -> Result<(), RuntimeError> {", "}", |w| {
            w.line("ctx.release_object_storage(Self::TYPE_NAME, target)?;");
            w.line("Ok(())");
        });
        w.blank();
        w.block("fn register_exports(ctx: &RuntimeContext) {", "}", |w| {
            w.fmt_line(format_args!(
                "ctx.register_export(\"{}\", Rc::new(|ctx: &RuntimeContext, args: &[WireValue]| -> Result<WireValue, BridgeException> {{",
                invoke.symbol
            ));
            w.indent(|w| {
                w.line("let target = arg(args, 0)?.as_handle()?;");
                w.fmt_line(format_args!(
                    "let object = ctx.object(\"{}\", target)?.ok_or_else(|| {{",
                    ty.full_name()
                ));
                w.indent(|w| {
                    w.line("BridgeException::native(\"System.ObjectDisposedException\", format!(\"delegate target {target} was released\"))");
                });
                w.line("})?;");
                w.fmt_line(format_args!(
                    "let target = object.downcast::<Box<{name}Target>>().map_err(|_| {{"
                ));
                w.indent(|w| {
                    w.line("BridgeException::native(\"System.InvalidCastException\", \"not a delegate target\")");
                });
                w.line("})?;");
                render_export_body(w, invoke, names, 1, "target");
            });
            w.line("}));");
        });
    });
}

// =============================================================================
// Base types
// =============================================================================

fn override_fn_name(invoke: &NativeInvokeBinding) -> String {
    let d = &invoke.descriptor;
    match d.kind {
        MemberKind::PropertyGet => format!("get_{}", to_snake_case(&d.name)),
        MemberKind::PropertySet => format!("set_{}", to_snake_case(&d.name)),
        _ => ident(&d.name),
    }
}

fn render_base_type(w: &mut CodeWriter, base: &BaseTypeBinding, names: &Names) {
    let name = names.ident_of(&base.stub);
    let overrides_trait = format!("{name}Overrides");
    let stub_name = base.stub.full_name();

    // trait
    w.fmt_line(format_args!(
        "/// Native overrides of `{}`. Every method defaults to a no-op returning zero.",
        base.base.full_name()
    ));
    let mut fn_names = FnNames::default();
    let override_names: Vec<String> = base
        .overrides
        .iter()
        .map(|o| fn_names.claim(override_fn_name(o)))
        .collect();
    w.block(format!("pub trait {overrides_trait} {{"), "}", |w| {
        for (i, (invoke, fn_name)) in base.overrides.iter().zip(&override_names).enumerate() {
            if i > 0 {
                w.blank();
            }
            let ret = names.raw(&invoke.descriptor.return_type);
            let mut params = vec!["&self".to_string(), "_ctx: &RuntimeContext".to_string()];
            params.extend(raw_params(invoke, names, "_"));
            w.fmt_line(format_args!("/// `{}`", invoke.descriptor.signature()));
            w.block(
                format!(
                    "fn {fn_name}({}) -> Result<{}, BridgeException> {{",
                    params.join(", "),
                    ret.spell()
                ),
                "}",
                |w| w.line("Ok(Default::default())"),
            );
        }
    });
    w.blank();

    // wrapper
    w.fmt_line(format_args!(
        "/// Native subclass instance of `{}`, linked to a managed `{stub_name}`.",
        base.base.full_name()
    ));
    w.block(format!("pub struct {name}<'ctx> {{"), "}", |w| {
        w.line("ctx: &'ctx RuntimeContext,");
        w.fmt_line(format_args!("slot: Rc<SubclassSlot<dyn {overrides_trait}>>,"));
    });
    w.blank();
    w.block(format!("impl<'ctx> {name}<'ctx> {{"), "}", |w| {
        w.fmt_line(format_args!("pub const TYPE_NAME: &'static str = \"{stub_name}\";"));
        let mut ctor_names = FnNames::default();
        for ctor in &base.constructors {
            w.blank();
            let fn_name = ctor_names.claim("new".to_string());
            let mut params = vec![
                "ctx: &'ctx RuntimeContext".to_string(),
                format!("overrides: impl {overrides_trait} + 'static"),
            ];
            params.extend(ctor.params.iter().map(|p| param_decl(p, names)));
            w.block(
                format!("pub fn {fn_name}({}) -> Result<Self, BridgeError> {{", params.join(", ")),
                "}",
                |w| {
                    let mut args = vec!["WireValue::Handle(native)".to_string()];
                    for p in &ctor.params {
                        args.push(param_arg(w, p, names));
                    }
                    w.fmt_line(format_args!(
                        "let slot = construct_subclass::<dyn {overrides_trait}>(ctx, Self::TYPE_NAME, Box::new(overrides), |native| {{"
                    ));
                    w.indent(|w| {
                        w.fmt_line(format_args!(
                            "ctx.call({}, &[{}])",
                            ctor.index,
                            args.join(", ")
                        ));
                    });
                    w.line("})?;");
                    write_back(w, ctor, names);
                    w.line("Ok(Self { ctx, slot })");
                },
            );
        }
        w.blank();
        w.line("/// Handle of the managed stub; null once the managed side disposed it.");
        w.block("pub fn handle(&self) -> Handle {", "}", |w| w.line("self.slot.managed()"));
        w.blank();
        w.block("pub fn native_handle(&self) -> Handle {", "}", |w| w.line("self.slot.native()"));
        w.blank();
        w.block(format!("pub fn overrides(&self) -> &dyn {overrides_trait} {{"), "}", |w| {
            w.line("self.slot.overrides()")
        });
        w.blank();
        w.block("fn register_exports(ctx: &RuntimeContext) {", "}", |w| {
            for (invoke, fn_name) in base.overrides.iter().zip(&override_names) {
                w.fmt_line(format_args!(
                    "ctx.register_export(\"{}\", Rc::new(|ctx: &RuntimeContext, args: &[WireValue]| -> Result<WireValue, BridgeException> {{",
                    invoke.symbol
                ));
                w.indent(|w| {
                    w.fmt_line(format_args!(
                        "let slot = subclass_slot::<dyn {overrides_trait}>(ctx, \"{stub_name}\", arg(args, 0)?.as_handle()?)?;"
                    ));
                    render_export_body(w, invoke, names, 1, &format!("slot.overrides().{fn_name}"));
                });
                w.line("}));");
            }
            w.fmt_line(format_args!(
                "ctx.register_export(\"{}\", Rc::new(|ctx: &RuntimeContext, args: &[WireValue]| -> Result<WireValue, BridgeException> {{",
                base.release_symbol
            ));
            w.indent(|w| {
                w.fmt_line(format_args!(
                    "release_subclass::<dyn {overrides_trait}>(ctx, \"{stub_name}\", arg(args, 0)?.as_handle()?)?;"
                ));
                w.line("Ok(WireValue::Void)");
            });
            w.line("}));");
        });
    });
    w.blank();
    w.block(format!("impl Drop for {name}<'_> {{"), "}", |w| {
        w.line("/// Leaves the slot alone if the managed side already disposed it.");
        w.block("fn drop(&mut self) {", "}", |w| {
            w.fmt_line(format_args!(
                "if let Err(err) = destroy_subclass(self.ctx, Self::TYPE_NAME, &self.slot) {{"
            ));
            w.indent(|w| {
                w.line("self.ctx.report(Diagnostic::warning(format!(\"destroy failed: {err}\")).with_context(Self::TYPE_NAME));");
            });
            w.line("}");
        });
    });
}

// =============================================================================
// C entry points
// =============================================================================

/// One argument position of a C signature.
struct CSlot {
    value: Option<CValue>,
    by_ref: bool,
}

impl CSlot {
    fn by_value(value: Option<CValue>) -> Self {
        Self { value, by_ref: false }
    }

    fn spell(&self) -> Option<String> {
        let value = self.value.as_ref()?.spell();
        Some(if self.by_ref { format!("*mut {value}") } else { value })
    }
}

/// C signature of a trampoline or export: argument slots and return value.
struct CSignature {
    slots: Vec<CSlot>,
    ret: Option<CValue>,
}

impl CSignature {
    fn of_member(member: &MemberBinding, stub: Option<&BaseTypeBinding>, names: &Names) -> Self {
        let descriptor = &member.descriptor;
        let mut slots = Vec::new();
        if stub.is_some() {
            slots.push(CSlot::by_value(Some(CValue::Handle)));
        }
        if let Some(this) = &member.this {
            slots.push(CSlot::by_value(names.c_value(this)));
        }
        slots.extend(member.params.iter().map(|p| CSlot {
            value: names.c_value(&p.wire),
            by_ref: p.by_ref,
        }));
        let ret = if descriptor.kind.is_constructor() {
            names.c_value(&WireType::of(stub.map_or(&descriptor.owner, |s| &s.stub)))
        } else {
            names.c_value(&member.ret)
        };
        Self { slots, ret }
    }

    fn of_export(invoke: &NativeInvokeBinding, names: &Names) -> Self {
        let mut slots = vec![CSlot::by_value(Some(CValue::Handle))];
        slots.extend(invoke.params.iter().map(|p| CSlot {
            value: names.c_value(&p.wire),
            by_ref: p.by_ref,
        }));
        Self {
            slots,
            ret: names.c_value(&invoke.ret),
        }
    }

    fn is_supported(&self) -> bool {
        self.ret.is_some() && self.slots.iter().all(|s| s.value.is_some())
    }

    /// `extern "C" fn(..) -> ..`, if every position has a C spelling.
    fn fn_type(&self) -> Option<String> {
        let params = self.slots.iter().map(CSlot::spell).collect::<Option<Vec<_>>>()?;
        let ret = match self.ret.as_ref()? {
            CValue::Unit => String::new(),
            other => format!(" -> {}", other.spell()),
        };
        Some(format!("extern \"C\" fn({}){ret}", params.join(", ")))
    }
}

fn render_entry_points(w: &mut CodeWriter, plan: &BindingPlan, names: &Names) {
    let members: Vec<(&MemberBinding, Option<&BaseTypeBinding>)> = plan
        .types
        .iter()
        .flat_map(|t| t.members.iter().map(|m| (m, None)))
        .chain(
            plan.base_types
                .iter()
                .flat_map(|b| b.constructors.iter().map(move |c| (c, Some(b)))),
        )
        .collect();

    w.line("/// Invokers of the member trampolines, parallel to [`MEMBER_SYMBOLS`].");
    w.line("pub const MEMBER_INVOKERS: &[RawInvoker] = &[");
    w.indent(|w| {
        for (member, _) in &members {
            w.fmt_line(format_args!("invoke_member_{},", member.index));
        }
    });
    w.line("];");
    for (member, stub) in &members {
        w.blank();
        render_invoker(w, member, &CSignature::of_member(member, *stub, names));
    }

    w.blank();
    w.line("thread_local! {");
    w.indent(|w| w.line("static CONTEXT: RuntimeContext = RuntimeContext::default();"));
    w.line("}");
    w.blank();
    w.line("/// The context the C entry points run on. Bindings belong to the thread");
    w.line("/// that calls `Init`.");
    w.block("pub fn context() -> RuntimeContext {", "}", |w| {
        w.line("CONTEXT.with(RuntimeContext::clone)")
    });
    w.blank();
    w.line("/// A failed export parks a native exception for `TakeNativeException`");
    w.line("/// and returns zero.");
    w.block(
        "fn export_result<T: Default>(ctx: &RuntimeContext, symbol: &str, result: Result<T, RuntimeError>) -> T {",
        "}",
        |w| {
            w.line("result.unwrap_or_else(|err| {");
            w.indent(|w| {
                w.line("ctx.raise_native_exception(PendingException::new(Handle::NULL, \"System.InvalidOperationException\", format!(\"{symbol}: {err}\")));");
                w.line("T::default()");
            });
            w.line("})");
        },
    );

    w.blank();
    render_init_entry(w, &members);
    w.blank();
    w.line("/// # Safety");
    w.line("///");
    w.line("/// Both strings must be null or NUL-terminated UTF-8 valid for the call.");
    w.line("#[unsafe(no_mangle)]");
    w.block(
        format!("pub unsafe extern \"C\" fn {SET_MANAGED_EXCEPTION_SYMBOL}(handle: u32, type_name: *const c_char, message: *const c_char) {{"),
        "}",
        |w| {
            w.line("// SAFETY: guaranteed by the caller.");
            w.line("let (type_name, message) = unsafe { (ffi::c_str_lossy(type_name), ffi::c_str_lossy(message)) };");
            w.line("CONTEXT.with(|ctx| ctx.raise_managed_exception(PendingException::new(Handle(handle), type_name, message)));");
        },
    );
    w.blank();
    w.line("/// Handle of a managed string describing the pending native exception, or 0.");
    w.line("#[unsafe(no_mangle)]");
    w.block(
        format!("pub extern \"C\" fn {TAKE_NATIVE_EXCEPTION_SYMBOL}() -> u32 {{"),
        "}",
        |w| {
            w.block("CONTEXT.with(|ctx| match ctx.check_native_exception() {", "})", |w| {
                w.line("Ok(()) => 0,");
                w.block("Err(exception) => match ctx.string_new(&exception.to_string()) {", "},", |w| {
                    w.line("Ok(handle) => handle.raw(),");
                    w.block("Err(err) => {", "}", |w| {
                        w.fmt_line(format_args!(
                            "ctx.report(Diagnostic::error(format!(\"{{exception}} lost: {{err}}\")).with_context(\"{TAKE_NATIVE_EXCEPTION_SYMBOL}\"));"
                        ));
                        w.line("0");
                    });
                });
            });
        },
    );

    for invoke in plan.native_invokes() {
        w.blank();
        render_export_entry(w, invoke, &CSignature::of_export(invoke, names));
    }
    for base in &plan.base_types {
        w.blank();
        w.fmt_line(format_args!("/// `Dispose` of a managed `{}`.", base.stub.full_name()));
        w.line("#[unsafe(no_mangle)]");
        w.block(
            format!("pub extern \"C\" fn {}(native_handle: u32) {{", base.release_symbol),
            "}",
            |w| {
                w.block("CONTEXT.with(|ctx| {", "});", |w| {
                    w.fmt_line(format_args!(
                        "let result = ctx.invoke_export(\"{}\", &[WireValue::Handle(Handle(native_handle))]).map(|_| ());",
                        base.release_symbol
                    ));
                    w.fmt_line(format_args!(
                        "export_result(ctx, \"{}\", result)",
                        base.release_symbol
                    ));
                });
            },
        );
    }
}

/// Calls one managed trampoline through its address.
fn render_invoker(w: &mut CodeWriter, member: &MemberBinding, signature: &CSignature) {
    let index = member.index;
    w.fmt_line(format_args!("/// `{}`", member.symbol));
    let Some(fn_type) = signature.fn_type() else {
        w.block(
            format!("unsafe fn invoke_member_{index}(_address: usize, _args: &[WireValue]) -> Result<WireValue, RuntimeError> {{"),
            "}",
            |w| {
                w.line("Err(RuntimeError::WireMismatch {");
                w.indent(|w| {
                    w.fmt_line(format_args!(
                        "expected: \"a C layout for every argument of {}\".to_string(),",
                        member.symbol
                    ));
                    w.line("found: \"a value type without one\".to_string(),");
                });
                w.line("})");
            },
        );
        return;
    };
    w.block(
        format!("unsafe fn invoke_member_{index}(address: usize, args: &[WireValue]) -> Result<WireValue, RuntimeError> {{"),
        "}",
        |w| {
            let mut call_args = Vec::new();
            for (i, slot) in signature.slots.iter().enumerate() {
                let Some(value) = &slot.value else { continue };
                if slot.by_ref {
                    w.fmt_line(format_args!(
                        "let mut a{i} = {};",
                        value.from_wire(&format!("raw_arg(args, {i})?.read_ref()?"))
                    ));
                    call_args.push(format!("&mut a{i}"));
                } else {
                    w.fmt_line(format_args!(
                        "let a{i} = {};",
                        value.from_wire(&format!("raw_arg(args, {i})?.clone()"))
                    ));
                    call_args.push(format!("a{i}"));
                }
            }
            w.line("// SAFETY: `Init` handed over this member's trampoline, which has this signature.");
            w.fmt_line(format_args!(
                "let trampoline = unsafe {{ std::mem::transmute::<usize, {fn_type}>(address) }};"
            ));
            let call = format!("trampoline({})", call_args.join(", "));
            let ret = signature.ret.clone().unwrap_or(CValue::Unit);
            if ret == CValue::Unit {
                w.fmt_line(format_args!("{call};"));
            } else {
                w.fmt_line(format_args!("let result = {call};"));
            }
            for (i, slot) in signature.slots.iter().enumerate() {
                if let (true, Some(value)) = (slot.by_ref, &slot.value) {
                    w.fmt_line(format_args!(
                        "raw_arg(args, {i})?.write_ref({})?;",
                        value.to_wire(&format!("a{i}"))
                    ));
                }
            }
            w.fmt_line(format_args!("Ok({})", ret.to_wire("result")));
        },
    );
}

fn render_init_entry(w: &mut CodeWriter, members: &[(&MemberBinding, Option<&BaseTypeBinding>)]) {
    let mut params = vec![
        "capacity: i32".to_string(),
        "release_object: usize".to_string(),
        "string_new: usize".to_string(),
    ];
    params.extend(members.iter().map(|(m, _)| format!("member_{}: usize", m.index)));
    let mut pointers = vec!["release_object".to_string(), "string_new".to_string()];
    pointers.extend(members.iter().map(|(m, _)| format!("member_{}", m.index)));

    w.line("/// [`Init`] with the callback and trampoline addresses as one slice, in");
    w.line("/// handshake order.");
    w.line("///");
    w.line("/// # Safety");
    w.line("///");
    w.line("/// Every address must be a function with the C signature of its callback or");
    w.line("/// trampoline, valid until the bindings shut down.");
    w.block("pub unsafe fn init_from_raw(capacity: i32, pointers: &[usize]) {", "}", |w| {
        w.line("let capacity = u32::try_from(capacity).unwrap_or(0);");
        w.block("CONTEXT.with(|ctx| {", "});", |w| {
            w.line("// SAFETY: guaranteed by the caller; MEMBER_INVOKERS matches MEMBER_SYMBOLS.");
            w.line("let handshake = unsafe { Handshake::from_raw(capacity, pointers, MEMBER_SYMBOLS, MEMBER_INVOKERS) };");
            w.block("if let Err(err) = handshake.and_then(|handshake| init(ctx, handshake)) {", "}", |w| {
                w.fmt_line(format_args!(
                    "ctx.report(Diagnostic::error(format!(\"init failed: {{err}}\")).with_context(\"{INIT_SYMBOL}\"));"
                ));
            });
        });
    });
    w.blank();
    w.line("/// # Safety");
    w.line("///");
    w.line("/// As for [`init_from_raw`].");
    w.line("#[unsafe(no_mangle)]");
    w.block(
        format!("pub unsafe extern \"C\" fn {INIT_SYMBOL}({}) {{", params.join(", ")),
        "}",
        |w| {
            w.line("// SAFETY: guaranteed by the caller.");
            w.fmt_line(format_args!("unsafe {{ init_from_raw(capacity, &[{}]) }}", pointers.join(", ")));
        },
    );
}

/// The C entry point of one native-invoke export.
fn render_export_entry(w: &mut CodeWriter, invoke: &NativeInvokeBinding, signature: &CSignature) {
    let symbol = &invoke.symbol;
    if !signature.is_supported() {
        w.fmt_line(format_args!(
            "// {symbol}: a value type without a C layout, reachable through `RuntimeContext::invoke_export` only."
        ));
        return;
    }
    let ret = signature.ret.clone().unwrap_or(CValue::Unit);
    let mut params = vec!["native_handle: u32".to_string()];
    let mut has_refs = false;
    for (i, slot) in signature.slots.iter().enumerate().skip(1) {
        let spelled = slot.spell().unwrap_or_default();
        if slot.by_ref {
            has_refs = true;
            params.push(format!("ref_{i}: {spelled}"));
        } else {
            params.push(format!("arg_{i}: {spelled}"));
        }
    }
    let ret_spell = match &ret {
        CValue::Unit => String::new(),
        other => format!(" -> {}", other.spell()),
    };
    let qualifier = if has_refs { "unsafe extern" } else { "extern" };

    w.fmt_line(format_args!("/// `{}`", invoke.descriptor.signature()));
    if has_refs {
        w.line("///");
        w.line("/// # Safety");
        w.line("///");
        w.line("/// By-ref arguments must be null or valid for reads and writes.");
    }
    w.line("#[unsafe(no_mangle)]");
    w.block(
        format!("pub {qualifier} \"C\" fn {symbol}({}){ret_spell} {{", params.join(", ")),
        "}",
        |w| {
            w.block("CONTEXT.with(|ctx| {", "})", |w| {
                let mut args = vec!["WireValue::Handle(Handle(native_handle))".to_string()];
                for (i, slot) in signature.slots.iter().enumerate().skip(1) {
                    let Some(value) = &slot.value else { continue };
                    if slot.by_ref {
                        w.line("// SAFETY: guaranteed by the caller.");
                        w.fmt_line(format_args!(
                            "let cell_{i} = WireValue::new_ref({});",
                            value.to_wire(&format!("unsafe {{ ref_{i}.as_ref() }}.copied().unwrap_or_default()"))
                        ));
                        args.push(format!("cell_{i}.clone()"));
                    } else {
                        args.push(value.to_wire(&format!("arg_{i}")));
                    }
                }
                w.fmt_line(format_args!("let args = [{}];", args.join(", ")));
                w.fmt_line(format_args!(
                    "let result = ctx.invoke_export(\"{symbol}\", &args).and_then(|returned| {{"
                ));
                w.indent(|w| {
                    for (i, slot) in signature.slots.iter().enumerate().skip(1) {
                        let (true, Some(value)) = (slot.by_ref, &slot.value) else { continue };
                        w.line("// SAFETY: guaranteed by the caller.");
                        w.block(format!("if let Some(target) = unsafe {{ ref_{i}.as_mut() }} {{"), "}", |w| {
                            w.fmt_line(format_args!(
                                "*target = {};",
                                value.from_wire(&format!("cell_{i}.read_ref()?"))
                            ));
                        });
                    }
                    if ret == CValue::Unit {
                        w.line("let _ = returned;");
                        w.line("Ok(())");
                    } else {
                        // a failed body leaves a void result behind its parked exception
                        w.block("Ok(match returned {", "})", |w| {
                            w.line("WireValue::Void => Default::default(),");
                            w.fmt_line(format_args!("returned => {},", ret.from_wire("returned")));
                        });
                    }
                });
                w.line("});");
                w.fmt_line(format_args!("export_result(ctx, \"{symbol}\", result)"));
            });
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert_eq!(ident("Add"), "add");
        assert_eq!(ident("Type"), "r#type");
        assert_eq!(ident(""), "value");
    }

    #[test]
    fn conversions() {
        let int = Native::Primitive(PrimitiveKind::Int32);
        assert_eq!(int.to_wire("a"), "WireValue::from(a)");
        assert_eq!(int.from_wire("result", "ctx"), "<i32>::try_from(result)?");
        let calc = Native::Proxy("Calc".to_string());
        assert_eq!(calc.param(), "&Calc<'_>");
        assert_eq!(calc.to_wire("a"), "WireValue::Handle(a.handle())");
        assert_eq!(
            calc.from_wire("result", "ctx"),
            "Calc::from_handle(ctx, result.as_handle()?)?"
        );
        assert_eq!(
            Native::Primitive(PrimitiveKind::Char).from_wire("r", "ctx"),
            "r.as_char()?"
        );
    }

    #[test]
    fn overload_names() {
        let mut names = FnNames::default();
        assert_eq!(names.claim("add".to_string()), "add");
        assert_eq!(names.claim("add".to_string()), "add_1");
        assert_eq!(names.claim("sub".to_string()), "sub");
    }
}
