//! Generation-time descriptors.
//!
//! These are the immutable records produced by the one-time scan of a
//! binding spec against the type catalog. They carry everything the binding
//! generator needs and nothing it has to look up again.

use std::fmt;

use bitflags::bitflags;
use ordered_float::OrderedFloat;

use crate::{Operator, PrimitiveKind, QualifiedName, TypeHash, TypeKind, TypeRef};

/// A classified type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    /// The (closed) type reference.
    pub type_ref: TypeRef,
    /// Definition name including the arity suffix for generic types.
    pub name: QualifiedName,
    /// Number of generic parameters.
    pub arity: usize,
    /// Marshaling category.
    pub kind: TypeKind,
    /// Wire primitive for `Primitive` kinds and the underlying type of enums.
    pub primitive: Option<PrimitiveKind>,
}

impl TypeDescriptor {
    pub fn new(type_ref: TypeRef, kind: TypeKind) -> Self {
        let (name, arity) = match &type_ref {
            TypeRef::Named { name, args } => (name.with_arity(args.len()), args.len()),
            TypeRef::Array { rank, .. } => (
                QualifiedName::new("Array", vec!["System".into()]),
                usize::from(*rank).saturating_sub(1),
            ),
            TypeRef::Pointer(_) => (QualifiedName::global("Pointer"), 0),
            TypeRef::Void => (QualifiedName::new("Void", vec!["System".into()]), 0),
            TypeRef::GenericParam(p) => (QualifiedName::global(p.clone()), 0),
        };
        let primitive = type_ref.as_primitive();
        Self {
            type_ref,
            name,
            arity,
            kind,
            primitive,
        }
    }

    /// `System.Void`.
    pub fn void() -> Self {
        Self::new(TypeRef::Void, TypeKind::None)
    }

    /// Record the underlying primitive (enums).
    pub fn with_primitive(mut self, primitive: PrimitiveKind) -> Self {
        self.primitive = Some(primitive);
        self
    }

    /// Display name with generic arguments, e.g. `System.Collections.Generic.List<System.Int32>`.
    pub fn full_name(&self) -> String {
        self.type_ref.to_string()
    }

    /// Generated-symbol prefix for members of this type.
    pub fn symbol_prefix(&self) -> String {
        self.type_ref.symbol_fragment()
    }

    pub fn type_hash(&self) -> TypeHash {
        self.type_ref.type_hash()
    }

    pub fn is_void(&self) -> bool {
        self.kind == TypeKind::None
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_ref)
    }
}

/// What a bound member does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Constructor,
    Method,
    PropertyGet,
    PropertySet,
    FieldGet,
    FieldSet,
    EventAdd,
    EventRemove,
    Operator(Operator),
    /// Value -> `System.Object` handle.
    Box,
    /// `System.Object` handle -> value.
    Unbox,
    ArrayConstructor,
    ArrayLength,
    ArrayGetLength,
    ArrayGetItem,
    ArraySetItem,
    DelegateInvoke,
    DelegateAdd,
    DelegateRemove,
}

impl MemberKind {
    /// Fragment used in generated symbol names.
    pub const fn tag(self) -> &'static str {
        match self {
            MemberKind::Constructor => "Constructor",
            MemberKind::Method => "Method",
            MemberKind::PropertyGet => "PropertyGet",
            MemberKind::PropertySet => "PropertySet",
            MemberKind::FieldGet => "FieldGet",
            MemberKind::FieldSet => "FieldSet",
            MemberKind::EventAdd => "EventAdd",
            MemberKind::EventRemove => "EventRemove",
            MemberKind::Operator(_) => "Operator",
            MemberKind::Box => "Box",
            MemberKind::Unbox => "Unbox",
            MemberKind::ArrayConstructor => "Constructor",
            MemberKind::ArrayLength => "GetLength",
            MemberKind::ArrayGetLength => "GetLengthDimension",
            MemberKind::ArrayGetItem => "GetItem",
            MemberKind::ArraySetItem => "SetItem",
            MemberKind::DelegateInvoke => "Invoke",
            MemberKind::DelegateAdd => "Add",
            MemberKind::DelegateRemove => "Remove",
        }
    }

    pub const fn is_constructor(self) -> bool {
        matches!(self, MemberKind::Constructor | MemberKind::ArrayConstructor)
    }

    pub const fn is_accessor(self) -> bool {
        matches!(
            self,
            MemberKind::PropertyGet
                | MemberKind::PropertySet
                | MemberKind::FieldGet
                | MemberKind::FieldSet
        )
    }

    pub const fn is_event(self) -> bool {
        matches!(self, MemberKind::EventAdd | MemberKind::EventRemove)
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberKind::Operator(op) => write!(f, "operator {}", op.symbol()),
            other => f.write_str(other.tag()),
        }
    }
}

bitflags! {
    /// Parameter passing modes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ParamFlags: u8 {
        /// Read-only reference (`in`).
        const IN = 1 << 0;
        /// Written by the callee (`out`).
        const OUT = 1 << 1;
        /// Read and written by the callee (`ref`).
        const REF = 1 << 2;
        /// Trailing variadic array (`params`).
        const PARAMS = 1 << 3;
    }
}

impl ParamFlags {
    /// The argument crosses the boundary as a pointer to the value.
    pub fn is_by_ref(self) -> bool {
        self.intersects(ParamFlags::OUT | ParamFlags::REF)
    }
}

/// Default value of an optional parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DefaultValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(OrderedFloat<f64>),
    Char(u16),
    String(String),
    EnumMember { enum_type: QualifiedName, member: String },
    /// `default(T)` of a value type. Cannot be expressed on the native side.
    ValueTypeDefault(QualifiedName),
}

impl DefaultValue {
    /// Whether this default can be rendered for a parameter of `kind`.
    pub fn is_supported_for(&self, kind: TypeKind) -> bool {
        match self {
            DefaultValue::Null => kind.is_handle() || kind == TypeKind::Pointer,
            DefaultValue::Bool(_)
            | DefaultValue::Int(_)
            | DefaultValue::UInt(_)
            | DefaultValue::Float(_)
            | DefaultValue::Char(_) => kind == TypeKind::Primitive,
            DefaultValue::String(_) => kind == TypeKind::Reference,
            DefaultValue::EnumMember { .. } => kind == TypeKind::Enum,
            DefaultValue::ValueTypeDefault(_) => false,
        }
    }
}

impl fmt::Display for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Null => f.write_str("null"),
            DefaultValue::Bool(b) => write!(f, "{b}"),
            DefaultValue::Int(i) => write!(f, "{i}"),
            DefaultValue::UInt(u) => write!(f, "{u}"),
            DefaultValue::Float(v) => write!(f, "{}", v.into_inner()),
            DefaultValue::Char(c) => write!(f, "'\\u{c:04x}'"),
            DefaultValue::String(s) => write!(f, "{s:?}"),
            DefaultValue::EnumMember { enum_type, member } => write!(f, "{enum_type}.{member}"),
            DefaultValue::ValueTypeDefault(ty) => write!(f, "default({ty})"),
        }
    }
}

/// A classified parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamDescriptor {
    pub name: String,
    pub ty: TypeDescriptor,
    pub flags: ParamFlags,
    pub default: Option<DefaultValue>,
}

impl ParamDescriptor {
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            ty,
            flags: ParamFlags::empty(),
            default: None,
        }
    }

    pub fn with_flags(mut self, flags: ParamFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }
}

/// One exposed member, fully resolved and classified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberDescriptor {
    pub kind: MemberKind,
    /// The (closed) owning type.
    pub owner: TypeDescriptor,
    /// Managed member name; empty for constructors, boxing and arrays.
    pub name: String,
    pub params: Vec<ParamDescriptor>,
    pub return_type: TypeDescriptor,
    /// Exception types the binding spec declares this member may throw, caught first.
    pub exceptions: Vec<QualifiedName>,
    /// Generic method instantiation arguments.
    pub generic_args: Vec<TypeRef>,
    pub is_static: bool,
    /// Member can be overridden (virtual, abstract or an interface member).
    pub is_virtual: bool,
}

impl MemberDescriptor {
    pub fn new(kind: MemberKind, owner: TypeDescriptor, name: impl Into<String>) -> Self {
        Self {
            kind,
            owner,
            name: name.into(),
            params: Vec::new(),
            return_type: TypeDescriptor::void(),
            exceptions: Vec::new(),
            generic_args: Vec::new(),
            is_static: false,
            is_virtual: false,
        }
    }

    pub fn with_param(mut self, param: ParamDescriptor) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_return(mut self, ty: TypeDescriptor) -> Self {
        self.return_type = ty;
        self
    }

    pub fn with_exceptions(mut self, exceptions: Vec<QualifiedName>) -> Self {
        self.exceptions = exceptions;
        self
    }

    pub fn with_generic_args(mut self, args: Vec<TypeRef>) -> Self {
        self.generic_args = args;
        self
    }

    pub fn as_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn as_virtual(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    /// The operator this member implements, if any.
    pub fn operator(&self) -> Option<Operator> {
        match self.kind {
            MemberKind::Operator(op) => Some(op),
            _ => None,
        }
    }

    /// Whether the managed trampoline receives a `this` argument.
    pub fn has_this(&self) -> bool {
        !self.is_static
            && !self.kind.is_constructor()
            && !matches!(self.kind, MemberKind::Operator(_) | MemberKind::Box)
    }

    /// Fully qualified signature, used in diagnostics.
    ///
    /// `MyGame.Calc.Add(System.Int32, System.Int32)`
    pub fn signature(&self) -> String {
        let mut out = format!("{}.", self.owner.full_name());
        match self.kind {
            MemberKind::Constructor | MemberKind::ArrayConstructor => out.push_str(".ctor"),
            MemberKind::PropertyGet | MemberKind::FieldGet => {
                out.push_str("get_");
                out.push_str(&self.name);
            }
            MemberKind::PropertySet | MemberKind::FieldSet => {
                out.push_str("set_");
                out.push_str(&self.name);
            }
            MemberKind::EventAdd => {
                out.push_str("add_");
                out.push_str(&self.name);
            }
            MemberKind::EventRemove => {
                out.push_str("remove_");
                out.push_str(&self.name);
            }
            MemberKind::Method | MemberKind::Operator(_) => out.push_str(&self.name),
            other => out.push_str(other.tag()),
        }
        if !self.generic_args.is_empty() {
            out.push('<');
            out.push_str(&join_types(self.generic_args.iter()));
            out.push('>');
        }
        out.push('(');
        out.push_str(&join_types(self.params.iter().map(|p| &p.ty.type_ref)));
        out.push(')');
        out
    }

    /// Deterministic identity of the member.
    pub fn member_hash(&self) -> TypeHash {
        let params: Vec<TypeHash> = self
            .generic_args
            .iter()
            .chain(self.params.iter().map(|p| &p.ty.type_ref))
            .map(TypeRef::type_hash)
            .collect();
        if self.kind.is_constructor() {
            TypeHash::from_constructor(self.owner.type_hash(), &params)
        } else {
            let name = format!("{}{}", self.kind.tag(), self.name);
            TypeHash::from_member(self.owner.type_hash(), &name, &params)
        }
    }
}

fn join_types<'a>(types: impl Iterator<Item = &'a TypeRef>) -> String {
    types.map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int() -> TypeDescriptor {
        TypeDescriptor::new(TypeRef::primitive(PrimitiveKind::Int32), TypeKind::Primitive)
    }

    fn calc() -> TypeDescriptor {
        TypeDescriptor::new(TypeRef::named("MyGame.Calc"), TypeKind::Reference)
    }

    #[test]
    fn descriptor_names() {
        let list = TypeDescriptor::new(
            TypeRef::parse("System.Collections.Generic.List<int>").unwrap(),
            TypeKind::Reference,
        );
        assert_eq!(list.name.to_string(), "System.Collections.Generic.List`1");
        assert_eq!(list.arity, 1);
        assert_eq!(list.full_name(), "System.Collections.Generic.List<System.Int32>");
        assert_eq!(int().primitive, Some(PrimitiveKind::Int32));
    }

    #[test]
    fn signature_text() {
        let add = MemberDescriptor::new(MemberKind::Method, calc(), "Add")
            .with_param(ParamDescriptor::new("a", int()))
            .with_param(ParamDescriptor::new("b", int()))
            .with_return(int());
        assert_eq!(add.signature(), "MyGame.Calc.Add(System.Int32, System.Int32)");

        let ctor = MemberDescriptor::new(MemberKind::Constructor, calc(), "");
        assert_eq!(ctor.signature(), "MyGame.Calc..ctor()");

        let getter = MemberDescriptor::new(MemberKind::PropertyGet, calc(), "Total");
        assert_eq!(getter.signature(), "MyGame.Calc.get_Total()");
    }

    #[test]
    fn this_argument() {
        let method = MemberDescriptor::new(MemberKind::Method, calc(), "Add");
        assert!(method.has_this());
        assert!(!method.clone().as_static().has_this());
        let op = MemberDescriptor::new(MemberKind::Operator(Operator::Addition), calc(), "op_Addition");
        assert!(!op.has_this());
        assert!(!MemberDescriptor::new(MemberKind::Constructor, calc(), "").has_this());
    }

    #[test]
    fn member_hash_distinguishes_overloads() {
        let a = MemberDescriptor::new(MemberKind::Method, calc(), "Add")
            .with_param(ParamDescriptor::new("a", int()));
        let b = MemberDescriptor::new(MemberKind::Method, calc(), "Add");
        assert_ne!(a.member_hash(), b.member_hash());
        assert_eq!(a.member_hash(), a.clone().member_hash());
    }

    #[test]
    fn param_flags() {
        assert!(ParamFlags::OUT.is_by_ref());
        assert!(ParamFlags::REF.is_by_ref());
        assert!(!ParamFlags::IN.is_by_ref());
    }

    #[test]
    fn default_support() {
        assert!(DefaultValue::Int(3).is_supported_for(TypeKind::Primitive));
        assert!(DefaultValue::Null.is_supported_for(TypeKind::Reference));
        assert!(!DefaultValue::Null.is_supported_for(TypeKind::Primitive));
        assert!(
            !DefaultValue::ValueTypeDefault("MyGame.Vec".into())
                .is_supported_for(TypeKind::FullValueType)
        );
    }
}
