//! Binding IR.
//!
//! A [`BindingPlan`] is the lowered, indexed form of a scan: every member has
//! its symbol and its position in the function table, and every parameter
//! knows how it crosses the wire. Both renderers and the hosted executor
//! consume the same plan, so they cannot disagree on order or naming.

use crossbind_core::{
    Diagnostics, MemberDescriptor, ParamDescriptor, PrimitiveKind, TypeDescriptor, TypeKind,
    TypeRef,
};

use crate::scan::{MirrorField, TypeRole};

/// How a value crosses the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WireType {
    Void,
    /// A fixed-width primitive; enums travel as their underlying primitive.
    Primitive(PrimitiveKind),
    /// A full value type copied field by field.
    Struct(TypeRef),
    /// A reference type or managed value type.
    Handle,
    /// An unmanaged pointer.
    Pointer,
}

impl WireType {
    /// The wire shape of a classified type.
    pub fn of(ty: &TypeDescriptor) -> Self {
        match ty.kind {
            TypeKind::None => WireType::Void,
            TypeKind::Pointer => WireType::Pointer,
            TypeKind::Primitive | TypeKind::Enum => {
                WireType::Primitive(ty.primitive.unwrap_or(PrimitiveKind::Int32))
            }
            TypeKind::FullValueType => WireType::Struct(ty.type_ref.clone()),
            TypeKind::ManagedValueType | TypeKind::Reference => WireType::Handle,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, WireType::Void)
    }

    pub fn is_handle(&self) -> bool {
        matches!(self, WireType::Handle)
    }
}

/// A lowered parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireParam {
    pub descriptor: ParamDescriptor,
    pub wire: WireType,
    /// `out`/`ref` parameters travel by reference.
    pub by_ref: bool,
}

impl WireParam {
    pub fn new(descriptor: ParamDescriptor) -> Self {
        Self {
            wire: WireType::of(&descriptor.ty),
            by_ref: descriptor.flags.is_by_ref(),
            descriptor,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

/// One managed trampoline, called from native code through the function table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberBinding {
    /// Position in the function table.
    pub index: usize,
    pub symbol: String,
    pub descriptor: MemberDescriptor,
    /// Wire shape of the receiver; `None` for static members and constructors.
    pub this: Option<WireType>,
    pub params: Vec<WireParam>,
    pub ret: WireType,
}

/// A native-invoke export, called from managed code by symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeInvokeBinding {
    pub symbol: String,
    pub descriptor: MemberDescriptor,
    pub params: Vec<WireParam>,
    pub ret: WireType,
}

/// A field of a full value type's mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBinding {
    pub name: String,
    pub ty: TypeDescriptor,
    pub wire: WireType,
}

impl From<MirrorField> for FieldBinding {
    fn from(field: MirrorField) -> Self {
        Self {
            wire: WireType::of(&field.ty),
            name: field.name,
            ty: field.ty,
        }
    }
}

/// A bound type and its trampolines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeBinding {
    pub descriptor: TypeDescriptor,
    pub role: TypeRole,
    pub capacity: u32,
    pub fields: Vec<FieldBinding>,
    pub enum_values: Vec<(String, i64)>,
    pub members: Vec<MemberBinding>,
    /// Delegates only: the export that lets a native function be the target.
    pub native_invoke: Option<NativeInvokeBinding>,
}

impl TypeBinding {
    pub fn full_name(&self) -> String {
        self.descriptor.full_name()
    }

    /// Whether native proxies of this type own a handle.
    pub fn has_proxy(&self) -> bool {
        self.descriptor.kind.is_handle()
    }
}

/// A base type and its generated stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseTypeBinding {
    pub base: TypeDescriptor,
    pub stub: TypeDescriptor,
    pub is_interface: bool,
    pub capacity: u32,
    /// Stub constructors; these are function-table members.
    pub constructors: Vec<MemberBinding>,
    /// One export per overridable member.
    pub overrides: Vec<NativeInvokeBinding>,
    /// Export that releases the native subclass instance.
    pub release_symbol: String,
}

/// Everything the renderers and the hosted executor need.
#[derive(Debug, Clone, Default)]
pub struct BindingPlan {
    pub types: Vec<TypeBinding>,
    pub base_types: Vec<BaseTypeBinding>,
    pub diagnostics: Diagnostics,
}

impl BindingPlan {
    /// All function-table members in generation order.
    pub fn members(&self) -> impl Iterator<Item = &MemberBinding> {
        self.types
            .iter()
            .flat_map(|t| t.members.iter())
            .chain(self.base_types.iter().flat_map(|b| b.constructors.iter()))
    }

    pub fn member_count(&self) -> usize {
        self.members().count()
    }

    /// Member symbols in handshake order. They follow the capacity and the two
    /// fixed callbacks.
    pub fn handshake_symbols(&self) -> Vec<&str> {
        self.members().map(|m| m.symbol.as_str()).collect()
    }

    /// Every native-invoke export: delegate targets, overrides, releases.
    pub fn native_invokes(&self) -> impl Iterator<Item = &NativeInvokeBinding> {
        self.types
            .iter()
            .filter_map(|t| t.native_invoke.as_ref())
            .chain(self.base_types.iter().flat_map(|b| b.overrides.iter()))
    }

    /// Export symbols, sorted.
    pub fn export_symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self
            .native_invokes()
            .map(|n| n.symbol.as_str())
            .chain(self.base_types.iter().map(|b| b.release_symbol.as_str()))
            .collect();
        symbols.sort_unstable();
        symbols
    }

    pub fn find_member(&self, symbol: &str) -> Option<&MemberBinding> {
        self.members().find(|m| m.symbol == symbol)
    }

    pub fn find_type(&self, full_name: &str) -> Option<&TypeBinding> {
        self.types.iter().find(|t| t.full_name() == full_name)
    }

    pub fn find_base_type(&self, full_name: &str) -> Option<&BaseTypeBinding> {
        self.base_types
            .iter()
            .find(|b| b.base.full_name() == full_name || b.stub.full_name() == full_name)
    }

    /// Size of the managed object store: the sum of every handle-owning
    /// type's capacity, at least 1.
    pub fn store_capacity(&self) -> u32 {
        let types = self
            .types
            .iter()
            .filter(|t| t.has_proxy())
            .map(|t| t.capacity);
        let bases = self.base_types.iter().map(|b| b.capacity);
        types.chain(bases).fold(0u32, u32::saturating_add).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(kind: TypeKind, ty: TypeRef) -> TypeDescriptor {
        TypeDescriptor::new(ty, kind)
    }

    #[test]
    fn wire_types() {
        let int = descriptor(TypeKind::Primitive, TypeRef::primitive(PrimitiveKind::Int32));
        assert_eq!(WireType::of(&int), WireType::Primitive(PrimitiveKind::Int32));

        let mode = descriptor(TypeKind::Enum, TypeRef::named("MyGame.Mode"))
            .with_primitive(PrimitiveKind::Byte);
        assert_eq!(WireType::of(&mode), WireType::Primitive(PrimitiveKind::Byte));

        let vec = descriptor(TypeKind::FullValueType, TypeRef::named("MyGame.Vec2"));
        assert!(matches!(WireType::of(&vec), WireType::Struct(_)));

        let calc = descriptor(TypeKind::Reference, TypeRef::named("MyGame.Calc"));
        assert!(WireType::of(&calc).is_handle());
        assert!(WireType::of(&TypeDescriptor::void()).is_void());
    }

    #[test]
    fn empty_plan_has_minimum_capacity() {
        let plan = BindingPlan::default();
        assert_eq!(plan.store_capacity(), 1);
        assert!(plan.handshake_symbols().is_empty());
    }
}
