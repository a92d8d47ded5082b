//! Marshaling category of a type.

// `num_enum` derive output refers to `Self::Primitive`, which collides with
// the `Primitive` variant; the derive resolves to the associated type.
#![allow(ambiguous_associated_items)]

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Marshaling category assigned by the type classifier.
///
/// This is the single source of truth for how a value of the type crosses
/// the boundary: as a raw value, as a copied mirror struct, or as an integer
/// handle into the managed object store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum TypeKind {
    /// `void`; only valid as a return type.
    None = 0,
    /// Unmanaged pointer, passed through untouched.
    Pointer = 1,
    /// Enum; crosses as its underlying primitive.
    Enum = 2,
    /// Fixed-width primitive.
    Primitive = 3,
    /// Value type whose fields are all, transitively, public full value
    /// types or primitives. Copied by value; a native mirror struct exists.
    FullValueType = 4,
    /// Value type with at least one field that cannot be mirrored. Stays
    /// resident on the managed side, accessed by reference-counted handle.
    ManagedValueType = 5,
    /// Class, interface, array, delegate or string. Accessed by handle.
    Reference = 6,
}

impl TypeKind {
    /// Values of this kind cross the boundary as a handle.
    pub const fn is_handle(self) -> bool {
        matches!(self, TypeKind::Reference | TypeKind::ManagedValueType)
    }

    /// Values of this kind cross the boundary by value.
    pub const fn is_by_value(self) -> bool {
        matches!(
            self,
            TypeKind::Enum | TypeKind::Primitive | TypeKind::FullValueType | TypeKind::Pointer
        )
    }

    /// Native proxies of this kind share a handle and need reference counts.
    pub const fn needs_ref_count(self) -> bool {
        matches!(self, TypeKind::ManagedValueType)
    }

    /// Value types in the managed sense (copy semantics on the managed side).
    pub const fn is_value_type(self) -> bool {
        matches!(
            self,
            TypeKind::Enum
                | TypeKind::Primitive
                | TypeKind::FullValueType
                | TypeKind::ManagedValueType
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            TypeKind::None => "none",
            TypeKind::Pointer => "pointer",
            TypeKind::Enum => "enum",
            TypeKind::Primitive => "primitive",
            TypeKind::FullValueType => "full value type",
            TypeKind::ManagedValueType => "managed value type",
            TypeKind::Reference => "reference",
        }
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
