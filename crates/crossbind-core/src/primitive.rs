//! Primitive kinds that cross the boundary as raw fixed-width values.

use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Built-in primitive types of the managed runtime.
///
/// Each primitive has a managed spelling (`System.Int32`), a managed keyword
/// (`int`) and a native Rust spelling (`i32`). The discriminant doubles as the
/// wire tag used by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum PrimitiveKind {
    Boolean = 1,
    SByte = 2,
    Byte = 3,
    Int16 = 4,
    UInt16 = 5,
    Int32 = 6,
    UInt32 = 7,
    Int64 = 8,
    UInt64 = 9,
    /// UTF-16 code unit
    Char = 10,
    Single = 11,
    Double = 12,
    IntPtr = 13,
    UIntPtr = 14,
}

impl PrimitiveKind {
    /// Every primitive, in wire-tag order.
    pub const ALL: [PrimitiveKind; 14] = [
        PrimitiveKind::Boolean,
        PrimitiveKind::SByte,
        PrimitiveKind::Byte,
        PrimitiveKind::Int16,
        PrimitiveKind::UInt16,
        PrimitiveKind::Int32,
        PrimitiveKind::UInt32,
        PrimitiveKind::Int64,
        PrimitiveKind::UInt64,
        PrimitiveKind::Char,
        PrimitiveKind::Single,
        PrimitiveKind::Double,
        PrimitiveKind::IntPtr,
        PrimitiveKind::UIntPtr,
    ];

    /// Simple name inside the `System` namespace.
    pub const fn system_name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "Boolean",
            PrimitiveKind::SByte => "SByte",
            PrimitiveKind::Byte => "Byte",
            PrimitiveKind::Int16 => "Int16",
            PrimitiveKind::UInt16 => "UInt16",
            PrimitiveKind::Int32 => "Int32",
            PrimitiveKind::UInt32 => "UInt32",
            PrimitiveKind::Int64 => "Int64",
            PrimitiveKind::UInt64 => "UInt64",
            PrimitiveKind::Char => "Char",
            PrimitiveKind::Single => "Single",
            PrimitiveKind::Double => "Double",
            PrimitiveKind::IntPtr => "IntPtr",
            PrimitiveKind::UIntPtr => "UIntPtr",
        }
    }

    /// Managed language keyword.
    pub const fn keyword(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "bool",
            PrimitiveKind::SByte => "sbyte",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Int16 => "short",
            PrimitiveKind::UInt16 => "ushort",
            PrimitiveKind::Int32 => "int",
            PrimitiveKind::UInt32 => "uint",
            PrimitiveKind::Int64 => "long",
            PrimitiveKind::UInt64 => "ulong",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Single => "float",
            PrimitiveKind::Double => "double",
            PrimitiveKind::IntPtr => "System.IntPtr",
            PrimitiveKind::UIntPtr => "System.UIntPtr",
        }
    }

    /// Native Rust spelling.
    pub const fn native_name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "bool",
            PrimitiveKind::SByte => "i8",
            PrimitiveKind::Byte => "u8",
            PrimitiveKind::Int16 => "i16",
            PrimitiveKind::UInt16 => "u16",
            PrimitiveKind::Int32 => "i32",
            PrimitiveKind::UInt32 => "u32",
            PrimitiveKind::Int64 => "i64",
            PrimitiveKind::UInt64 => "u64",
            PrimitiveKind::Char => "u16",
            PrimitiveKind::Single => "f32",
            PrimitiveKind::Double => "f64",
            PrimitiveKind::IntPtr => "isize",
            PrimitiveKind::UIntPtr => "usize",
        }
    }

    /// Size in bytes on the wire. Pointer-sized kinds report the host width.
    pub const fn size(self) -> usize {
        match self {
            PrimitiveKind::Boolean | PrimitiveKind::SByte | PrimitiveKind::Byte => 1,
            PrimitiveKind::Int16 | PrimitiveKind::UInt16 | PrimitiveKind::Char => 2,
            PrimitiveKind::Int32 | PrimitiveKind::UInt32 | PrimitiveKind::Single => 4,
            PrimitiveKind::Int64 | PrimitiveKind::UInt64 | PrimitiveKind::Double => 8,
            PrimitiveKind::IntPtr | PrimitiveKind::UIntPtr => std::mem::size_of::<usize>(),
        }
    }

    /// Whether the kind is an integral type (enum underlying types must be).
    pub const fn is_integral(self) -> bool {
        !matches!(
            self,
            PrimitiveKind::Boolean | PrimitiveKind::Single | PrimitiveKind::Double
        )
    }

    /// Look up a primitive by its qualified (`System.Int32`), simple (`Int32`)
    /// or keyword (`int`) spelling.
    pub fn from_name(name: &str) -> Option<Self> {
        let simple = name.strip_prefix("System.").unwrap_or(name);
        PrimitiveKind::ALL
            .into_iter()
            .find(|p| p.system_name() == simple || p.keyword() == name)
    }

    /// Fully qualified managed name.
    pub fn qualified_name(self) -> String {
        format!("System.{}", self.system_name())
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "System.{}", self.system_name())
    }
}
