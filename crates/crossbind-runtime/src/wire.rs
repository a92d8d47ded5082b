//! Values in the wire shape.
//!
//! Trampolines only ever exchange fixed-width primitives, copies of full
//! value types and integer handles. [`WireValue`] is that shape as a Rust
//! value; [`RawWire`] is its `#[repr(C)]` encoding for scalars.

use std::cell::RefCell;
use std::rc::Rc;

use crossbind_core::PrimitiveKind;

use crate::{Handle, RuntimeError};

/// A value crossing the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    Void,
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    /// UTF-16 code unit.
    Char(u16),
    F32(f32),
    F64(f64),
    IntPtr(isize),
    UIntPtr(usize),
    /// Reference type or managed value type.
    Handle(Handle),
    /// Unmanaged pointer, passed through untouched.
    Pointer(usize),
    /// Full value type, fields in declaration order.
    Struct(Vec<WireValue>),
    /// `out`/`ref` argument: the callee writes through the cell.
    Ref(Rc<RefCell<WireValue>>),
    /// UTF-8 buffer handed to the string construction callback.
    Utf8(Rc<str>),
}

impl WireValue {
    /// Zero value of a primitive.
    pub fn zero(kind: PrimitiveKind) -> Self {
        match kind {
            PrimitiveKind::Boolean => WireValue::Bool(false),
            PrimitiveKind::SByte => WireValue::I8(0),
            PrimitiveKind::Byte => WireValue::U8(0),
            PrimitiveKind::Int16 => WireValue::I16(0),
            PrimitiveKind::UInt16 => WireValue::U16(0),
            PrimitiveKind::Int32 => WireValue::I32(0),
            PrimitiveKind::UInt32 => WireValue::U32(0),
            PrimitiveKind::Int64 => WireValue::I64(0),
            PrimitiveKind::UInt64 => WireValue::U64(0),
            PrimitiveKind::Char => WireValue::Char(0),
            PrimitiveKind::Single => WireValue::F32(0.0),
            PrimitiveKind::Double => WireValue::F64(0.0),
            PrimitiveKind::IntPtr => WireValue::IntPtr(0),
            PrimitiveKind::UIntPtr => WireValue::UIntPtr(0),
        }
    }

    /// A fresh `out`/`ref` cell holding `initial`.
    pub fn new_ref(initial: WireValue) -> Self {
        WireValue::Ref(Rc::new(RefCell::new(initial)))
    }

    /// The primitive this value carries, if it is one.
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        Some(match self {
            WireValue::Bool(_) => PrimitiveKind::Boolean,
            WireValue::I8(_) => PrimitiveKind::SByte,
            WireValue::U8(_) => PrimitiveKind::Byte,
            WireValue::I16(_) => PrimitiveKind::Int16,
            WireValue::U16(_) => PrimitiveKind::UInt16,
            WireValue::I32(_) => PrimitiveKind::Int32,
            WireValue::U32(_) => PrimitiveKind::UInt32,
            WireValue::I64(_) => PrimitiveKind::Int64,
            WireValue::U64(_) => PrimitiveKind::UInt64,
            WireValue::Char(_) => PrimitiveKind::Char,
            WireValue::F32(_) => PrimitiveKind::Single,
            WireValue::F64(_) => PrimitiveKind::Double,
            WireValue::IntPtr(_) => PrimitiveKind::IntPtr,
            WireValue::UIntPtr(_) => PrimitiveKind::UIntPtr,
            _ => return None,
        })
    }

    /// Short name of the variant, for error messages.
    pub fn shape_name(&self) -> String {
        match self {
            WireValue::Void => "void".to_string(),
            WireValue::Handle(_) => "handle".to_string(),
            WireValue::Pointer(_) => "pointer".to_string(),
            WireValue::Struct(fields) => format!("struct of {} fields", fields.len()),
            WireValue::Ref(_) => "ref cell".to_string(),
            WireValue::Utf8(_) => "utf-8 buffer".to_string(),
            other => other
                .primitive_kind()
                .map_or_else(|| "value".to_string(), |k| k.to_string()),
        }
    }

    fn mismatch(&self, expected: impl Into<String>) -> RuntimeError {
        RuntimeError::WireMismatch {
            expected: expected.into(),
            found: self.shape_name(),
        }
    }

    pub fn as_handle(&self) -> Result<Handle, RuntimeError> {
        match self {
            WireValue::Handle(h) => Ok(*h),
            other => Err(other.mismatch("handle")),
        }
    }

    pub fn as_struct(&self) -> Result<&[WireValue], RuntimeError> {
        match self {
            WireValue::Struct(fields) => Ok(fields),
            other => Err(other.mismatch("struct")),
        }
    }

    pub fn as_utf8(&self) -> Result<&str, RuntimeError> {
        match self {
            WireValue::Utf8(s) => Ok(s),
            other => Err(other.mismatch("utf-8 buffer")),
        }
    }

    pub fn as_char(&self) -> Result<u16, RuntimeError> {
        match self {
            WireValue::Char(c) => Ok(*c),
            other => Err(other.mismatch("System.Char")),
        }
    }

    pub fn as_pointer(&self) -> Result<usize, RuntimeError> {
        match self {
            WireValue::Pointer(p) => Ok(*p),
            other => Err(other.mismatch("pointer")),
        }
    }

    /// Current content of an `out`/`ref` cell.
    pub fn read_ref(&self) -> Result<WireValue, RuntimeError> {
        match self {
            WireValue::Ref(cell) => Ok(cell.borrow().clone()),
            other => Err(other.mismatch("ref cell")),
        }
    }

    /// Write through an `out`/`ref` cell.
    pub fn write_ref(&self, value: WireValue) -> Result<(), RuntimeError> {
        match self {
            WireValue::Ref(cell) => {
                *cell.borrow_mut() = value;
                Ok(())
            }
            other => Err(other.mismatch("ref cell")),
        }
    }

    /// Integral value widened to `i64`. Accepts every integral primitive, used
    /// for enums whose underlying type varies.
    pub fn as_i64_lossy(&self) -> Result<i64, RuntimeError> {
        Ok(match self {
            WireValue::I8(v) => i64::from(*v),
            WireValue::U8(v) => i64::from(*v),
            WireValue::I16(v) => i64::from(*v),
            WireValue::U16(v) | WireValue::Char(v) => i64::from(*v),
            WireValue::I32(v) => i64::from(*v),
            WireValue::U32(v) => i64::from(*v),
            WireValue::I64(v) => *v,
            WireValue::U64(v) => *v as i64,
            WireValue::IntPtr(v) => *v as i64,
            WireValue::UIntPtr(v) => *v as i64,
            other => return Err(other.mismatch("integral value")),
        })
    }

    /// Encode a scalar for the C ABI.
    pub fn encode(&self) -> Option<RawWire> {
        let (tag, bits): (u8, u64) = match self {
            WireValue::Void => (RawWire::VOID, 0),
            WireValue::Handle(h) => (RawWire::HANDLE, u64::from(h.raw())),
            WireValue::Pointer(p) => (RawWire::POINTER, *p as u64),
            WireValue::Bool(v) => (PrimitiveKind::Boolean.into(), u64::from(*v)),
            WireValue::I8(v) => (PrimitiveKind::SByte.into(), *v as u64),
            WireValue::U8(v) => (PrimitiveKind::Byte.into(), u64::from(*v)),
            WireValue::I16(v) => (PrimitiveKind::Int16.into(), *v as u64),
            WireValue::U16(v) => (PrimitiveKind::UInt16.into(), u64::from(*v)),
            WireValue::I32(v) => (PrimitiveKind::Int32.into(), *v as u64),
            WireValue::U32(v) => (PrimitiveKind::UInt32.into(), u64::from(*v)),
            WireValue::I64(v) => (PrimitiveKind::Int64.into(), *v as u64),
            WireValue::U64(v) => (PrimitiveKind::UInt64.into(), *v),
            WireValue::Char(v) => (PrimitiveKind::Char.into(), u64::from(*v)),
            WireValue::F32(v) => (PrimitiveKind::Single.into(), u64::from(v.to_bits())),
            WireValue::F64(v) => (PrimitiveKind::Double.into(), v.to_bits()),
            WireValue::IntPtr(v) => (PrimitiveKind::IntPtr.into(), *v as u64),
            WireValue::UIntPtr(v) => (PrimitiveKind::UIntPtr.into(), *v as u64),
            WireValue::Struct(_) | WireValue::Ref(_) | WireValue::Utf8(_) => return None,
        };
        Some(RawWire { tag, bits })
    }

    /// Decode a scalar from its C ABI form.
    pub fn decode(raw: RawWire) -> Result<WireValue, RuntimeError> {
        let bits = raw.bits;
        match raw.tag {
            RawWire::VOID => return Ok(WireValue::Void),
            RawWire::HANDLE => return Ok(WireValue::Handle(Handle(bits as u32))),
            RawWire::POINTER => return Ok(WireValue::Pointer(bits as usize)),
            _ => {}
        }
        let kind = PrimitiveKind::try_from(raw.tag).map_err(|_| RuntimeError::WireMismatch {
            expected: "known wire tag".to_string(),
            found: format!("tag {}", raw.tag),
        })?;
        Ok(match kind {
            PrimitiveKind::Boolean => WireValue::Bool(bits != 0),
            PrimitiveKind::SByte => WireValue::I8(bits as i8),
            PrimitiveKind::Byte => WireValue::U8(bits as u8),
            PrimitiveKind::Int16 => WireValue::I16(bits as i16),
            PrimitiveKind::UInt16 => WireValue::U16(bits as u16),
            PrimitiveKind::Int32 => WireValue::I32(bits as i32),
            PrimitiveKind::UInt32 => WireValue::U32(bits as u32),
            PrimitiveKind::Int64 => WireValue::I64(bits as i64),
            PrimitiveKind::UInt64 => WireValue::U64(bits),
            PrimitiveKind::Char => WireValue::Char(bits as u16),
            PrimitiveKind::Single => WireValue::F32(f32::from_bits(bits as u32)),
            PrimitiveKind::Double => WireValue::F64(f64::from_bits(bits)),
            PrimitiveKind::IntPtr => WireValue::IntPtr(bits as isize),
            PrimitiveKind::UIntPtr => WireValue::UIntPtr(bits as usize),
        })
    }
}

/// Tagged scalar in its C ABI form. Primitive tags are the
/// [`PrimitiveKind`] discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct RawWire {
    pub tag: u8,
    pub bits: u64,
}

impl RawWire {
    pub const VOID: u8 = 0;
    pub const HANDLE: u8 = 0x20;
    pub const POINTER: u8 = 0x21;
}

impl From<Handle> for WireValue {
    fn from(handle: Handle) -> Self {
        WireValue::Handle(handle)
    }
}

impl From<()> for WireValue {
    fn from(_: ()) -> Self {
        WireValue::Void
    }
}

impl TryFrom<WireValue> for Handle {
    type Error = RuntimeError;

    fn try_from(value: WireValue) -> Result<Self, Self::Error> {
        value.as_handle()
    }
}

impl TryFrom<WireValue> for () {
    type Error = RuntimeError;

    fn try_from(value: WireValue) -> Result<Self, Self::Error> {
        match value {
            WireValue::Void => Ok(()),
            other => Err(other.mismatch("void")),
        }
    }
}

macro_rules! wire_primitive {
    ($($ty:ty => $variant:ident, $kind:ident;)*) => {
        $(
            impl From<$ty> for WireValue {
                fn from(value: $ty) -> Self {
                    WireValue::$variant(value)
                }
            }

            impl TryFrom<WireValue> for $ty {
                type Error = RuntimeError;

                fn try_from(value: WireValue) -> Result<Self, Self::Error> {
                    match value {
                        WireValue::$variant(v) => Ok(v),
                        other => Err(other.mismatch(PrimitiveKind::$kind.to_string())),
                    }
                }
            }
        )*
    };
}

wire_primitive! {
    bool => Bool, Boolean;
    i8 => I8, SByte;
    u8 => U8, Byte;
    i16 => I16, Int16;
    u16 => U16, UInt16;
    i32 => I32, Int32;
    u32 => U32, UInt32;
    i64 => I64, Int64;
    u64 => U64, UInt64;
    f32 => F32, Single;
    f64 => F64, Double;
    isize => IntPtr, IntPtr;
    usize => UIntPtr, UIntPtr;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_conversions() {
        let v: WireValue = 5i32.into();
        assert_eq!(i32::try_from(v.clone()).unwrap(), 5);
        assert!(matches!(
            f32::try_from(v),
            Err(RuntimeError::WireMismatch { .. })
        ));
    }

    #[test]
    fn raw_encoding_keeps_sign_and_bits() {
        for value in [
            WireValue::I32(-7),
            WireValue::F32(1.5),
            WireValue::F64(-0.25),
            WireValue::Char(0x263a),
            WireValue::Handle(Handle(9)),
            WireValue::Bool(true),
            WireValue::Void,
        ] {
            let raw = value.encode().unwrap();
            assert_eq!(WireValue::decode(raw).unwrap(), value);
        }
        assert!(WireValue::Struct(vec![]).encode().is_none());
    }

    #[test]
    fn unknown_tag_rejected() {
        assert!(WireValue::decode(RawWire { tag: 0x7f, bits: 0 }).is_err());
    }

    #[test]
    fn ref_cells() {
        let cell = WireValue::new_ref(WireValue::I32(1));
        cell.write_ref(WireValue::I32(2)).unwrap();
        assert_eq!(cell.read_ref().unwrap(), WireValue::I32(2));
        assert!(WireValue::I32(0).write_ref(WireValue::Void).is_err());
    }

    #[test]
    fn zero_values() {
        assert_eq!(WireValue::zero(PrimitiveKind::Int32), WireValue::I32(0));
        assert_eq!(
            WireValue::zero(PrimitiveKind::Double).primitive_kind(),
            Some(PrimitiveKind::Double)
        );
    }

    #[test]
    fn widening() {
        assert_eq!(WireValue::U8(200).as_i64_lossy().unwrap(), 200);
        assert_eq!(WireValue::I16(-3).as_i64_lossy().unwrap(), -3);
        assert!(WireValue::F32(1.0).as_i64_lossy().is_err());
    }
}
