//! Raw entry points.
//!
//! Over FFI the handshake carries bare function addresses. Each address is
//! paired with a [`RawInvoker`] that knows the entry's C signature: it decodes
//! the wire arguments, calls through the address and encodes the result, so
//! [`RuntimeContext::call`](crate::RuntimeContext::call) treats raw and
//! hosted entries alike.
//!
//! Generated native modules emit one invoker per member trampoline. The two
//! fixed callbacks have fixed signatures and use [`invoke_release_object`]
//! and [`invoke_string_new`].

use std::ffi::{CStr, CString, c_char};
use std::fmt;

use crate::{Handle, RuntimeError, WireValue};

/// Calls the function at an address with wire arguments.
///
/// # Safety
///
/// The address must be a function with exactly the C signature the invoker
/// calls through.
pub type RawInvoker = unsafe fn(usize, &[WireValue]) -> Result<WireValue, RuntimeError>;

/// A function address and the invoker for its signature.
#[derive(Clone, Copy)]
pub struct RawEntry {
    address: usize,
    invoke: RawInvoker,
}

impl RawEntry {
    /// # Safety
    ///
    /// `address` must stay a valid function with the signature `invoke`
    /// expects for as long as the entry is reachable from a context.
    pub unsafe fn new(address: usize, invoke: RawInvoker) -> Self {
        Self { address, invoke }
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn call(&self, args: &[WireValue]) -> Result<WireValue, RuntimeError> {
        // SAFETY: the pairing was vouched for in `RawEntry::new`.
        unsafe { (self.invoke)(self.address, args) }
    }
}

impl fmt::Debug for RawEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawEntry({:#x})", self.address)
    }
}

/// Argument `index`, for invokers.
pub fn raw_arg(args: &[WireValue], index: usize) -> Result<&WireValue, RuntimeError> {
    args.get(index).ok_or_else(|| RuntimeError::WireMismatch {
        expected: format!("argument {index}"),
        found: format!("{} arguments", args.len()),
    })
}

/// `void ReleaseObject(uint handle)`.
///
/// # Safety
///
/// `address` must be an `extern "C" fn(u32)`.
pub unsafe fn invoke_release_object(
    address: usize,
    args: &[WireValue],
) -> Result<WireValue, RuntimeError> {
    let handle = raw_arg(args, 0)?.as_handle()?;
    // SAFETY: guaranteed by the caller.
    let release = unsafe { std::mem::transmute::<usize, extern "C" fn(u32)>(address) };
    release(handle.raw());
    Ok(WireValue::Void)
}

/// `uint StringNew(IntPtr utf8)`: the managed side copies a NUL-terminated
/// UTF-8 buffer into a new string and returns its handle.
///
/// # Safety
///
/// `address` must be an `extern "C" fn(*const c_char) -> u32`.
pub unsafe fn invoke_string_new(
    address: usize,
    args: &[WireValue],
) -> Result<WireValue, RuntimeError> {
    let text = raw_arg(args, 0)?.as_utf8()?;
    let buffer = CString::new(text).map_err(|_| RuntimeError::WireMismatch {
        expected: "text without NUL bytes".to_string(),
        found: "interior NUL byte".to_string(),
    })?;
    // SAFETY: guaranteed by the caller.
    let string_new =
        unsafe { std::mem::transmute::<usize, extern "C" fn(*const c_char) -> u32>(address) };
    Ok(WireValue::Handle(Handle(string_new(buffer.as_ptr()))))
}

/// Text of a NUL-terminated UTF-8 buffer from the managed side. Null reads
/// as empty; invalid UTF-8 is replaced.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated buffer that stays valid
/// for the duration of the call.
pub unsafe fn c_str_lossy(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: guaranteed by the caller.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}
