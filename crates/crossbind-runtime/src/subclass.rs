//! Native subclasses of managed base types.
//!
//! A native subclass instance lives in the whole-object free list of its stub
//! type as a [`SubclassSlot`]. The slot owns the native overrides and the
//! link to the managed stub that forwards calls into them.
//!
//! Construction and destruction run in a fixed order:
//!
//! | step | construct                                   | destroy                              |
//! |------|---------------------------------------------|--------------------------------------|
//! | 1    | allocate the slot, get the native handle    | detach the managed link              |
//! | 2    | managed constructor creates the linked stub | dereference the managed handle       |
//! | 3    | reference the managed handle                | release the slot back to the list    |
//!
//! Destruction has two entry points. The native owner holds the slot itself
//! and calls [`destroy_subclass`], which does nothing unless that very slot is
//! still in the list: a handle freed by a managed `Dispose` may already belong
//! to a newer instance. The managed side only knows the native handle and
//! calls [`release_subclass`]; the stub is detached when its handle is
//! released, so it never names a slot it does not own.

use std::cell::Cell;
use std::rc::Rc;

use crate::{BridgeError, BridgeException, Handle, RuntimeContext, RuntimeError, WireValue};

/// Storage record of one native subclass instance.
pub struct SubclassSlot<T: ?Sized> {
    native: Cell<Handle>,
    managed: Cell<Handle>,
    overrides: Box<T>,
}

impl<T: ?Sized> std::fmt::Debug for SubclassSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubclassSlot")
            .field("native", &self.native.get())
            .field("managed", &self.managed.get())
            .finish_non_exhaustive()
    }
}

impl<T: ?Sized> SubclassSlot<T> {
    pub fn overrides(&self) -> &T {
        &self.overrides
    }

    /// Handle of the slot in its whole-object list.
    pub fn native(&self) -> Handle {
        self.native.get()
    }

    /// Handle of the linked managed stub; null once detached.
    pub fn managed(&self) -> Handle {
        self.managed.get()
    }
}

/// Run the three construction steps.
///
/// `construct` receives the native handle and calls the managed stub
/// constructor; its result must be the stub's handle. If it fails the slot is
/// released again and the error returned.
pub fn construct_subclass<T: ?Sized + 'static>(
    ctx: &RuntimeContext,
    type_name: &str,
    overrides: Box<T>,
    construct: impl FnOnce(Handle) -> Result<WireValue, BridgeError>,
) -> Result<Rc<SubclassSlot<T>>, BridgeError> {
    let slot = Rc::new(SubclassSlot {
        native: Cell::new(Handle::NULL),
        managed: Cell::new(Handle::NULL),
        overrides,
    });
    let native = ctx.allocate_object(type_name, slot.clone())?;
    slot.native.set(native);
    let managed = match construct(native).and_then(|r| Ok(r.as_handle()?)) {
        Ok(managed) => managed,
        Err(err) => {
            ctx.release_object_storage(type_name, native)?;
            return Err(err);
        }
    };
    slot.managed.set(managed);
    ctx.reference(type_name, managed)?;
    Ok(slot)
}

/// Destroy `slot` from its native owner. A slot no longer in the list, or
/// whose handle now holds another instance, is left alone.
pub fn destroy_subclass<T: ?Sized + 'static>(
    ctx: &RuntimeContext,
    type_name: &str,
    slot: &Rc<SubclassSlot<T>>,
) -> Result<(), BridgeError> {
    let owned = match lookup::<T>(ctx, type_name, slot.native())? {
        Some(current) => Rc::ptr_eq(&current, slot),
        None => false,
    };
    if owned {
        teardown(ctx, type_name, slot)?;
    }
    Ok(())
}

/// Destroy whatever instance `native` names, for the managed `Dispose`
/// export. A free slot is a no-op.
pub fn release_subclass<T: ?Sized + 'static>(
    ctx: &RuntimeContext,
    type_name: &str,
    native: Handle,
) -> Result<(), BridgeError> {
    match lookup::<T>(ctx, type_name, native)? {
        Some(slot) => teardown(ctx, type_name, &slot),
        None => Ok(()),
    }
}

fn teardown<T: ?Sized>(
    ctx: &RuntimeContext,
    type_name: &str,
    slot: &SubclassSlot<T>,
) -> Result<(), BridgeError> {
    let managed = slot.managed.replace(Handle::NULL);
    if !managed.is_null() {
        ctx.dereference(type_name, managed)?;
    }
    ctx.release_object_storage(type_name, slot.native())?;
    Ok(())
}

fn lookup<T: ?Sized + 'static>(
    ctx: &RuntimeContext,
    type_name: &str,
    native: Handle,
) -> Result<Option<Rc<SubclassSlot<T>>>, RuntimeError> {
    let Some(object) = ctx.object(type_name, native)? else {
        return Ok(None);
    };
    object
        .downcast::<SubclassSlot<T>>()
        .map(Some)
        .map_err(|_| RuntimeError::WireMismatch {
            expected: format!("{type_name} subclass slot"),
            found: "object of another type".to_string(),
        })
}

/// The slot behind `native`, for a native-invoke export. A missing or foreign
/// slot becomes a native exception relayed to the managed caller.
pub fn subclass_slot<T: ?Sized + 'static>(
    ctx: &RuntimeContext,
    type_name: &str,
    native: Handle,
) -> Result<Rc<SubclassSlot<T>>, BridgeException> {
    match lookup::<T>(ctx, type_name, native) {
        Ok(Some(slot)) => Ok(slot),
        Ok(None) => Err(BridgeException::native(
            "System.ObjectDisposedException",
            format!("{type_name} instance {native} was released"),
        )),
        Err(err) => Err(BridgeException::native("System.InvalidCastException", err.to_string())),
    }
}
