//! Crossbind binding generator.
//!
//! Turns a declarative [`BindingSpec`] plus a [`TypeCatalog`] into source
//! text for both sides of the bridge.
//!
//! ## Architecture
//!
//! - **Scan**: resolve every spec entry against the catalog once and produce
//!   immutable, classified member descriptors
//! - **Lower**: assign symbols and function-table indices, compute wire shapes
//! - **Render**: emit managed and native source from the [`BindingPlan`]
//!
//! ## Modules
//!
//! - [`spec`]: the binding description
//! - [`scan`]: catalog lookups, classification, generic substitution
//! - [`generics`]: instantiation cache keyed by definition and arguments
//! - [`ir`]: the lowered plan shared by renderers and the hosted executor
//! - [`lower`]: symbol and index assignment
//! - [`render`]: the managed and native targets
//!
//! [`TypeCatalog`]: crossbind_registry::TypeCatalog

pub mod generics;
pub mod ir;
pub mod lower;
pub mod render;
pub mod scan;
pub mod spec;

pub use generics::{InstantiationCache, Instantiation};
pub use ir::{
    BaseTypeBinding, BindingPlan, FieldBinding, MemberBinding, NativeInvokeBinding, TypeBinding,
    WireParam, WireType,
};
pub use lower::{LoweringPass, lower};
pub use render::{CodeWriter, ManagedRenderer, NativeRenderer, RenderOptions, Renderer};
pub use scan::{ScanResult, ScannedBaseType, ScannedType, Scanner, TypeRole, scan};
pub use spec::{
    ArraySpec, BaseTypeSpec, BindingSpec, ConstructorSpec, DelegateSpec, EventSpec, FieldSpec,
    GenericInstantiationSpec, MethodSpec, OverrideSpec, PropertySpec, TypeSpec,
};

// Re-export the error type from core for convenience
pub use crossbind_core::GenerationError;

use crossbind_registry::TypeCatalog;

/// Scan and lower in one step.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn plan(
    catalog: &TypeCatalog,
    spec: &BindingSpec,
    default_capacity: u32,
) -> Result<BindingPlan, GenerationError> {
    let scanned = scan(catalog, spec, default_capacity)?;
    Ok(lower(scanned))
}
