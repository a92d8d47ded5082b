//! Crossbind: a handle-based bridge between a managed (C#) runtime and
//! native Rust.
//!
//! - [`Generator`]: reads a [`BindingSpec`] against a [`TypeCatalog`] and
//!   emits the matched C# and Rust trampolines
//! - [`hosted`]: runs a generated [`BindingPlan`] in-process, with Rust
//!   closures standing in for managed bodies
//!
//! The member crates are re-exported whole as [`core`], [`registry`],
//! [`codegen`] and [`runtime`]; the names most programs need are also
//! re-exported here and in [`prelude`].

mod generator;
pub mod hosted;

pub use crossbind_codegen as codegen;
pub use crossbind_core as core;
pub use crossbind_registry as registry;
pub use crossbind_runtime as runtime;

pub use generator::{GeneratedBindings, GeneratedFile, Generator, GeneratorOptions};

pub use crossbind_codegen::{
    ArraySpec, BaseTypeSpec, BindingPlan, BindingSpec, ConstructorSpec, DelegateSpec,
    GenericInstantiationSpec, MethodSpec, OverrideSpec, TypeSpec,
};
pub use crossbind_core::{Diagnostic, DiagnosticKind, Diagnostics, GenerationError, TypeKind};
pub use crossbind_registry::{RegistrationError, TypeCatalog, TypeShape};
pub use crossbind_runtime::{
    BridgeError, BridgeException, Handle, HandleRegistry, Handshake, RuntimeConfig,
    RuntimeContext, RuntimeError, WireValue,
};

pub mod prelude {
    pub use crate::generator::*;
    pub use crate::hosted::{HostedBridge, ManagedHost, ManagedThrow};
    pub use crossbind_codegen::{
        ArraySpec, BaseTypeSpec, BindingSpec, DelegateSpec, MethodSpec, TypeSpec,
    };
    pub use crossbind_registry::{TypeCatalog, TypeShape};
    pub use crossbind_runtime::{
        BridgeError, BridgeException, Handle, RuntimeContext, RuntimeError, WireValue,
    };
}
