//! Core types shared by the crossbind generator and runtime.
//!
//! This crate has no knowledge of how bindings are produced or executed. It
//! defines the vocabulary both sides agree on:
//!
//! - [`QualifiedName`] / [`TypeRef`]: how types are named in signatures
//! - [`TypeKind`] / [`PrimitiveKind`]: the marshaling category of a type
//! - [`TypeDescriptor`] / [`MemberDescriptor`]: classified generation-time records
//! - [`Operator`]: the operator method table
//! - [`naming`]: deterministic symbol names
//! - [`TypeHash`]: order-independent identity
//! - [`Diagnostics`]: warnings and reports from both generation and runtime

mod descriptor;
mod diagnostics;
mod error;
pub mod naming;
mod operator;
mod primitive;
mod qualified_name;
mod type_hash;
mod type_kind;
mod type_ref;

pub use descriptor::{
    DefaultValue, MemberDescriptor, MemberKind, ParamDescriptor, ParamFlags, TypeDescriptor,
};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use error::GenerationError;
pub use operator::{NativeOperator, Operator, OperatorArity};
pub use primitive::PrimitiveKind;
pub use qualified_name::QualifiedName;
pub use type_hash::{TypeHash, hash_constants};
pub use type_kind::TypeKind;
pub use type_ref::{GenericSubstitution, MAX_ARRAY_RANK, TypeRef, substitution_map};
