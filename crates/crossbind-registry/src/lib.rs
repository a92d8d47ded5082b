//! Type metadata catalog and classifier.
//!
//! The binding generator never inspects live types. Everything it knows comes
//! from [`TypeShape`] records registered in a [`TypeCatalog`]:
//!
//! - [`TypeShape`]: fields, constructors, methods, properties, events, flags
//! - [`TypeCatalog`]: lookup by definition name, exact-signature member lookup,
//!   base-before-derived ordering
//! - [`Classifier`]: assigns each closed type its [`crossbind_core::TypeKind`]

mod catalog;
mod classify;
mod decl;
mod error;
mod shape;

pub use catalog::{Resolved, TypeCatalog};
pub use classify::{Classifier, classify};
pub use error::RegistrationError;
pub use shape::{
    EventShape, FieldShape, MethodFlags, MethodShape, ParamShape, PropertyShape, ShapeFlags,
    TypeShape,
};
