use thiserror::Error;

use crossbind_core::GenerationError;

/// Errors that occur while building the type catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// A type with the same definition name is already registered.
    #[error("type already registered: {name}")]
    DuplicateType { name: String },

    /// A member declaration string could not be parsed.
    #[error("invalid declaration '{decl}': {detail}")]
    InvalidDeclaration { decl: String, detail: String },

    /// A base type or interface is not in the catalog.
    #[error("{ty} derives from unknown type {base}")]
    UnknownBase { ty: String, base: String },

    /// A type transitively derives from itself.
    #[error("inheritance cycle through {name}")]
    InheritanceCycle { name: String },
}

impl RegistrationError {
    pub(crate) fn invalid(decl: &str, detail: impl Into<String>) -> Self {
        RegistrationError::InvalidDeclaration {
            decl: decl.to_string(),
            detail: detail.into(),
        }
    }
}

impl From<(&str, GenerationError)> for RegistrationError {
    fn from((decl, err): (&str, GenerationError)) -> Self {
        RegistrationError::invalid(decl, err.to_string())
    }
}
