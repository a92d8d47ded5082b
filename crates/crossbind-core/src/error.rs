//! Generation-time errors.
//!
//! Every failure of the scan or lowering passes is fatal: generation aborts
//! and the error names the fully qualified member signature that failed, so
//! the binding spec author can fix the declaration.
//!
//! ```text
//! member not found: MyGame.Calc.Add(System.Int32, System.Single)
//! ```

use thiserror::Error;

// ============================================================================
// Generation Errors
// ============================================================================

/// Errors raised while turning a binding spec into bindings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// A type named in the binding spec is not in the catalog.
    #[error("type not found: {name}")]
    TypeNotFound { name: String },

    /// No member matches the requested name and exact parameter type list.
    #[error("member not found: {owner}.{signature}")]
    MemberNotFound { owner: String, signature: String },

    /// A base type declares no constructors and its type has no default one.
    #[error("missing default constructor: {owner}..ctor() is required by the base type declaration")]
    MissingDefaultConstructor { owner: String },

    /// A default parameter value that cannot be rendered on the native side.
    #[error("unsupported default value '{value}' for parameter '{param}' of {signature}")]
    UnsupportedDefaultValue {
        signature: String,
        param: String,
        value: String,
    },

    /// An operator method whose parameter count does not fit its operator.
    #[error("unsupported operator arity: {signature} has {found} parameters, expected {expected}")]
    UnsupportedOperatorArity {
        signature: String,
        expected: usize,
        found: usize,
    },

    /// `op_*` name that is not in the operator table.
    #[error("unknown operator: {signature}")]
    UnknownOperator { signature: String },

    /// Generic instantiation with the wrong number of type arguments.
    #[error("invalid generic arity for {name}: expected {expected} type arguments, found {found}")]
    InvalidGenericArity {
        name: String,
        expected: usize,
        found: usize,
    },

    /// A type used as a base type is sealed, a value type or static.
    #[error("{name} cannot be a base type: {reason}")]
    NotABaseType { name: String, reason: String },

    /// An override list names a member that is not virtual, abstract or an
    /// interface member.
    #[error("cannot override {signature}: member is not virtual")]
    OverrideNotVirtual { signature: String },

    /// The same type is declared twice in the binding spec.
    #[error("type declared twice: {name}")]
    DuplicateType { name: String },

    /// Array rank outside 1..=32.
    #[error("invalid array rank {rank} for {element}[]")]
    InvalidArrayRank { element: String, rank: u32 },

    /// A type name that does not parse.
    #[error("invalid type name '{text}': {detail}")]
    InvalidTypeName { text: String, detail: String },

    /// A type that cannot cross the boundary in the requested position.
    #[error("unsupported type {type_name} in {signature}: {reason}")]
    UnsupportedType {
        type_name: String,
        signature: String,
        reason: String,
    },
}

impl GenerationError {
    /// Create a member-not-found error from an owner and a signature.
    pub fn member_not_found(owner: impl Into<String>, signature: impl Into<String>) -> Self {
        GenerationError::MemberNotFound {
            owner: owner.into(),
            signature: signature.into(),
        }
    }

    /// Create a type-not-found error.
    pub fn type_not_found(name: impl Into<String>) -> Self {
        GenerationError::TypeNotFound { name: name.into() }
    }
}
