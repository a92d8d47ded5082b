//! Operator table mapping managed operator methods to native syntax.
//!
//! Managed operators are static methods with special names (`op_Addition`).
//! Each entry records the managed symbol, the arity the binding generator
//! requires, and how the native (Rust) side spells the overload.
//!
//! Calling shape on the native side: for unary operators the single operand
//! is the receiver; for binary operators the receiver is the left operand and
//! the one remaining parameter is the right operand.

use std::fmt;

/// How many operands an operator takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorArity {
    Unary,
    Binary,
    /// `op_Implicit` / `op_Explicit`: one operand, distinct result type.
    Conversion,
}

impl OperatorArity {
    /// Number of managed parameters the operator method declares.
    pub const fn param_count(self) -> usize {
        match self {
            OperatorArity::Unary | OperatorArity::Conversion => 1,
            OperatorArity::Binary => 2,
        }
    }
}

/// Native spelling of an operator overload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeOperator {
    /// Implemented through a `std::ops` trait.
    Trait {
        /// Trait path, e.g. `std::ops::Add`
        path: &'static str,
        /// Trait method, e.g. `add`
        method: &'static str,
    },
    /// Rust has no overloadable form; an inherent method is emitted instead.
    Inherent(&'static str),
    /// `impl From<Source> for Target`.
    From,
}

/// Managed operator methods the generator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    // === Unary ===
    UnaryPlus,
    UnaryNegation,
    LogicalNot,
    OnesComplement,
    Increment,
    Decrement,
    True,
    False,

    // === Binary arithmetic / bitwise ===
    Addition,
    Subtraction,
    Multiply,
    Division,
    Modulus,
    BitwiseAnd,
    BitwiseOr,
    ExclusiveOr,
    LeftShift,
    RightShift,

    // === Comparison ===
    Equality,
    Inequality,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,

    // === Conversion ===
    Implicit,
    Explicit,
}

impl Operator {
    /// Every supported operator.
    pub const ALL: [Operator; 26] = [
        Operator::UnaryPlus,
        Operator::UnaryNegation,
        Operator::LogicalNot,
        Operator::OnesComplement,
        Operator::Increment,
        Operator::Decrement,
        Operator::True,
        Operator::False,
        Operator::Addition,
        Operator::Subtraction,
        Operator::Multiply,
        Operator::Division,
        Operator::Modulus,
        Operator::BitwiseAnd,
        Operator::BitwiseOr,
        Operator::ExclusiveOr,
        Operator::LeftShift,
        Operator::RightShift,
        Operator::Equality,
        Operator::Inequality,
        Operator::LessThan,
        Operator::GreaterThan,
        Operator::LessThanOrEqual,
        Operator::GreaterThanOrEqual,
        Operator::Implicit,
        Operator::Explicit,
    ];

    /// Managed special method name.
    pub const fn method_name(self) -> &'static str {
        match self {
            Operator::UnaryPlus => "op_UnaryPlus",
            Operator::UnaryNegation => "op_UnaryNegation",
            Operator::LogicalNot => "op_LogicalNot",
            Operator::OnesComplement => "op_OnesComplement",
            Operator::Increment => "op_Increment",
            Operator::Decrement => "op_Decrement",
            Operator::True => "op_True",
            Operator::False => "op_False",
            Operator::Addition => "op_Addition",
            Operator::Subtraction => "op_Subtraction",
            Operator::Multiply => "op_Multiply",
            Operator::Division => "op_Division",
            Operator::Modulus => "op_Modulus",
            Operator::BitwiseAnd => "op_BitwiseAnd",
            Operator::BitwiseOr => "op_BitwiseOr",
            Operator::ExclusiveOr => "op_ExclusiveOr",
            Operator::LeftShift => "op_LeftShift",
            Operator::RightShift => "op_RightShift",
            Operator::Equality => "op_Equality",
            Operator::Inequality => "op_Inequality",
            Operator::LessThan => "op_LessThan",
            Operator::GreaterThan => "op_GreaterThan",
            Operator::LessThanOrEqual => "op_LessThanOrEqual",
            Operator::GreaterThanOrEqual => "op_GreaterThanOrEqual",
            Operator::Implicit => "op_Implicit",
            Operator::Explicit => "op_Explicit",
        }
    }

    /// Managed source symbol, as written in an operator declaration.
    pub const fn symbol(self) -> &'static str {
        match self {
            Operator::UnaryPlus | Operator::Addition => "+",
            Operator::UnaryNegation | Operator::Subtraction => "-",
            Operator::LogicalNot => "!",
            Operator::OnesComplement => "~",
            Operator::Increment => "++",
            Operator::Decrement => "--",
            Operator::True => "true",
            Operator::False => "false",
            Operator::Multiply => "*",
            Operator::Division => "/",
            Operator::Modulus => "%",
            Operator::BitwiseAnd => "&",
            Operator::BitwiseOr => "|",
            Operator::ExclusiveOr => "^",
            Operator::LeftShift => "<<",
            Operator::RightShift => ">>",
            Operator::Equality => "==",
            Operator::Inequality => "!=",
            Operator::LessThan => "<",
            Operator::GreaterThan => ">",
            Operator::LessThanOrEqual => "<=",
            Operator::GreaterThanOrEqual => ">=",
            Operator::Implicit => "implicit",
            Operator::Explicit => "explicit",
        }
    }

    pub const fn arity(self) -> OperatorArity {
        match self {
            Operator::UnaryPlus
            | Operator::UnaryNegation
            | Operator::LogicalNot
            | Operator::OnesComplement
            | Operator::Increment
            | Operator::Decrement
            | Operator::True
            | Operator::False => OperatorArity::Unary,
            Operator::Implicit | Operator::Explicit => OperatorArity::Conversion,
            _ => OperatorArity::Binary,
        }
    }

    /// Native (Rust) spelling of the overload.
    pub const fn native(self) -> NativeOperator {
        match self {
            Operator::UnaryNegation => NativeOperator::Trait {
                path: "std::ops::Neg",
                method: "neg",
            },
            Operator::LogicalNot => NativeOperator::Trait {
                path: "std::ops::Not",
                method: "not",
            },
            Operator::Addition => NativeOperator::Trait {
                path: "std::ops::Add",
                method: "add",
            },
            Operator::Subtraction => NativeOperator::Trait {
                path: "std::ops::Sub",
                method: "sub",
            },
            Operator::Multiply => NativeOperator::Trait {
                path: "std::ops::Mul",
                method: "mul",
            },
            Operator::Division => NativeOperator::Trait {
                path: "std::ops::Div",
                method: "div",
            },
            Operator::Modulus => NativeOperator::Trait {
                path: "std::ops::Rem",
                method: "rem",
            },
            Operator::BitwiseAnd => NativeOperator::Trait {
                path: "std::ops::BitAnd",
                method: "bitand",
            },
            Operator::BitwiseOr => NativeOperator::Trait {
                path: "std::ops::BitOr",
                method: "bitor",
            },
            Operator::ExclusiveOr => NativeOperator::Trait {
                path: "std::ops::BitXor",
                method: "bitxor",
            },
            Operator::LeftShift => NativeOperator::Trait {
                path: "std::ops::Shl",
                method: "shl",
            },
            Operator::RightShift => NativeOperator::Trait {
                path: "std::ops::Shr",
                method: "shr",
            },
            // `!` already claims Not; `~` becomes an inherent method
            Operator::OnesComplement => NativeOperator::Inherent("ones_complement"),
            Operator::UnaryPlus => NativeOperator::Inherent("unary_plus"),
            Operator::Increment => NativeOperator::Inherent("increment"),
            Operator::Decrement => NativeOperator::Inherent("decrement"),
            Operator::True => NativeOperator::Inherent("is_true"),
            Operator::False => NativeOperator::Inherent("is_false"),
            // std comparison traits must return bool; managed comparisons need not
            Operator::Equality => NativeOperator::Inherent("op_eq"),
            Operator::Inequality => NativeOperator::Inherent("op_ne"),
            Operator::LessThan => NativeOperator::Inherent("op_lt"),
            Operator::GreaterThan => NativeOperator::Inherent("op_gt"),
            Operator::LessThanOrEqual => NativeOperator::Inherent("op_le"),
            Operator::GreaterThanOrEqual => NativeOperator::Inherent("op_ge"),
            Operator::Implicit => NativeOperator::From,
            Operator::Explicit => NativeOperator::Inherent("convert"),
        }
    }

    /// Look up an operator by its managed method name.
    pub fn from_method_name(name: &str) -> Option<Operator> {
        Operator::ALL.into_iter().find(|op| op.method_name() == name)
    }

    /// Whether a managed method name uses the operator naming scheme.
    pub fn is_operator_name(name: &str) -> bool {
        name.starts_with("op_")
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_method_name() {
        assert_eq!(Operator::from_method_name("op_Addition"), Some(Operator::Addition));
        assert_eq!(Operator::from_method_name("op_Implicit"), Some(Operator::Implicit));
        assert_eq!(Operator::from_method_name("op_Concatenate"), None);
        assert!(Operator::is_operator_name("op_Concatenate"));
    }

    #[test]
    fn arity_table() {
        assert_eq!(Operator::UnaryNegation.arity(), OperatorArity::Unary);
        assert_eq!(Operator::Addition.arity().param_count(), 2);
        assert_eq!(Operator::Explicit.arity().param_count(), 1);
    }

    #[test]
    fn same_symbol_distinct_arity() {
        assert_eq!(Operator::Subtraction.symbol(), Operator::UnaryNegation.symbol());
        assert_ne!(Operator::Subtraction.arity(), Operator::UnaryNegation.arity());
    }

    #[test]
    fn native_spelling() {
        assert_eq!(
            Operator::Addition.native(),
            NativeOperator::Trait {
                path: "std::ops::Add",
                method: "add"
            }
        );
        assert_eq!(Operator::Equality.native(), NativeOperator::Inherent("op_eq"));
        assert_eq!(Operator::Implicit.native(), NativeOperator::From);
    }
}
