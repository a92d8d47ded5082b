//! Type references as they appear in member signatures.
//!
//! A [`TypeRef`] names a type without resolving it. The textual form is the
//! one spec authors write for parameter type lists, and exact matching against
//! that form is how overloads are resolved:
//!
//! ```text
//! System.Int32
//! System.Collections.Generic.List<System.String>
//! MyGame.Vector3[]
//! System.Single[,]
//! System.Byte*
//! ```

use std::collections::BTreeMap;
use std::fmt;

use crate::{GenerationError, PrimitiveKind, QualifiedName, TypeHash};

/// Maximum array rank the managed runtime supports.
pub const MAX_ARRAY_RANK: u8 = 32;

/// Reference to a type from a signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeRef {
    /// `System.Void`
    Void,
    /// A named type, possibly with generic arguments. The name never carries
    /// the backtick arity suffix; the arity is `args.len()`.
    Named {
        name: QualifiedName,
        args: Vec<TypeRef>,
    },
    /// Array of `element` with `rank` dimensions.
    Array { element: Box<TypeRef>, rank: u8 },
    /// Unmanaged pointer.
    Pointer(Box<TypeRef>),
    /// Unsubstituted generic parameter of the enclosing type or method.
    GenericParam(String),
}

impl TypeRef {
    /// A non-generic named type.
    pub fn named(name: impl Into<QualifiedName>) -> Self {
        let name: QualifiedName = name.into();
        TypeRef::Named {
            name: name.with_arity(0),
            args: Vec::new(),
        }
    }

    /// A constructed generic type.
    pub fn generic_instance(name: impl Into<QualifiedName>, args: Vec<TypeRef>) -> Self {
        let name: QualifiedName = name.into();
        TypeRef::Named {
            name: name.with_arity(0),
            args,
        }
    }

    /// A primitive type.
    pub fn primitive(kind: PrimitiveKind) -> Self {
        TypeRef::named(kind.qualified_name())
    }

    /// A generic parameter placeholder.
    pub fn generic(name: impl Into<String>) -> Self {
        TypeRef::GenericParam(name.into())
    }

    /// An array of `self`.
    pub fn array_of(self, rank: u8) -> Self {
        TypeRef::Array {
            element: Box::new(self),
            rank,
        }
    }

    /// A pointer to `self`.
    pub fn pointer_to(self) -> Self {
        TypeRef::Pointer(Box::new(self))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeRef::Void)
    }

    /// The primitive this names, if any.
    pub fn as_primitive(&self) -> Option<PrimitiveKind> {
        match self {
            TypeRef::Named { name, args } if args.is_empty() && name.namespace == ["System"] => {
                PrimitiveKind::from_name(&name.name)
            }
            _ => None,
        }
    }

    /// Catalog key of the named type's definition, with the arity suffix
    /// restored (`List<Int32>` -> ``System.Collections.Generic.List`1``).
    pub fn definition_name(&self) -> Option<QualifiedName> {
        match self {
            TypeRef::Named { name, args } => Some(name.with_arity(args.len())),
            _ => None,
        }
    }

    /// Whether any generic parameter remains unsubstituted.
    pub fn is_open(&self) -> bool {
        match self {
            TypeRef::Void => false,
            TypeRef::Named { args, .. } => args.iter().any(TypeRef::is_open),
            TypeRef::Array { element, .. } => element.is_open(),
            TypeRef::Pointer(inner) => inner.is_open(),
            TypeRef::GenericParam(_) => true,
        }
    }

    /// Replace generic parameters using `map`. Unknown parameters are kept.
    pub fn substitute(&self, map: &GenericSubstitution) -> TypeRef {
        match self {
            TypeRef::Void => TypeRef::Void,
            TypeRef::Named { name, args } => TypeRef::Named {
                name: name.clone(),
                args: args.iter().map(|a| a.substitute(map)).collect(),
            },
            TypeRef::Array { element, rank } => TypeRef::Array {
                element: Box::new(element.substitute(map)),
                rank: *rank,
            },
            TypeRef::Pointer(inner) => TypeRef::Pointer(Box::new(inner.substitute(map))),
            TypeRef::GenericParam(p) => map.get(p).cloned().unwrap_or_else(|| self.clone()),
        }
    }

    /// Turn global single-segment names listed in `params` into
    /// [`TypeRef::GenericParam`]. Used after parsing declarations like `List<T>`.
    pub fn with_generic_params(self, params: &[String]) -> TypeRef {
        match self {
            TypeRef::Named { name, args }
                if args.is_empty() && name.is_global() && params.contains(&name.name) =>
            {
                TypeRef::GenericParam(name.name)
            }
            TypeRef::Named { name, args } => TypeRef::Named {
                name,
                args: args
                    .into_iter()
                    .map(|a| a.with_generic_params(params))
                    .collect(),
            },
            TypeRef::Array { element, rank } => TypeRef::Array {
                element: Box::new(element.with_generic_params(params)),
                rank,
            },
            TypeRef::Pointer(inner) => TypeRef::Pointer(Box::new(inner.with_generic_params(params))),
            other => other,
        }
    }

    /// Deterministic identifier fragment used inside generated symbol names.
    ///
    /// `System.Collections.Generic.List<System.Int32>` becomes
    /// `SystemCollectionsGenericListSystemInt32`.
    pub fn symbol_fragment(&self) -> String {
        match self {
            TypeRef::Void => "SystemVoid".to_string(),
            TypeRef::Named { name, args } => {
                let mut out = name.symbol_prefix();
                for arg in args {
                    out.push_str(&arg.symbol_fragment());
                }
                out
            }
            TypeRef::Array { element, rank } => {
                format!("{}Array{}", element.symbol_fragment(), rank)
            }
            TypeRef::Pointer(inner) => format!("{}Pointer", inner.symbol_fragment()),
            TypeRef::GenericParam(p) => p.clone(),
        }
    }

    /// Deterministic hash of the reference, used by instantiation caches.
    pub fn type_hash(&self) -> TypeHash {
        TypeHash::from_name(&self.to_string())
    }

    /// Parse the textual form.
    ///
    /// Accepts managed keywords for primitives (`int`, `float`, ...), `void`,
    /// nested generic arguments, array suffixes and pointer suffixes.
    pub fn parse(text: &str) -> Result<TypeRef, GenerationError> {
        let mut parser = TypeParser {
            text,
            chars: text.char_indices().peekable(),
        };
        let parsed = parser.parse_type()?;
        parser.skip_ws();
        if parser.chars.peek().is_some() {
            return Err(parser.error("trailing characters"));
        }
        Ok(parsed)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Void => f.write_str("System.Void"),
            TypeRef::Named { name, args } => {
                write!(f, "{name}")?;
                if !args.is_empty() {
                    f.write_str("<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    f.write_str(">")?;
                }
                Ok(())
            }
            TypeRef::Array { element, rank } => {
                write!(f, "{element}[")?;
                for _ in 1..*rank {
                    f.write_str(",")?;
                }
                f.write_str("]")
            }
            TypeRef::Pointer(inner) => write!(f, "{inner}*"),
            TypeRef::GenericParam(p) => f.write_str(p),
        }
    }
}

/// Small hand-rolled recursive-descent parser for the textual form.
struct TypeParser<'a> {
    text: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl TypeParser<'_> {
    fn error(&self, detail: &str) -> GenerationError {
        GenerationError::InvalidTypeName {
            text: self.text.to_string(),
            detail: detail.to_string(),
        }
    }

    fn skip_ws(&mut self) {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        self.chars.next_if(|(_, c)| *c == expected).is_some()
    }

    fn parse_type(&mut self) -> Result<TypeRef, GenerationError> {
        self.skip_ws();
        let mut ident = String::new();
        while let Some((_, c)) = self
            .chars
            .next_if(|(_, c)| c.is_alphanumeric() || matches!(c, '_' | '.' | '`'))
        {
            ident.push(c);
        }
        if ident.is_empty() {
            return Err(self.error("expected a type name"));
        }

        let mut ty = if ident == "void" || ident == "System.Void" {
            TypeRef::Void
        } else if let Some(kind) = PrimitiveKind::from_name(&ident) {
            TypeRef::primitive(kind)
        } else if ident == "string" {
            TypeRef::named("System.String")
        } else if ident == "object" {
            TypeRef::named("System.Object")
        } else {
            let mut args = Vec::new();
            if self.eat('<') {
                loop {
                    args.push(self.parse_type()?);
                    if self.eat(',') {
                        continue;
                    }
                    if self.eat('>') {
                        break;
                    }
                    return Err(self.error("expected ',' or '>' in generic arguments"));
                }
            }
            TypeRef::generic_instance(ident.as_str(), args)
        };

        loop {
            if self.eat('[') {
                let mut rank: u8 = 1;
                while self.eat(',') {
                    rank = rank.saturating_add(1);
                }
                if !self.eat(']') {
                    return Err(self.error("expected ']'"));
                }
                if rank > MAX_ARRAY_RANK {
                    return Err(self.error("array rank exceeds 32"));
                }
                ty = ty.array_of(rank);
            } else if self.eat('*') {
                ty = ty.pointer_to();
            } else {
                break;
            }
        }
        Ok(ty)
    }
}

/// Generic parameter name -> concrete argument.
pub type GenericSubstitution = BTreeMap<String, TypeRef>;

/// Build the substitution map for `params` instantiated with `args`.
pub fn substitution_map(params: &[String], args: &[TypeRef]) -> GenericSubstitution {
    params.iter().cloned().zip(args.iter().cloned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_primitive_keywords() {
        assert_eq!(
            TypeRef::parse("int").unwrap(),
            TypeRef::primitive(PrimitiveKind::Int32)
        );
        assert_eq!(TypeRef::parse("void").unwrap(), TypeRef::Void);
        assert_eq!(TypeRef::parse("string").unwrap().to_string(), "System.String");
    }

    #[test]
    fn parse_generic_and_arrays() {
        let ty = TypeRef::parse("System.Collections.Generic.Dictionary<string, MyGame.Item[]>[,]")
            .unwrap();
        assert_eq!(
            ty.to_string(),
            "System.Collections.Generic.Dictionary<System.String, MyGame.Item[]>[,]"
        );
        match &ty {
            TypeRef::Array { rank, element } => {
                assert_eq!(*rank, 2);
                assert_eq!(
                    element.definition_name().unwrap().to_string(),
                    "System.Collections.Generic.Dictionary`2"
                );
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn parse_pointer() {
        let ty = TypeRef::parse("System.Byte*").unwrap();
        assert_eq!(ty, TypeRef::primitive(PrimitiveKind::Byte).pointer_to());
    }

    #[test]
    fn parse_errors() {
        assert!(TypeRef::parse("").is_err());
        assert!(TypeRef::parse("List<int").is_err());
        assert!(TypeRef::parse("int[").is_err());
        assert!(TypeRef::parse("int junk").is_err());
    }

    #[test]
    fn backtick_names_are_normalized() {
        let a = TypeRef::parse("System.Collections.Generic.List`1<int>").unwrap();
        let b = TypeRef::parse("System.Collections.Generic.List<int>").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn substitution() {
        let open = TypeRef::parse("System.Collections.Generic.List<T>")
            .unwrap()
            .with_generic_params(&["T".to_string()]);
        assert!(open.is_open());
        let map = substitution_map(&["T".to_string()], &[TypeRef::parse("float").unwrap()]);
        let closed = open.substitute(&map);
        assert!(!closed.is_open());
        assert_eq!(closed.to_string(), "System.Collections.Generic.List<System.Single>");
    }

    #[test]
    fn symbol_fragments() {
        let ty = TypeRef::parse("System.Collections.Generic.List<int>[]").unwrap();
        assert_eq!(ty.symbol_fragment(), "SystemCollectionsGenericListSystemInt32Array1");
        assert_eq!(
            TypeRef::parse("byte*").unwrap().symbol_fragment(),
            "SystemBytePointer"
        );
    }
}
