//! Type metadata records.
//!
//! A [`TypeShape`] is everything the generator may learn about a type: its
//! category flags, base type, fields and members. Shapes are built with a
//! fluent builder; member builders take declaration strings (see the
//! `decl` module) and fail with [`RegistrationError`] when they do not parse.
//!
//! # Example
//!
//! ```
//! use crossbind_registry::TypeShape;
//!
//! let calc = TypeShape::class("MyGame.Calc")
//!     .constructor("()")?
//!     .method("int Add(int a, int b)")?
//!     .property("int Total { get; }")?;
//! assert_eq!(calc.methods.len(), 1);
//! # Ok::<(), crossbind_registry::RegistrationError>(())
//! ```

use bitflags::bitflags;

use crossbind_core::{DefaultValue, ParamFlags, PrimitiveKind, QualifiedName, TypeRef};

use crate::{RegistrationError, decl};

bitflags! {
    /// Category flags of a type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShapeFlags: u16 {
        /// Value type (struct) semantics.
        const VALUE_TYPE = 1 << 0;
        const ENUM = 1 << 1;
        const INTERFACE = 1 << 2;
        const ABSTRACT = 1 << 3;
        const SEALED = 1 << 4;
        /// Static class: no instances.
        const STATIC = 1 << 5;
        const DELEGATE = 1 << 6;
        const PRIMITIVE = 1 << 7;
    }
}

bitflags! {
    /// Member modifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodFlags: u8 {
        const STATIC = 1 << 0;
        const VIRTUAL = 1 << 1;
        const ABSTRACT = 1 << 2;
        const OVERRIDE = 1 << 3;
        const SEALED = 1 << 4;
    }
}

impl MethodFlags {
    /// Whether a member with these modifiers can be overridden.
    pub fn is_overridable(self) -> bool {
        self.intersects(MethodFlags::VIRTUAL | MethodFlags::ABSTRACT | MethodFlags::OVERRIDE)
            && !self.contains(MethodFlags::SEALED)
    }
}

impl ShapeFlags {
    /// Short label used in diagnostics.
    pub fn describe(self) -> &'static str {
        if self.contains(ShapeFlags::PRIMITIVE) {
            "primitive"
        } else if self.contains(ShapeFlags::ENUM) {
            "enum"
        } else if self.contains(ShapeFlags::DELEGATE) {
            "delegate"
        } else if self.contains(ShapeFlags::INTERFACE) {
            "interface"
        } else if self.contains(ShapeFlags::VALUE_TYPE) {
            "struct"
        } else if self.contains(ShapeFlags::STATIC) {
            "static class"
        } else if self.contains(ShapeFlags::SEALED) {
            "sealed class"
        } else {
            "class"
        }
    }
}

/// A data field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldShape {
    pub name: String,
    pub ty: TypeRef,
    pub is_public: bool,
    pub is_static: bool,
    pub is_readonly: bool,
}

/// A method or constructor parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamShape {
    pub name: String,
    /// Declared (definition-level) type; may contain generic parameters.
    pub ty: TypeRef,
    pub flags: ParamFlags,
    pub default: Option<DefaultValue>,
}

/// A method, constructor or delegate `Invoke` signature.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodShape {
    /// `.ctor` for constructors.
    pub name: String,
    pub generic_params: Vec<String>,
    pub params: Vec<ParamShape>,
    pub return_type: TypeRef,
    pub flags: MethodFlags,
    pub is_public: bool,
}

impl MethodShape {
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }

    /// Declared parameter types in their textual form, as matched against
    /// the parameter lists written in binding declarations.
    pub fn param_type_names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.ty.to_string()).collect()
    }

    /// Whether the declared parameter list is exactly `names`.
    pub fn matches_params(&self, names: &[String]) -> bool {
        self.params.len() == names.len()
            && self
                .params
                .iter()
                .zip(names)
                .all(|(p, n)| p.ty.to_string() == *n)
    }
}

/// A property with a getter and/or setter.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyShape {
    pub name: String,
    pub ty: TypeRef,
    pub has_getter: bool,
    pub has_setter: bool,
    pub flags: MethodFlags,
}

/// An event with add/remove accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct EventShape {
    pub name: String,
    /// Delegate type of the handler.
    pub handler: TypeRef,
    pub flags: MethodFlags,
}

/// Metadata of one type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeShape {
    /// Definition name, with the arity suffix for generic types.
    pub name: QualifiedName,
    pub generic_params: Vec<String>,
    pub flags: ShapeFlags,
    /// Base class; `None` means `System.Object` (or nothing, for `System.Object` itself).
    pub base: Option<TypeRef>,
    pub interfaces: Vec<TypeRef>,
    pub primitive: Option<PrimitiveKind>,
    /// Underlying primitive of an enum.
    pub enum_underlying: Option<PrimitiveKind>,
    pub enum_values: Vec<(String, i64)>,
    pub fields: Vec<FieldShape>,
    pub constructors: Vec<MethodShape>,
    pub methods: Vec<MethodShape>,
    pub properties: Vec<PropertyShape>,
    pub events: Vec<EventShape>,
    /// `Invoke` signature of a delegate type.
    pub invoke: Option<MethodShape>,
}

impl TypeShape {
    fn with_flags(name: &str, generic_params: &[&str], flags: ShapeFlags) -> Self {
        let generic_params: Vec<String> = generic_params.iter().map(|p| p.to_string()).collect();
        let name = QualifiedName::from(name).with_arity(generic_params.len());
        Self {
            name,
            generic_params,
            flags,
            base: None,
            interfaces: Vec::new(),
            primitive: None,
            enum_underlying: None,
            enum_values: Vec::new(),
            fields: Vec::new(),
            constructors: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
            invoke: None,
        }
    }

    /// A reference type.
    pub fn class(name: &str) -> Self {
        Self::with_flags(name, &[], ShapeFlags::empty())
    }

    /// A generic reference type definition, e.g. `generic_class("System.Collections.Generic.List", &["T"])`.
    pub fn generic_class(name: &str, params: &[&str]) -> Self {
        Self::with_flags(name, params, ShapeFlags::empty())
    }

    /// A value type.
    pub fn value_type(name: &str) -> Self {
        Self::with_flags(name, &[], ShapeFlags::VALUE_TYPE | ShapeFlags::SEALED)
    }

    pub fn generic_value_type(name: &str, params: &[&str]) -> Self {
        Self::with_flags(name, params, ShapeFlags::VALUE_TYPE | ShapeFlags::SEALED)
    }

    pub fn interface(name: &str) -> Self {
        Self::with_flags(name, &[], ShapeFlags::INTERFACE | ShapeFlags::ABSTRACT)
    }

    /// An enum with the given underlying integral type.
    pub fn enumeration(name: &str, underlying: PrimitiveKind) -> Self {
        let mut shape = Self::with_flags(
            name,
            &[],
            ShapeFlags::VALUE_TYPE | ShapeFlags::ENUM | ShapeFlags::SEALED,
        );
        shape.enum_underlying = Some(underlying);
        shape
    }

    /// A delegate type; its signature is set with [`TypeShape::invoke`].
    pub fn delegate(name: &str) -> Self {
        Self::with_flags(name, &[], ShapeFlags::DELEGATE | ShapeFlags::SEALED)
    }

    pub fn generic_delegate(name: &str, params: &[&str]) -> Self {
        Self::with_flags(name, params, ShapeFlags::DELEGATE | ShapeFlags::SEALED)
    }

    /// One of the built-in primitives.
    pub fn primitive(kind: PrimitiveKind) -> Self {
        let mut shape = Self::with_flags(
            &kind.qualified_name(),
            &[],
            ShapeFlags::VALUE_TYPE | ShapeFlags::PRIMITIVE | ShapeFlags::SEALED,
        );
        shape.primitive = Some(kind);
        shape
    }

    pub fn abstract_type(mut self) -> Self {
        self.flags |= ShapeFlags::ABSTRACT;
        self
    }

    pub fn sealed(mut self) -> Self {
        self.flags |= ShapeFlags::SEALED;
        self
    }

    pub fn static_type(mut self) -> Self {
        self.flags |= ShapeFlags::STATIC | ShapeFlags::ABSTRACT | ShapeFlags::SEALED;
        self
    }

    pub fn base(mut self, base: &str) -> Result<Self, RegistrationError> {
        self.base = Some(self.parse_type(base)?);
        Ok(self)
    }

    pub fn implements(mut self, interface: &str) -> Result<Self, RegistrationError> {
        let ty = self.parse_type(interface)?;
        self.interfaces.push(ty);
        Ok(self)
    }

    /// `[private] [static] [readonly] Type Name`
    pub fn field(mut self, decl: &str) -> Result<Self, RegistrationError> {
        let field = decl::parse_field(decl, &self.generic_params)?;
        self.fields.push(field);
        Ok(self)
    }

    /// `(Type a, Type b)`
    pub fn constructor(mut self, decl: &str) -> Result<Self, RegistrationError> {
        let ctor = decl::parse_constructor(decl, &self.generic_params)?;
        self.constructors.push(ctor);
        Ok(self)
    }

    /// `[static|virtual|abstract] Ret Name[<T>](Type a, ...)`
    pub fn method(mut self, decl: &str) -> Result<Self, RegistrationError> {
        let mut method = decl::parse_method(decl, &self.generic_params)?;
        if self.flags.contains(ShapeFlags::INTERFACE) {
            method.flags |= MethodFlags::ABSTRACT;
        }
        self.methods.push(method);
        Ok(self)
    }

    /// `Type Name { get; set; }`
    pub fn property(mut self, decl: &str) -> Result<Self, RegistrationError> {
        let mut property = decl::parse_property(decl, &self.generic_params)?;
        if self.flags.contains(ShapeFlags::INTERFACE) {
            property.flags |= MethodFlags::ABSTRACT;
        }
        self.properties.push(property);
        Ok(self)
    }

    /// `HandlerType Name`
    pub fn event(mut self, decl: &str) -> Result<Self, RegistrationError> {
        let mut event = decl::parse_event(decl, &self.generic_params)?;
        if self.flags.contains(ShapeFlags::INTERFACE) {
            event.flags |= MethodFlags::ABSTRACT;
        }
        self.events.push(event);
        Ok(self)
    }

    /// Delegate signature: `Ret Invoke(Type a, ...)`.
    pub fn invoke(mut self, decl: &str) -> Result<Self, RegistrationError> {
        let invoke = decl::parse_method(decl, &self.generic_params)?;
        self.invoke = Some(invoke);
        Ok(self)
    }

    pub fn enum_value(mut self, name: &str, value: i64) -> Self {
        self.enum_values.push((name.to_string(), value));
        self
    }

    fn parse_type(&self, text: &str) -> Result<TypeRef, RegistrationError> {
        TypeRef::parse(text)
            .map(|ty| ty.with_generic_params(&self.generic_params))
            .map_err(|e| RegistrationError::from((text, e)))
    }

    // ==========================================================================
    // Queries
    // ==========================================================================

    pub fn is_value_type(&self) -> bool {
        self.flags.contains(ShapeFlags::VALUE_TYPE)
    }

    pub fn is_enum(&self) -> bool {
        self.flags.contains(ShapeFlags::ENUM)
    }

    pub fn is_interface(&self) -> bool {
        self.flags.contains(ShapeFlags::INTERFACE)
    }

    pub fn is_delegate(&self) -> bool {
        self.flags.contains(ShapeFlags::DELEGATE)
    }

    pub fn is_abstract(&self) -> bool {
        self.flags.contains(ShapeFlags::ABSTRACT)
    }

    /// Whether the type can be subclassed from the other runtime.
    pub fn is_inheritable(&self) -> bool {
        !self.flags.intersects(
            ShapeFlags::SEALED | ShapeFlags::STATIC | ShapeFlags::VALUE_TYPE | ShapeFlags::DELEGATE,
        )
    }

    pub fn arity(&self) -> usize {
        self.generic_params.len()
    }

    /// Open self-reference: `List<T>` for ``List`1``.
    pub fn open_type_ref(&self) -> TypeRef {
        TypeRef::generic_instance(
            self.name.clone(),
            self.generic_params.iter().map(TypeRef::generic).collect(),
        )
    }

    /// Whether an accessible parameterless constructor exists.
    ///
    /// Value types always have one; classes without declared constructors get
    /// the implicit one.
    pub fn has_default_constructor(&self) -> bool {
        if self.is_value_type() {
            return true;
        }
        if self.flags.contains(ShapeFlags::STATIC) || self.is_interface() {
            return false;
        }
        self.constructors.is_empty()
            || self
                .constructors
                .iter()
                .any(|c| c.is_public && c.params.is_empty())
    }

    /// Instance fields, the ones that make up a value's layout.
    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldShape> {
        self.fields.iter().filter(|f| !f.is_static)
    }
}
