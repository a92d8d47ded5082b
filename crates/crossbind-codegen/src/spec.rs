//! The declarative binding description.
//!
//! A [`BindingSpec`] lists what to expose and nothing else: the scan pass
//! looks every entry up in the type catalog and fails on the first one that
//! does not resolve. Type names are written the way they appear in
//! signatures, keywords allowed (`int`, `string`), generic parameters by their
//! declared name (`T`).
//!
//! # Example
//!
//! ```
//! use crossbind_codegen::{BaseTypeSpec, BindingSpec, MethodSpec, TypeSpec};
//!
//! let spec = BindingSpec::new()
//!     .module("MyGame")
//!     .with_type(
//!         TypeSpec::new("MyGame.Calc")
//!             .capacity(64)
//!             .constructor(&[])
//!             .method("Add", &["int", "int"])
//!             .method_with(MethodSpec::new("Echo", &["T"]).instantiate(&["int"])),
//!     )
//!     .with_base_type(BaseTypeSpec::new("MyGame.Behaviour").override_method("Update", &["float"]));
//!
//! assert_eq!(spec.types.len(), 1);
//! assert_eq!(spec.base_types.len(), 1);
//! ```

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Everything to expose.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingSpec {
    /// Modules (assemblies) the types come from. Informational; emitted as
    /// comments and used by the managed renderer for `using` lines.
    pub modules: Vec<String>,
    pub types: Vec<TypeSpec>,
    pub arrays: Vec<ArraySpec>,
    pub delegates: Vec<DelegateSpec>,
    pub base_types: Vec<BaseTypeSpec>,
    /// Extra value types that get `Box`/`Unbox` trampolines without being
    /// exposed otherwise (primitives, typically).
    pub boxed: Vec<String>,
}

impl BindingSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(mut self, name: &str) -> Self {
        self.modules.push(name.to_string());
        self
    }

    pub fn with_type(mut self, ty: TypeSpec) -> Self {
        self.types.push(ty);
        self
    }

    pub fn with_array(mut self, element: &str, rank: u8) -> Self {
        self.arrays.push(ArraySpec::new(element, rank));
        self
    }

    pub fn with_delegate(mut self, delegate: DelegateSpec) -> Self {
        self.delegates.push(delegate);
        self
    }

    pub fn with_base_type(mut self, base: BaseTypeSpec) -> Self {
        self.base_types.push(base);
        self
    }

    pub fn with_boxing(mut self, ty: &str) -> Self {
        self.boxed.push(ty.to_string());
        self
    }
}

/// One exposed type and the members to bind on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpec {
    /// Definition name without generic arguments, e.g. `System.Collections.Generic.List`.
    pub name: String,
    /// Maximum simultaneous native proxies; falls back to the generator default.
    pub capacity: Option<u32>,
    pub constructors: Vec<ConstructorSpec>,
    pub methods: Vec<MethodSpec>,
    pub properties: Vec<PropertySpec>,
    pub fields: Vec<FieldSpec>,
    pub events: Vec<EventSpec>,
    /// Required for generic types: one entry per closed type to bind.
    pub instantiations: Vec<GenericInstantiationSpec>,
}

impl TypeSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            capacity: None,
            constructors: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            fields: Vec::new(),
            events: Vec::new(),
            instantiations: Vec::new(),
        }
    }

    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Bind the constructor with exactly these parameter types.
    pub fn constructor(mut self, params: &[&str]) -> Self {
        self.constructors.push(ConstructorSpec::new(params));
        self
    }

    pub fn constructor_with(mut self, ctor: ConstructorSpec) -> Self {
        self.constructors.push(ctor);
        self
    }

    /// Bind method `name` with exactly these parameter types.
    pub fn method(mut self, name: &str, params: &[&str]) -> Self {
        self.methods.push(MethodSpec::new(name, params));
        self
    }

    pub fn method_with(mut self, method: MethodSpec) -> Self {
        self.methods.push(method);
        self
    }

    /// Bind both accessors of a property.
    pub fn property(mut self, name: &str) -> Self {
        self.properties.push(PropertySpec::new(name));
        self
    }

    /// Bind only the getter of a property.
    pub fn read_only_property(mut self, name: &str) -> Self {
        self.properties.push(PropertySpec::new(name).read_only());
        self
    }

    pub fn field(mut self, name: &str) -> Self {
        self.fields.push(FieldSpec::new(name));
        self
    }

    pub fn read_only_field(mut self, name: &str) -> Self {
        self.fields.push(FieldSpec::new(name).read_only());
        self
    }

    pub fn event(mut self, name: &str) -> Self {
        self.events.push(EventSpec::new(name));
        self
    }

    /// Bind the closed type with these type arguments.
    pub fn instantiate(mut self, args: &[&str]) -> Self {
        self.instantiations.push(GenericInstantiationSpec::new(args));
        self
    }

    pub fn instantiate_with(mut self, instantiation: GenericInstantiationSpec) -> Self {
        self.instantiations.push(instantiation);
        self
    }
}

/// A constructor, by parameter type list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstructorSpec {
    pub params: Vec<String>,
    pub exceptions: Vec<String>,
}

impl ConstructorSpec {
    pub fn new(params: &[&str]) -> Self {
        Self {
            params: owned(params),
            exceptions: Vec::new(),
        }
    }

    /// Exception type the trampoline catches ahead of the catch-all.
    pub fn throws(mut self, exception: &str) -> Self {
        self.exceptions.push(exception.to_string());
        self
    }
}

/// A method, by name and parameter type list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSpec {
    pub name: String,
    pub params: Vec<String>,
    /// Type argument lists for a generic method; empty otherwise.
    pub instantiations: Vec<Vec<String>>,
    pub exceptions: Vec<String>,
}

impl MethodSpec {
    pub fn new(name: &str, params: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            params: owned(params),
            instantiations: Vec::new(),
            exceptions: Vec::new(),
        }
    }

    pub fn instantiate(mut self, args: &[&str]) -> Self {
        self.instantiations.push(owned(args));
        self
    }

    pub fn throws(mut self, exception: &str) -> Self {
        self.exceptions.push(exception.to_string());
        self
    }
}

/// Property accessors to bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySpec {
    pub name: String,
    pub get: bool,
    pub set: bool,
}

impl PropertySpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            get: true,
            set: true,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.set = false;
        self
    }
}

/// Field accessors to bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub read_only: bool,
}

impl FieldSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// An event; both `add` and `remove` are bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSpec {
    pub name: String,
}

impl EventSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

/// One closed generic type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericInstantiationSpec {
    pub args: Vec<String>,
    /// Overrides the type's capacity for this instantiation.
    pub capacity: Option<u32>,
}

impl GenericInstantiationSpec {
    pub fn new(args: &[&str]) -> Self {
        Self {
            args: owned(args),
            capacity: None,
        }
    }

    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

/// An array element type and rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArraySpec {
    pub element: String,
    pub rank: u8,
    pub capacity: Option<u32>,
}

impl ArraySpec {
    pub fn new(element: &str, rank: u8) -> Self {
        Self {
            element: element.to_string(),
            rank,
            capacity: None,
        }
    }
}

/// A delegate type, optionally per generic instantiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateSpec {
    pub name: String,
    pub instantiations: Vec<GenericInstantiationSpec>,
    pub capacity: Option<u32>,
}

impl DelegateSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            instantiations: Vec::new(),
            capacity: None,
        }
    }

    pub fn instantiate(mut self, args: &[&str]) -> Self {
        self.instantiations.push(GenericInstantiationSpec::new(args));
        self
    }

    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

/// Which member of a base type the other runtime may override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideSpec {
    Method { name: String, params: Vec<String> },
    /// Getter and, when present, setter.
    Property { name: String },
}

impl OverrideSpec {
    pub fn method(name: &str, params: &[&str]) -> Self {
        OverrideSpec::Method {
            name: name.to_string(),
            params: owned(params),
        }
    }

    pub fn property(name: &str) -> Self {
        OverrideSpec::Property {
            name: name.to_string(),
        }
    }
}

/// A type the other runtime can subclass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseTypeSpec {
    /// The managed class or interface being subclassed.
    pub name: String,
    /// Name of the generated managed stub; `<Namespace>.Base<Name>` when unset.
    pub stub: Option<String>,
    pub capacity: Option<u32>,
    /// Empty means "the default constructor", which must then exist.
    pub constructors: Vec<ConstructorSpec>,
    pub overrides: Vec<OverrideSpec>,
}

impl BaseTypeSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            stub: None,
            capacity: None,
            constructors: Vec::new(),
            overrides: Vec::new(),
        }
    }

    pub fn stub_name(mut self, stub: &str) -> Self {
        self.stub = Some(stub.to_string());
        self
    }

    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn constructor(mut self, params: &[&str]) -> Self {
        self.constructors.push(ConstructorSpec::new(params));
        self
    }

    pub fn override_method(mut self, name: &str, params: &[&str]) -> Self {
        self.overrides.push(OverrideSpec::method(name, params));
        self
    }

    pub fn override_property(mut self, name: &str) -> Self {
        self.overrides.push(OverrideSpec::property(name));
        self
    }
}
