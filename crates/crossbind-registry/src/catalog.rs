//! TypeCatalog - the metadata store the binding generator scans against.
//!
//! Types are keyed by their definition [`QualifiedName`] (``List`1``, not
//! `List<int>`). Closed generic types are resolved on demand by substituting
//! the definition's generic parameters.
//!
//! # Member lookup
//!
//! Overloads are resolved by exact match of the *declared* parameter type
//! names, in their definition-level textual form. For a member of
//! `List<T>` a binding declares `Add(T)`, not `Add(System.Int32)`; there is no
//! conversion, no widening and therefore no ambiguity. Lookup searches the
//! owner first and then walks the base chain.
//!
//! # Example
//!
//! ```
//! use crossbind_core::TypeRef;
//! use crossbind_registry::{TypeCatalog, TypeShape};
//!
//! let mut catalog = TypeCatalog::with_system_types();
//! catalog.register(TypeShape::class("MyGame.Calc").method("int Add(int a, int b)")?)?;
//!
//! let owner = TypeRef::named("MyGame.Calc");
//! let params = vec!["System.Int32".to_string(), "System.Int32".to_string()];
//! assert!(catalog.find_method(&owner, "Add", &params).is_some());
//! # Ok::<(), crossbind_registry::RegistrationError>(())
//! ```

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::{FxHashMap, FxHashSet};

use crossbind_core::{
    GenerationError, GenericSubstitution, PrimitiveKind, QualifiedName, TypeRef,
    substitution_map,
};

use crate::{
    EventShape, FieldShape, MethodFlags, MethodShape, PropertyShape, RegistrationError,
    TypeShape,
};

/// A member found on a type or one of its bases.
#[derive(Debug, Clone)]
pub struct Resolved<'a, M> {
    /// Closed type that declares the member.
    pub declaring: TypeRef,
    pub member: &'a M,
    /// Generic parameter bindings of the declaring type.
    pub substitution: GenericSubstitution,
}

/// Metadata store.
#[derive(Debug, Default)]
pub struct TypeCatalog {
    types: FxHashMap<QualifiedName, TypeShape>,
    /// Registration order, for deterministic iteration.
    order: Vec<QualifiedName>,
}

impl TypeCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog with the built-in `System` types registered:
    /// primitives, `Object`, `String`, `Array`, `Delegate`, `Exception` and
    /// `Action`.
    pub fn with_system_types() -> Self {
        let mut catalog = Self::new();
        for kind in PrimitiveKind::ALL {
            catalog.insert(TypeShape::primitive(kind));
        }
        catalog.insert(TypeShape::class("System.Object"));
        catalog.insert(TypeShape::class("System.String").sealed());
        catalog.insert(TypeShape::class("System.Array").abstract_type());
        catalog.insert(TypeShape::class("System.Delegate").abstract_type());

        let mut exception = TypeShape::class("System.Exception");
        exception.properties.push(PropertyShape {
            name: "Message".to_string(),
            ty: TypeRef::named("System.String"),
            has_getter: true,
            has_setter: false,
            flags: MethodFlags::VIRTUAL,
        });
        exception.constructors.push(system_ctor(Vec::new()));
        exception.constructors.push(system_ctor(vec![crate::ParamShape {
            name: "message".to_string(),
            ty: TypeRef::named("System.String"),
            flags: Default::default(),
            default: None,
        }]));
        catalog.insert(exception);

        let mut action = TypeShape::delegate("System.Action");
        action.invoke = Some(MethodShape {
            name: "Invoke".to_string(),
            generic_params: Vec::new(),
            params: Vec::new(),
            return_type: TypeRef::Void,
            flags: MethodFlags::VIRTUAL,
            is_public: true,
        });
        catalog.insert(action);
        catalog
    }

    fn insert(&mut self, shape: TypeShape) {
        self.order.push(shape.name.clone());
        self.types.insert(shape.name.clone(), shape);
    }

    /// Register a type.
    pub fn register(&mut self, shape: TypeShape) -> Result<(), RegistrationError> {
        if self.types.contains_key(&shape.name) {
            return Err(RegistrationError::DuplicateType {
                name: shape.name.to_string(),
            });
        }
        self.insert(shape);
        Ok(())
    }

    /// Register several types.
    pub fn register_all(
        &mut self,
        shapes: impl IntoIterator<Item = TypeShape>,
    ) -> Result<(), RegistrationError> {
        shapes.into_iter().try_for_each(|shape| self.register(shape))
    }

    pub fn get(&self, name: &QualifiedName) -> Option<&TypeShape> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &QualifiedName) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterate in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeShape> {
        self.order.iter().filter_map(|name| self.types.get(name))
    }

    /// Shape of the definition behind a reference. Arrays resolve to `System.Array`.
    pub fn lookup(&self, ty: &TypeRef) -> Option<&TypeShape> {
        match ty {
            TypeRef::Named { .. } => ty.definition_name().and_then(|name| self.types.get(&name)),
            TypeRef::Array { .. } => self.types.get(&QualifiedName::from("System.Array")),
            _ => None,
        }
    }

    /// Like [`lookup`](Self::lookup) but failing with `TypeNotFound`.
    pub fn resolve(&self, ty: &TypeRef) -> Result<&TypeShape, GenerationError> {
        self.lookup(ty)
            .ok_or_else(|| GenerationError::type_not_found(ty.to_string()))
    }

    /// Generic parameter bindings for a closed reference to `shape`.
    pub fn substitution_for(shape: &TypeShape, ty: &TypeRef) -> GenericSubstitution {
        match ty {
            TypeRef::Named { args, .. } => substitution_map(&shape.generic_params, args),
            _ => GenericSubstitution::new(),
        }
    }

    /// The type followed by its base classes and then its interfaces, each
    /// closed over the generic arguments in play.
    pub fn ancestry(&self, ty: &TypeRef) -> Vec<(TypeRef, &TypeShape)> {
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        let mut pending_interfaces = Vec::new();

        let mut current = Some(ty.clone());
        while let Some(ty) = current.take() {
            let Some(shape) = self.lookup(&ty) else { break };
            if !seen.insert(shape.name.clone()) {
                break;
            }
            let subst = Self::substitution_for(shape, &ty);
            pending_interfaces.extend(shape.interfaces.iter().map(|i| i.substitute(&subst)));
            current = shape.base.as_ref().map(|b| b.substitute(&subst));
            out.push((ty, shape));
        }

        while let Some(ty) = pending_interfaces.pop() {
            let Some(shape) = self.lookup(&ty) else { continue };
            if !seen.insert(shape.name.clone()) {
                continue;
            }
            let subst = Self::substitution_for(shape, &ty);
            pending_interfaces.extend(shape.interfaces.iter().map(|i| i.substitute(&subst)));
            out.push((ty, shape));
        }
        out
    }

    fn find_in_ancestry<'a, M>(
        &'a self,
        owner: &TypeRef,
        select: impl Fn(&'a TypeShape) -> Option<&'a M>,
    ) -> Option<Resolved<'a, M>> {
        self.ancestry(owner).into_iter().find_map(|(declaring, shape)| {
            select(shape).map(|member| Resolved {
                substitution: Self::substitution_for(shape, &declaring),
                declaring,
                member,
            })
        })
    }

    /// Method `name` with exactly the declared parameter type names `params`.
    pub fn find_method(
        &self,
        owner: &TypeRef,
        name: &str,
        params: &[String],
    ) -> Option<Resolved<'_, MethodShape>> {
        self.find_in_ancestry(owner, |shape| {
            shape
                .methods
                .iter()
                .find(|m| m.name == name && m.matches_params(params))
        })
    }

    /// Constructor with exactly `params`. Constructors are not inherited.
    pub fn find_constructor(
        &self,
        owner: &TypeRef,
        params: &[String],
    ) -> Option<Resolved<'_, MethodShape>> {
        let shape = self.lookup(owner)?;
        let member = shape.constructors.iter().find(|c| c.matches_params(params))?;
        Some(Resolved {
            declaring: owner.clone(),
            member,
            substitution: Self::substitution_for(shape, owner),
        })
    }

    pub fn find_property(&self, owner: &TypeRef, name: &str) -> Option<Resolved<'_, PropertyShape>> {
        self.find_in_ancestry(owner, |shape| shape.properties.iter().find(|p| p.name == name))
    }

    pub fn find_field(&self, owner: &TypeRef, name: &str) -> Option<Resolved<'_, FieldShape>> {
        self.find_in_ancestry(owner, |shape| shape.fields.iter().find(|f| f.name == name))
    }

    pub fn find_event(&self, owner: &TypeRef, name: &str) -> Option<Resolved<'_, EventShape>> {
        self.find_in_ancestry(owner, |shape| shape.events.iter().find(|e| e.name == name))
    }

    /// Whether `ty` is `base` or derives from (or implements) it.
    pub fn is_subclass_of(&self, ty: &TypeRef, base: &QualifiedName) -> bool {
        self.ancestry(ty).iter().any(|(_, shape)| &shape.name == base)
    }

    /// All definition names, bases before derived types.
    ///
    /// Fails when a base or interface is missing from the catalog or when the
    /// hierarchy has a cycle.
    pub fn hierarchy_order(&self) -> Result<Vec<QualifiedName>, RegistrationError> {
        let mut graph: DiGraph<QualifiedName, ()> = DiGraph::new();
        let mut nodes: FxHashMap<&QualifiedName, NodeIndex> = FxHashMap::default();
        for name in &self.order {
            nodes.insert(name, graph.add_node(name.clone()));
        }

        for shape in self.iter() {
            let derived = nodes[&shape.name];
            for parent in shape.base.iter().chain(&shape.interfaces) {
                let parent_name = parent.definition_name().ok_or_else(|| {
                    RegistrationError::UnknownBase {
                        ty: shape.name.to_string(),
                        base: parent.to_string(),
                    }
                })?;
                let parent_node = nodes.get(&parent_name).copied().ok_or_else(|| {
                    RegistrationError::UnknownBase {
                        ty: shape.name.to_string(),
                        base: parent.to_string(),
                    }
                })?;
                graph.add_edge(parent_node, derived, ());
            }
        }

        toposort(&graph, None)
            .map(|sorted| sorted.into_iter().map(|n| graph[n].clone()).collect())
            .map_err(|cycle| RegistrationError::InheritanceCycle {
                name: graph[cycle.node_id()].to_string(),
            })
    }

    /// Check that every base exists and the hierarchy is acyclic.
    pub fn validate(&self) -> Result<(), RegistrationError> {
        self.hierarchy_order().map(|_| ())
    }
}

fn system_ctor(params: Vec<crate::ParamShape>) -> MethodShape {
    MethodShape {
        name: ".ctor".to_string(),
        generic_params: Vec::new(),
        params,
        return_type: TypeRef::Void,
        flags: MethodFlags::empty(),
        is_public: true,
    }
}
