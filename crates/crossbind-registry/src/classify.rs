//! Type classifier.
//!
//! Assigns every type a [`TypeKind`]. Rules, first match wins:
//!
//! | Rule | Kind |
//! |------|------|
//! | `void` | `None` |
//! | pointer | `Pointer` |
//! | enum | `Enum` |
//! | primitive | `Primitive` |
//! | not a value type (class, interface, delegate, string, array) | `Reference` |
//! | value type, every instance field public and itself primitive, enum or full value type | `FullValueType` |
//! | any other value type | `ManagedValueType` |
//!
//! The result only depends on the shapes in the catalog, so classification
//! is deterministic and results are cached per closed type.

use std::cell::RefCell;

use rustc_hash::{FxHashMap, FxHashSet};

use crossbind_core::{GenerationError, TypeDescriptor, TypeKind, TypeRef};

use crate::{TypeCatalog, TypeShape};

/// Classifies types against a catalog.
pub struct Classifier<'a> {
    catalog: &'a TypeCatalog,
    cache: RefCell<FxHashMap<TypeRef, TypeKind>>,
}

impl<'a> Classifier<'a> {
    pub fn new(catalog: &'a TypeCatalog) -> Self {
        Self {
            catalog,
            cache: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn catalog(&self) -> &'a TypeCatalog {
        self.catalog
    }

    /// Classify a closed type.
    pub fn classify(&self, ty: &TypeRef) -> Result<TypeKind, GenerationError> {
        if let Some(kind) = self.cache.borrow().get(ty) {
            return Ok(*kind);
        }
        let mut visiting = FxHashSet::default();
        let kind = self.classify_inner(ty, &mut visiting)?;
        self.cache.borrow_mut().insert(ty.clone(), kind);
        Ok(kind)
    }

    /// Classify and wrap into a descriptor. Enums record their underlying primitive.
    pub fn describe(&self, ty: &TypeRef) -> Result<TypeDescriptor, GenerationError> {
        let kind = self.classify(ty)?;
        let descriptor = TypeDescriptor::new(ty.clone(), kind);
        if kind == TypeKind::Enum {
            if let Some(underlying) = self.catalog.lookup(ty).and_then(|s| s.enum_underlying) {
                return Ok(descriptor.with_primitive(underlying));
            }
        }
        Ok(descriptor)
    }

    fn classify_inner(
        &self,
        ty: &TypeRef,
        visiting: &mut FxHashSet<TypeRef>,
    ) -> Result<TypeKind, GenerationError> {
        match ty {
            TypeRef::Void => Ok(TypeKind::None),
            TypeRef::Pointer(_) => Ok(TypeKind::Pointer),
            TypeRef::Array { .. } => Ok(TypeKind::Reference),
            TypeRef::GenericParam(name) => Err(GenerationError::UnsupportedType {
                type_name: name.clone(),
                signature: ty.to_string(),
                reason: "unsubstituted generic parameter".to_string(),
            }),
            TypeRef::Named { .. } => {
                let shape = self.catalog.resolve(ty)?;
                if shape.is_enum() {
                    Ok(TypeKind::Enum)
                } else if shape.primitive.is_some() {
                    Ok(TypeKind::Primitive)
                } else if !shape.is_value_type() {
                    Ok(TypeKind::Reference)
                } else if self.is_full_value(shape, ty, visiting)? {
                    Ok(TypeKind::FullValueType)
                } else {
                    Ok(TypeKind::ManagedValueType)
                }
            }
        }
    }

    fn is_full_value(
        &self,
        shape: &TypeShape,
        ty: &TypeRef,
        visiting: &mut FxHashSet<TypeRef>,
    ) -> Result<bool, GenerationError> {
        // A value type reached again through its own fields cannot be laid out
        // as a mirror struct.
        if !visiting.insert(ty.clone()) {
            return Ok(false);
        }
        let subst = TypeCatalog::substitution_for(shape, ty);
        let mut full = true;
        for field in shape.instance_fields() {
            if !field.is_public {
                full = false;
                break;
            }
            let field_ty = field.ty.substitute(&subst);
            let kind = self.classify_inner(&field_ty, visiting)?;
            if !matches!(
                kind,
                TypeKind::Primitive | TypeKind::Enum | TypeKind::FullValueType
            ) {
                full = false;
                break;
            }
        }
        visiting.remove(ty);
        Ok(full)
    }
}

/// Classify a single type without keeping a cache.
pub fn classify(catalog: &TypeCatalog, ty: &TypeRef) -> Result<TypeKind, GenerationError> {
    Classifier::new(catalog).classify(ty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbind_core::PrimitiveKind;

    fn catalog() -> TypeCatalog {
        let mut catalog = TypeCatalog::with_system_types();
        catalog
            .register_all([
                TypeShape::value_type("MyGame.Vec")
                    .field("float X")
                    .unwrap()
                    .field("float Y")
                    .unwrap(),
                TypeShape::enumeration("MyGame.Mode", PrimitiveKind::Byte)
                    .enum_value("Walk", 0)
                    .enum_value("Run", 1),
                TypeShape::value_type("MyGame.Transform")
                    .field("MyGame.Vec Position")
                    .unwrap()
                    .field("MyGame.Mode Mode")
                    .unwrap()
                    .field("static MyGame.Transform Identity")
                    .unwrap(),
                TypeShape::value_type("MyGame.Named")
                    .field("string Name")
                    .unwrap()
                    .field("MyGame.Vec Position")
                    .unwrap(),
                TypeShape::value_type("MyGame.Hidden")
                    .field("private int secret")
                    .unwrap(),
                TypeShape::value_type("MyGame.Wrapper")
                    .field("MyGame.Named Inner")
                    .unwrap(),
                TypeShape::generic_value_type("MyGame.Pair", &["T"])
                    .field("T First")
                    .unwrap()
                    .field("T Second")
                    .unwrap(),
                TypeShape::class("MyGame.Calc"),
            ])
            .unwrap();
        catalog
    }

    fn kind(catalog: &TypeCatalog, text: &str) -> TypeKind {
        classify(catalog, &TypeRef::parse(text).unwrap()).unwrap()
    }

    #[test]
    fn priority_order() {
        let catalog = catalog();
        assert_eq!(kind(&catalog, "void"), TypeKind::None);
        assert_eq!(kind(&catalog, "MyGame.Vec*"), TypeKind::Pointer);
        assert_eq!(kind(&catalog, "MyGame.Mode"), TypeKind::Enum);
        assert_eq!(kind(&catalog, "int"), TypeKind::Primitive);
        assert_eq!(kind(&catalog, "MyGame.Calc"), TypeKind::Reference);
        assert_eq!(kind(&catalog, "string"), TypeKind::Reference);
        assert_eq!(kind(&catalog, "int[]"), TypeKind::Reference);
    }

    #[test]
    fn full_value_types() {
        let catalog = catalog();
        assert_eq!(kind(&catalog, "MyGame.Vec"), TypeKind::FullValueType);
        // Nested full value types and enums qualify; static fields are ignored.
        assert_eq!(kind(&catalog, "MyGame.Transform"), TypeKind::FullValueType);
    }

    #[test]
    fn managed_value_types() {
        let catalog = catalog();
        assert_eq!(kind(&catalog, "MyGame.Named"), TypeKind::ManagedValueType);
        assert_eq!(kind(&catalog, "MyGame.Hidden"), TypeKind::ManagedValueType);
        // Transitive: a value type holding a managed value type.
        assert_eq!(kind(&catalog, "MyGame.Wrapper"), TypeKind::ManagedValueType);
    }

    #[test]
    fn generic_value_type_depends_on_arguments() {
        let catalog = catalog();
        assert_eq!(kind(&catalog, "MyGame.Pair<float>"), TypeKind::FullValueType);
        assert_eq!(kind(&catalog, "MyGame.Pair<string>"), TypeKind::ManagedValueType);
    }

    #[test]
    fn self_referential_value_type_is_managed() {
        let mut catalog = catalog();
        catalog
            .register(
                TypeShape::value_type("MyGame.Loop")
                    .field("MyGame.Loop Next")
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(kind(&catalog, "MyGame.Loop"), TypeKind::ManagedValueType);
    }

    #[test]
    fn nested_generic_arguments() {
        let mut catalog = catalog();
        catalog
            .register(
                TypeShape::generic_value_type("MyGame.Node", &["T"])
                    .field("T Value")
                    .unwrap(),
            )
            .unwrap();
        assert_eq!(
            kind(&catalog, "MyGame.Node<MyGame.Node<int>>"),
            TypeKind::FullValueType
        );
    }

    #[test]
    fn classification_is_deterministic() {
        let catalog = catalog();
        let classifier = Classifier::new(&catalog);
        let ty = TypeRef::parse("MyGame.Transform").unwrap();
        let first = classifier.classify(&ty).unwrap();
        let second = classifier.classify(&ty).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, classify(&catalog, &ty).unwrap());
    }

    #[test]
    fn errors() {
        let catalog = catalog();
        assert!(matches!(
            classify(&catalog, &TypeRef::named("MyGame.Missing")),
            Err(GenerationError::TypeNotFound { .. })
        ));
        assert!(classify(&catalog, &TypeRef::generic("T")).is_err());
    }

    #[test]
    fn enum_descriptor_carries_underlying() {
        let catalog = catalog();
        let classifier = Classifier::new(&catalog);
        let desc = classifier.describe(&TypeRef::named("MyGame.Mode")).unwrap();
        assert_eq!(desc.kind, TypeKind::Enum);
        assert_eq!(desc.primitive, Some(PrimitiveKind::Byte));
    }
}
