//! Generic instantiation cache.
//!
//! There are no native generics: every requested argument tuple becomes its
//! own closed type or method with its own symbols. The cache keys an
//! instantiation by the definition's hash and the argument hashes, so a
//! tuple requested twice is bound once and yields the same symbols.

use rustc_hash::FxHashMap;

use crossbind_core::{TypeHash, TypeRef};

/// Outcome of [`InstantiationCache::instantiate_type`] and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instantiation {
    /// First request for this tuple.
    New(TypeHash),
    /// Already bound; the caller skips it.
    Duplicate(TypeHash),
}

impl Instantiation {
    pub fn hash(self) -> TypeHash {
        match self {
            Instantiation::New(h) | Instantiation::Duplicate(h) => h,
        }
    }

    pub fn is_duplicate(self) -> bool {
        matches!(self, Instantiation::Duplicate(_))
    }
}

/// Maps (definition, args) to the instance hash.
#[derive(Debug, Default, Clone)]
pub struct InstantiationCache {
    types: FxHashMap<(TypeHash, Vec<TypeHash>), TypeHash>,
    methods: FxHashMap<(TypeHash, Vec<TypeHash>), TypeHash>,
}

fn arg_hashes(args: &[TypeRef]) -> Vec<TypeHash> {
    args.iter().map(TypeRef::type_hash).collect()
}

fn intern(
    map: &mut FxHashMap<(TypeHash, Vec<TypeHash>), TypeHash>,
    definition: TypeHash,
    args: &[TypeRef],
) -> Instantiation {
    let args = arg_hashes(args);
    if let Some(existing) = map.get(&(definition, args.clone())) {
        return Instantiation::Duplicate(*existing);
    }
    let instance = TypeHash::from_generic_instance(definition, &args);
    map.insert((definition, args), instance);
    Instantiation::New(instance)
}

impl InstantiationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a closed generic type.
    pub fn instantiate_type(&mut self, definition: TypeHash, args: &[TypeRef]) -> Instantiation {
        intern(&mut self.types, definition, args)
    }

    /// Record a closed generic method. `definition` is the open member's hash.
    pub fn instantiate_method(&mut self, definition: TypeHash, args: &[TypeRef]) -> Instantiation {
        intern(&mut self.methods, definition, args)
    }

    pub fn type_instance(&self, definition: TypeHash, args: &[TypeRef]) -> Option<TypeHash> {
        self.types.get(&(definition, arg_hashes(args))).copied()
    }

    pub fn type_instance_count(&self) -> usize {
        self.types.len()
    }

    pub fn method_instance_count(&self) -> usize {
        self.methods.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbind_core::PrimitiveKind;

    fn list() -> TypeHash {
        TypeHash::from_name("System.Collections.Generic.List`1")
    }

    #[test]
    fn second_request_is_duplicate() {
        let mut cache = InstantiationCache::new();
        let int = [TypeRef::primitive(PrimitiveKind::Int32)];
        let first = cache.instantiate_type(list(), &int);
        let second = cache.instantiate_type(list(), &int);
        assert!(!first.is_duplicate());
        assert!(second.is_duplicate());
        assert_eq!(first.hash(), second.hash());
        assert_eq!(cache.type_instance_count(), 1);
        assert_eq!(cache.type_instance(list(), &int), Some(first.hash()));
    }

    #[test]
    fn different_args_are_distinct() {
        let mut cache = InstantiationCache::new();
        let a = cache.instantiate_type(list(), &[TypeRef::primitive(PrimitiveKind::Int32)]);
        let b = cache.instantiate_type(list(), &[TypeRef::named("System.String")]);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn methods_and_types_are_separate() {
        let mut cache = InstantiationCache::new();
        let int = [TypeRef::primitive(PrimitiveKind::Int32)];
        cache.instantiate_type(list(), &int);
        assert!(!cache.instantiate_method(list(), &int).is_duplicate());
        assert_eq!(cache.method_instance_count(), 1);
    }
}
