//! Deterministic hash-based identity for types and members.
//!
//! [`TypeHash`] is a 64-bit hash computed from names and signatures. The two
//! emission targets are generated independently, so identity must never depend
//! on registration order: the same name always produces the same hash.
//!
//! Uses XXHash64 with domain-specific mixing constants so a type and a member
//! sharing a name never collide.
//!
//! # Examples
//!
//! ```
//! use crossbind_core::TypeHash;
//!
//! let a = TypeHash::from_name("System.Int32");
//! assert_eq!(a, TypeHash::from_name("System.Int32"));
//!
//! let list = TypeHash::from_name("System.Collections.Generic.List`1");
//! let ints = TypeHash::from_generic_instance(list, &[a]);
//! let again = TypeHash::from_generic_instance(list, &[a]);
//! assert_eq!(ints, again);
//! ```

use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Domain-specific mixing constants for hash computation.
pub mod hash_constants {
    /// Separator constant for chained components
    pub const SEP: u64 = 0x4bc94d6bd06053ad;

    /// Domain marker for type hashes
    pub const TYPE: u64 = 0x2fac10b63a6cc57c;

    /// Domain marker for member hashes
    pub const MEMBER: u64 = 0x7d3c8b4a92e15f6d;

    /// Domain marker for constructor hashes
    pub const CONSTRUCTOR: u64 = 0x9a7f3d5e2b8c4601;

    /// Parameter position mixing constants.
    /// Each position gets its own constant so argument order matters.
    pub const PARAM_MARKERS: [u64; 16] = [
        0x9e3779b97f4a7c15,
        0xbf58476d1ce4e5b9,
        0x94d049bb133111eb,
        0xd6e8feb86659fd93,
        0xe7037ed1a0b428db,
        0xc6a4a7935bd1e995,
        0x8648dbbc94d49b8d,
        0xa2b48b2c69e0d657,
        0x7c3e9f2a5b8d1403,
        0x5d8c7b4a3e9f2106,
        0x3f1e9d8c7b5a4203,
        0x1a2b3c4d5e6f7089,
        0x9f8e7d6c5b4a3210,
        0x2468ace013579bdf,
        0xfdb97531eca86420,
        0x123456789abcdef0,
    ];
}

/// A deterministic 64-bit hash identifying a type or a member.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// Empty/invalid hash constant.
    pub const EMPTY: TypeHash = TypeHash(0);

    /// Create a type hash from a qualified type name.
    #[inline]
    pub fn from_name(name: &str) -> Self {
        TypeHash(hash_constants::TYPE ^ xxh64(name.as_bytes(), 0))
    }

    /// Create a member hash from the owner, the member name and parameter type hashes.
    ///
    /// Parameter order matters: `(int, float)` differs from `(float, int)`.
    #[inline]
    pub fn from_member(owner: TypeHash, name: &str, param_hashes: &[TypeHash]) -> Self {
        let seed = hash_constants::MEMBER ^ owner.0 ^ xxh64(name.as_bytes(), 0);
        TypeHash(mix_ordered(seed, param_hashes))
    }

    /// Create a constructor hash from the owner and parameter type hashes.
    #[inline]
    pub fn from_constructor(owner: TypeHash, param_hashes: &[TypeHash]) -> Self {
        TypeHash(mix_ordered(hash_constants::CONSTRUCTOR ^ owner.0, param_hashes))
    }

    /// Create a generic instance hash from the definition hash and type argument hashes.
    ///
    /// `Dictionary<int, string>` hashes differently from `Dictionary<string, int>`.
    #[inline]
    pub fn from_generic_instance(definition: TypeHash, args: &[TypeHash]) -> Self {
        TypeHash(mix_ordered(definition.0, args))
    }

    /// Check if this is an empty/invalid hash.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Get the underlying u64 value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

fn mix_ordered(seed: u64, parts: &[TypeHash]) -> u64 {
    let mut hash = seed;
    for (i, part) in parts.iter().enumerate() {
        let marker = hash_constants::PARAM_MARKERS
            .get(i)
            .copied()
            .unwrap_or_else(|| hash_constants::PARAM_MARKERS[0].wrapping_add(i as u64));
        // wrapping_mul keeps this non-commutative, unlike a plain XOR fold
        hash = hash.wrapping_mul(hash_constants::SEP).wrapping_add(marker ^ part.0);
    }
    hash
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(TypeHash::from_name("MyGame.Calc"), TypeHash::from_name("MyGame.Calc"));
        assert_ne!(TypeHash::from_name("MyGame.Calc"), TypeHash::from_name("MyGame.Calc2"));
    }

    #[test]
    fn member_param_order_matters() {
        let owner = TypeHash::from_name("MyGame.Calc");
        let int = TypeHash::from_name("System.Int32");
        let float = TypeHash::from_name("System.Single");
        let a = TypeHash::from_member(owner, "Mix", &[int, float]);
        let b = TypeHash::from_member(owner, "Mix", &[float, int]);
        assert_ne!(a, b);
    }

    #[test]
    fn member_and_constructor_domains_differ() {
        let owner = TypeHash::from_name("MyGame.Calc");
        assert_ne!(
            TypeHash::from_member(owner, "", &[]),
            TypeHash::from_constructor(owner, &[])
        );
    }

    #[test]
    fn generic_instance_order_matters() {
        let dict = TypeHash::from_name("System.Collections.Generic.Dictionary`2");
        let int = TypeHash::from_name("System.Int32");
        let string = TypeHash::from_name("System.String");
        assert_ne!(
            TypeHash::from_generic_instance(dict, &[int, string]),
            TypeHash::from_generic_instance(dict, &[string, int])
        );
    }

    #[test]
    fn empty_hash() {
        assert!(TypeHash::EMPTY.is_empty());
        assert!(!TypeHash::from_name("x").is_empty());
    }
}
