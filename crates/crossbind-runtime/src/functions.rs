//! Function tables and the init handshake.
//!
//! At start-up the managed side hands the native side, in a fixed order:
//!
//! ```text
//! capacity, release_object, string_new, member_0, member_1, ...
//! ```
//!
//! where `member_n` are the managed trampolines in generation order. The
//! native side checks the count and the symbols against the bindings it was
//! generated with.
//!
//! The opposite direction is resolved by name: native-invoke trampolines are
//! registered in an [`ExportTable`] under their deterministic symbol and the
//! managed side looks them up by the same string.

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::ffi::{RawEntry, RawInvoker, invoke_release_object, invoke_string_new};
use crate::{BridgeException, RuntimeContext, RuntimeError, WireValue};

/// A managed trampoline callable in-process.
pub type ManagedFn = Rc<dyn Fn(&RuntimeContext, &[WireValue]) -> WireValue>;

/// A native-invoke trampoline. An `Err` is a native exception to relay.
pub type NativeExport = Rc<dyn Fn(&RuntimeContext, &[WireValue]) -> Result<WireValue, BridgeException>>;

/// One slot of the function table.
#[derive(Clone)]
pub enum FunctionEntry {
    /// Address of an `extern "C"` trampoline and its invoker.
    Raw(RawEntry),
    /// In-process trampoline.
    Hosted(ManagedFn),
}

impl FunctionEntry {
    pub fn hosted(f: impl Fn(&RuntimeContext, &[WireValue]) -> WireValue + 'static) -> Self {
        FunctionEntry::Hosted(Rc::new(f))
    }

    pub fn is_hosted(&self) -> bool {
        matches!(self, FunctionEntry::Hosted(_))
    }
}

impl fmt::Debug for FunctionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionEntry::Raw(entry) => write!(f, "Raw({:#x})", entry.address()),
            FunctionEntry::Hosted(_) => f.write_str("Hosted(..)"),
        }
    }
}

/// Everything the managed side passes to the native init entry point.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub capacity: u32,
    pub release_object: FunctionEntry,
    pub string_new: FunctionEntry,
    /// Member trampolines in generation order, with their symbols.
    pub members: Vec<(String, FunctionEntry)>,
}

impl Handshake {
    pub fn new(capacity: u32, release_object: FunctionEntry, string_new: FunctionEntry) -> Self {
        Self {
            capacity,
            release_object,
            string_new,
            members: Vec::new(),
        }
    }

    pub fn with_member(mut self, symbol: impl Into<String>, entry: FunctionEntry) -> Self {
        self.members.push((symbol.into(), entry));
        self
    }

    /// Build from the flat pointer list an FFI caller passes: the two
    /// leading callbacks followed by one pointer per member. `invokers[n]`
    /// calls member `n`.
    ///
    /// # Safety
    ///
    /// Every pointer must be a function with the C signature its invoker
    /// calls through, valid until the context shuts down: the callbacks those
    /// of [`invoke_release_object`] and [`invoke_string_new`], member `n` the
    /// one `invokers[n]` expects.
    pub unsafe fn from_raw(
        capacity: u32,
        pointers: &[usize],
        symbols: &[&str],
        invokers: &[RawInvoker],
    ) -> Result<Self, RuntimeError> {
        let [release, string_new, members @ ..] = pointers else {
            return Err(RuntimeError::HandshakeMismatch {
                detail: format!("expected at least 2 callbacks, got {}", pointers.len()),
            });
        };
        if invokers.len() != symbols.len() {
            return Err(RuntimeError::HandshakeMismatch {
                detail: format!(
                    "{} symbols but {} invokers",
                    symbols.len(),
                    invokers.len()
                ),
            });
        }
        if members.len() != symbols.len() {
            return Err(RuntimeError::HandshakeMismatch {
                detail: format!(
                    "expected {} member pointers, got {}",
                    symbols.len(),
                    members.len()
                ),
            });
        }
        // SAFETY: the pairing of every pointer with its invoker is the
        // caller's contract.
        let raw = |address: usize, invoke: RawInvoker| {
            FunctionEntry::Raw(unsafe { RawEntry::new(address, invoke) })
        };
        Ok(Self {
            capacity,
            release_object: raw(*release, invoke_release_object),
            string_new: raw(*string_new, invoke_string_new),
            members: symbols
                .iter()
                .zip(members.iter().zip(invokers))
                .map(|(s, (p, invoke))| (s.to_string(), raw(*p, *invoke)))
                .collect(),
        })
    }
}

/// Member trampolines indexed by generation order.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    entries: Vec<FunctionEntry>,
    symbols: Vec<String>,
    by_symbol: FxHashMap<String, usize>,
}

impl FunctionTable {
    /// Validate `handshake` against the `expected` symbol list and build the table.
    pub fn from_handshake(handshake: &Handshake, expected: &[&str]) -> Result<Self, RuntimeError> {
        if handshake.members.len() != expected.len() {
            return Err(RuntimeError::HandshakeMismatch {
                detail: format!(
                    "expected {} member trampolines, got {}",
                    expected.len(),
                    handshake.members.len()
                ),
            });
        }
        let mut table = FunctionTable::default();
        for (index, ((symbol, entry), want)) in handshake.members.iter().zip(expected).enumerate() {
            if symbol != want {
                return Err(RuntimeError::HandshakeMismatch {
                    detail: format!("entry {index} is {symbol}, expected {want}"),
                });
            }
            table.by_symbol.insert(symbol.clone(), index);
            table.symbols.push(symbol.clone());
            table.entries.push(entry.clone());
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, index: usize) -> Result<&FunctionEntry, RuntimeError> {
        self.entries.get(index).ok_or(RuntimeError::FunctionIndex {
            index,
            len: self.entries.len(),
        })
    }

    pub fn symbol(&self, index: usize) -> Option<&str> {
        self.symbols.get(index).map(String::as_str)
    }

    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.by_symbol.get(symbol).copied()
    }

    /// Address of a raw entry, for generated FFI code.
    pub fn raw(&self, index: usize) -> Option<usize> {
        match self.entries.get(index)? {
            FunctionEntry::Raw(entry) => Some(entry.address()),
            FunctionEntry::Hosted(_) => None,
        }
    }
}

/// Native-invoke trampolines keyed by symbol.
#[derive(Default)]
pub struct ExportTable {
    exports: FxHashMap<String, NativeExport>,
}

impl ExportTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `export` under `symbol`, replacing any previous one.
    pub fn register(&mut self, symbol: impl Into<String>, export: NativeExport) {
        self.exports.insert(symbol.into(), export);
    }

    pub fn resolve(&self, symbol: &str) -> Result<NativeExport, RuntimeError> {
        self.exports
            .get(symbol)
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownExport {
                symbol: symbol.to_string(),
            })
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.exports.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.exports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }

    /// Registered symbols, sorted.
    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.exports.keys().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }
}

impl fmt::Debug for ExportTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportTable")
            .field("symbols", &self.symbols())
            .finish()
    }
}
