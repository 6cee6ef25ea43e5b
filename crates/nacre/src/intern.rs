//! Symbol interning.
//!
//! Symbols are stable `u32` handles into an [`Interner`]. Equality is
//! identity equality on the handle, and the `Ord` impl follows insertion
//! order: it is stable within one interner but carries no semantic meaning
//! beyond usability as a map key.

use ahash::AHashMap;

/// Interned identifier handle.
///
/// Uses `u32` to keep `Symbol`-carrying enums small; four billion distinct
/// identifiers is far more than any program will produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Symbol(u32);

impl Symbol {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Storage for interned identifier strings.
///
/// The lookup map is rebuilt from the string table on deserialization, so
/// handles stay valid across a `dump`/`load` round trip.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(from = "Vec<Box<str>>", into = "Vec<Box<str>>")]
pub struct Interner {
    strings: Vec<Box<str>>,
    lookup: AHashMap<Box<str>, u32>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a string, returning the existing handle if already present.
    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(&id) = self.lookup.get(name) {
            return Symbol(id);
        }
        let id = u32::try_from(self.strings.len()).expect("interner overflow");
        self.strings.push(name.into());
        self.lookup.insert(name.into(), id);
        Symbol(id)
    }

    /// Returns the handle for a string that is already interned.
    pub fn get(&self, name: &str) -> Option<Symbol> {
        self.lookup.get(name).map(|&id| Symbol(id))
    }

    pub fn resolve(&self, symbol: Symbol) -> &str {
        &self.strings[symbol.index()]
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl From<Vec<Box<str>>> for Interner {
    fn from(strings: Vec<Box<str>>) -> Self {
        let lookup = strings
            .iter()
            .enumerate()
            .map(|(id, s)| (s.clone(), id as u32))
            .collect();
        Self { strings, lookup }
    }
}

impl From<Interner> for Vec<Box<str>> {
    fn from(interner: Interner) -> Self {
        interner.strings
    }
}
