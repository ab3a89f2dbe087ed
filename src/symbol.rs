//! Process-wide (per-`Interpreter`) name-to-index map.
//!
//! Two identical identifier names always resolve to the same `Symbol`.
//! Each anonymous `fn` literal occurrence gets a fresh, distinct `Symbol`
//! that no textual lookup can ever produce.
use std::collections::HashMap;

/// A small integer identifying a name (or an anonymous `fn` occurrence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Rebuild a `Symbol` from a raw slot index. Used by `FrameStack` when
    /// snapshotting a frame's occupied slots for closure capture, where we
    /// only have the index, not the name that produced it.
    pub(crate) fn from_raw(index: usize) -> Self {
        Symbol(index as u32)
    }
}

/// The minimum capacity the table is expected to hold before growing,
/// per the spec's "capacity >= 64" floor. The table itself grows
/// without bound; this only sizes the initial allocation.
const INITIAL_CAPACITY: usize = 64;

#[derive(Debug, Default)]
pub struct SymbolTable {
    by_name: HashMap<String, Symbol>,
    names: Vec<Option<String>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            by_name: HashMap::with_capacity(INITIAL_CAPACITY),
            names: Vec::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Return the symbol for `name`, interning it if this is the first
    /// time it has been seen.
    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(symbol) = self.by_name.get(name) {
            return *symbol;
        }
        let symbol = Symbol(self.names.len() as u32);
        self.names.push(Some(name.to_owned()));
        self.by_name.insert(name.to_owned(), symbol);
        symbol
    }

    /// Allocate a fresh symbol with no backing name, used for anonymous
    /// `fn` literal occurrences. Never returned by `intern`.
    pub fn fresh(&mut self) -> Symbol {
        let symbol = Symbol(self.names.len() as u32);
        self.names.push(None);
        symbol
    }

    pub fn name(&self, symbol: Symbol) -> Option<&str> {
        self.names.get(symbol.index())?.as_deref()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_same_symbol() {
        let mut table = SymbolTable::new();
        let a = table.intern("foo");
        let b = table.intern("foo");
        assert_eq!(a, b);
    }

    #[test]
    fn different_names_different_symbols() {
        let mut table = SymbolTable::new();
        let a = table.intern("foo");
        let b = table.intern("bar");
        assert_ne!(a, b);
    }

    #[test]
    fn fresh_symbols_are_unique_and_unnamed() {
        let mut table = SymbolTable::new();
        let a = table.fresh();
        let b = table.fresh();
        assert_ne!(a, b);
        assert_eq!(table.name(a), None);
    }
}
