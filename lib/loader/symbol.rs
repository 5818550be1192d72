//! Symbols and the symbol-table collaborator interface.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A named address within an image.
#[derive(Clone, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Symbol {
    address: u64,
    name: String,
}

impl Symbol {
    /// Create a new `Symbol`.
    pub fn new<S: Into<String>>(name: S, address: u64) -> Symbol {
        Symbol {
            name: name.into(),
            address,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> u64 {
        self.address
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} -> {:X}", self.name, self.address)
    }
}

/// A name-to-address table populated by the symbol-loading operations.
///
/// How duplicate names are resolved is the table's policy, not the
/// loader's. The map implementations below keep the last insertion.
pub trait SymbolTable {
    fn insert(&mut self, name: &str, address: u64);
}

impl SymbolTable for BTreeMap<String, u64> {
    fn insert(&mut self, name: &str, address: u64) {
        BTreeMap::insert(self, name.to_string(), address);
    }
}

impl SymbolTable for FxHashMap<String, u64> {
    fn insert(&mut self, name: &str, address: u64) {
        FxHashMap::insert(self, name.to_string(), address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_impls_insert() {
        let mut tree: BTreeMap<String, u64> = BTreeMap::new();
        SymbolTable::insert(&mut tree, "main", 0x400000);
        assert_eq!(tree["main"], 0x400000);

        let mut map: FxHashMap<String, u64> = FxHashMap::default();
        SymbolTable::insert(&mut map, "main", 0x400000);
        SymbolTable::insert(&mut map, "main", 0x400010);
        assert_eq!(map["main"], 0x400010);
    }

    #[test]
    fn symbol_display() {
        let symbol = Symbol::new("memcpy", 0x8048000);
        assert_eq!(symbol.to_string(), "memcpy -> 8048000");
    }
}
