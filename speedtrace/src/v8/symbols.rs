//! Address to symbol lookup for V8 code objects.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Kind of code object a symbol names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SymbolType {
    Builtin,
    CallDebugBreak,
    CallDebugPrepareStepIn,
    CallIC,
    CallInitialize,
    CallMegamorphic,
    CallMiss,
    CallNormal,
    CallPreMonomorphic,
    Callback,
    Eval,
    Function,
    KeyedCallIC,
    KeyedLoadIC,
    KeyedStoreIC,
    LazyCompile,
    LoadIC,
    RegExp,
    Script,
    StoreIC,
    Stub,
}

impl SymbolType {
    pub const ALL: [SymbolType; 21] = [
        SymbolType::Builtin,
        SymbolType::CallDebugBreak,
        SymbolType::CallDebugPrepareStepIn,
        SymbolType::CallIC,
        SymbolType::CallInitialize,
        SymbolType::CallMegamorphic,
        SymbolType::CallMiss,
        SymbolType::CallNormal,
        SymbolType::CallPreMonomorphic,
        SymbolType::Callback,
        SymbolType::Eval,
        SymbolType::Function,
        SymbolType::KeyedCallIC,
        SymbolType::KeyedLoadIC,
        SymbolType::KeyedStoreIC,
        SymbolType::LazyCompile,
        SymbolType::LoadIC,
        SymbolType::RegExp,
        SymbolType::Script,
        SymbolType::StoreIC,
        SymbolType::Stub,
    ];

    /// Name as written in `code-creation` lines.
    pub fn as_str(self) -> &'static str {
        match self {
            SymbolType::Builtin => "Builtin",
            SymbolType::CallDebugBreak => "CallDebugBreak",
            SymbolType::CallDebugPrepareStepIn => "CallDebugPrepareStepIn",
            SymbolType::CallIC => "CallIC",
            SymbolType::CallInitialize => "CallInitialize",
            SymbolType::CallMegamorphic => "CallMegamorphic",
            SymbolType::CallMiss => "CallMiss",
            SymbolType::CallNormal => "CallNormal",
            SymbolType::CallPreMonomorphic => "CallPreMonomorphic",
            SymbolType::Callback => "Callback",
            SymbolType::Eval => "Eval",
            SymbolType::Function => "Function",
            SymbolType::KeyedCallIC => "KeyedCallIC",
            SymbolType::KeyedLoadIC => "KeyedLoadIC",
            SymbolType::KeyedStoreIC => "KeyedStoreIC",
            SymbolType::LazyCompile => "LazyCompile",
            SymbolType::LoadIC => "LoadIC",
            SymbolType::RegExp => "RegExp",
            SymbolType::Script => "Script",
            SymbolType::StoreIC => "StoreIC",
            SymbolType::Stub => "Stub",
        }
    }
}

/// A named code object covering `[address, address + size]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    /// `None` when the creating line used an unknown type name.
    pub symbol_type: Option<SymbolType>,
    pub address: u64,
    pub size: u64,
}

impl Symbol {
    pub fn new(name: impl Into<String>, symbol_type: Option<SymbolType>, address: u64, size: u64) -> Self {
        Self {
            name: name.into(),
            symbol_type,
            address,
            size,
        }
    }

    /// Last address covered. Spans are inclusive at both ends.
    pub fn end(&self) -> u64 {
        self.address.saturating_add(self.size)
    }

    pub fn contains(&self, address: u64) -> bool {
        self.address <= address && address <= self.end()
    }

    fn overlaps(&self, start: u64, end: u64) -> bool {
        self.address <= end && start <= self.end()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}-{}", self.name, self.address, self.end())
    }
}

/// Non-overlapping set of symbols keyed by start address.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: BTreeMap<u64, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Inserts `symbol`, evicting anything its span overlaps.
    ///
    /// Returns true if something was evicted.
    pub fn add(&mut self, symbol: Symbol) -> bool {
        let (start, end) = (symbol.address, symbol.end());
        let evicted: Vec<u64> = self
            .symbols
            .range(..=end)
            .rev()
            .take_while(|(_, existing)| existing.overlaps(start, end))
            .map(|(key, _)| *key)
            .collect();
        for key in &evicted {
            self.symbols.remove(key);
        }
        self.symbols.insert(start, symbol);
        !evicted.is_empty()
    }

    /// The symbol whose span covers `address`.
    pub fn lookup(&self, address: u64) -> Option<&Symbol> {
        self.symbols
            .range(..=address)
            .next_back()
            .map(|(_, symbol)| symbol)
            .filter(|symbol| symbol.contains(address))
    }

    /// Removes and returns the symbol covering `address`.
    pub fn remove(&mut self, address: u64) -> Option<Symbol> {
        let key = self.lookup(address)?.address;
        self.symbols.remove(&key)
    }

    /// Moves the symbol covering `from` so that it starts at `to`.
    ///
    /// Returns false if nothing covers `from`.
    pub fn move_symbol(&mut self, from: u64, to: u64) -> bool {
        match self.remove(from) {
            Some(mut symbol) => {
                symbol.address = to;
                self.add(symbol);
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SymbolTable {
        let mut table = SymbolTable::new();
        assert!(!table.add(Symbol::new("test1", None, 100, 10)));
        assert!(!table.add(Symbol::new("test2", None, 120, 5)));
        assert!(!table.add(Symbol::new("test3", None, 90, 5)));
        table
    }

    #[test]
    fn lookup_within_inclusive_spans() {
        let table = table();
        let name = |addr| table.lookup(addr).map(|s| s.name.as_str());

        assert_eq!(name(100), Some("test1"));
        assert_eq!(name(101), Some("test1"));
        assert_eq!(name(110), Some("test1"));
        assert_eq!(name(120), Some("test2"));
        assert_eq!(name(121), Some("test2"));
        assert_eq!(name(125), Some("test2"));
        assert_eq!(name(90), Some("test3"));
        assert_eq!(name(94), Some("test3"));
        assert_eq!(name(95), Some("test3"));

        for miss in [50, 96, 99, 111, 119, 126, 1000] {
            assert_eq!(name(miss), None, "address {} should miss", miss);
        }
    }

    #[test]
    fn display_shows_span() {
        assert_eq!(Symbol::new("test1", None, 100, 10).to_string(), "test1 : 100-110");
    }

    #[test]
    fn add_evicts_overlapping() {
        let mut table = table();
        assert!(table.add(Symbol::new("wide", Some(SymbolType::Stub), 105, 20)));
        assert_eq!(table.len(), 2);
        assert!(table.lookup(100).is_none());
        assert_eq!(table.lookup(110).unwrap().name, "wide");
        assert_eq!(table.lookup(92).unwrap().name, "test3");
    }

    #[test]
    fn remove_and_move() {
        let mut table = table();
        assert_eq!(table.remove(103).map(|s| s.name), Some("test1".to_string()));
        assert!(table.lookup(100).is_none());
        assert!(table.remove(103).is_none());

        assert!(table.move_symbol(122, 500));
        assert!(table.lookup(120).is_none());
        let moved = table.lookup(503).unwrap();
        assert_eq!(moved.name, "test2");
        assert_eq!(moved.size, 5);
        assert!(!table.move_symbol(122, 600));
    }
}
