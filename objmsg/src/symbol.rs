//! Symbol Interning
//!
//! Message names, slot names, class names and instance names are all
//! interned once and compared by id afterwards. The handler table keeps its
//! entries ordered by [`Symbol`], so the ordering only has to be total and
//! stable for the lifetime of one [`SymbolTable`].

use string_interner::{DefaultStringInterner, DefaultSymbol};

/// An interned name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(DefaultSymbol);

/// Names the dispatch core itself sends or matches on.
///
/// These are wire-level identifiers: an embedder that installs its own
/// handlers for them must use exactly these spellings.
#[derive(Debug, Clone, Copy)]
pub struct KnownSymbols {
    pub init: Symbol,
    pub delete: Symbol,
    pub create: Symbol,
    pub print: Symbol,
    pub direct_modify: Symbol,
    pub message_modify: Symbol,
    pub direct_duplicate: Symbol,
    pub message_duplicate: Symbol,
    /// Default value of single-field slots.
    pub nil: Symbol,
    /// `*`, the wildcard accepted by handler deletion.
    pub wildcard: Symbol,
}

/// Interner for every name the engine sees.
#[derive(Debug)]
pub struct SymbolTable {
    interner: DefaultStringInterner,
    known: KnownSymbols,
}

impl SymbolTable {
    /// Creates a table with the system message names pre-interned.
    pub fn new() -> Self {
        let mut interner = DefaultStringInterner::new();
        let mut sym = |name: &str| Symbol(interner.get_or_intern(name));
        let known = KnownSymbols {
            init: sym("init"),
            delete: sym("delete"),
            create: sym("create"),
            print: sym("print"),
            direct_modify: sym("direct-modify"),
            message_modify: sym("message-modify"),
            direct_duplicate: sym("direct-duplicate"),
            message_duplicate: sym("message-duplicate"),
            nil: sym("nil"),
            wildcard: sym("*"),
        };
        Self { interner, known }
    }

    /// Interns `name`, returning the existing symbol if it was seen before.
    pub fn intern(&mut self, name: &str) -> Symbol {
        Symbol(self.interner.get_or_intern(name))
    }

    /// Looks up `name` without interning it.
    ///
    /// A name that was never interned cannot be the name of any handler,
    /// slot or instance, which lets dynamic sends fail fast.
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.interner.get(name).map(Symbol)
    }

    /// Returns the text of a symbol.
    pub fn resolve(&self, symbol: Symbol) -> &str {
        self.interner.resolve(symbol.0).unwrap_or("<unknown>")
    }

    /// The pre-interned system names.
    pub fn known(&self) -> &KnownSymbols {
        &self.known
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
