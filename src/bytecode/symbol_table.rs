//! Symbol resolution across nested lexical scopes.
//!
//! Tables form a tree mirroring nested function literals. Resolution walks
//! outward; a hit in an enclosing *function* scope is promoted to a Free
//! symbol in every table between the use and the definition, which is how
//! closures (and closures inside closures) know exactly what to capture.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::builtins::BUILTINS;

/// Where a symbol lives at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Free,
    Builtin,
}

/// A resolved name: its scope kind and its dense index within that scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

/// One scope's name bindings, linked to the enclosing scope's table.
#[derive(Debug, Default)]
pub struct SymbolTable {
    outer: Option<Rc<RefCell<SymbolTable>>>,
    store: HashMap<String, Symbol>,
    /// Count of `define` calls; the next definition's index. Shadowing a
    /// name still burns a fresh index.
    pub num_definitions: usize,
    /// The original (enclosing-scope) symbols behind this table's Free
    /// symbols, in promotion order.
    pub free_symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A root table with every builtin pre-registered at its registry index.
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            table.define_builtin(index, builtin.name);
        }
        table
    }

    /// A table nested inside `outer` (one per function literal).
    pub fn enclosed(outer: Rc<RefCell<SymbolTable>>) -> Self {
        Self {
            outer: Some(outer),
            ..Self::default()
        }
    }

    pub fn outer(&self) -> Option<Rc<RefCell<SymbolTable>>> {
        self.outer.clone()
    }

    /// Define a name in this table: Global in the root, Local elsewhere.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_none() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };
        self.num_definitions += 1;
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Register a builtin under its registry index.
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Resolve a name, promoting enclosing-function locals to Free symbols.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }

        let outer = self.outer.clone()?;
        let symbol = outer.borrow_mut().resolve(name)?;
        match symbol.scope {
            // Globals and builtins are visible everywhere as-is.
            SymbolScope::Global | SymbolScope::Builtin => Some(symbol),
            // A local (or already-free) name of an enclosing function must
            // be captured here.
            SymbolScope::Local | SymbolScope::Free => Some(self.define_free(symbol)),
        }
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        self.free_symbols.push(original.clone());
        let symbol = Symbol {
            name: original.name.clone(),
            scope: SymbolScope::Free,
            index: self.free_symbols.len() - 1,
        };
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }
}
