//! Symbol tables mapping identifiers to storage locations.
//!
//! Tables nest lexically: each lambda gets a fresh table enclosing the one
//! the compiler held when it entered the lambda. Resolution walks outward,
//! and a hit in an enclosing non-global, non-builtin scope is promoted to a
//! free symbol of the current table so the closure can capture it.

use std::collections::HashMap;

/// Where a symbol's value lives at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    /// Top-level definitions, stored in the VM's globals vector.
    Global,
    /// Definitions inside a lambda, stored in the frame's stack slots.
    Local,
    /// Entries of the fixed builtin table.
    Builtin,
    /// Values captured from an enclosing scope into a closure.
    Free,
    /// The name of the lambda currently being compiled; resolves to the
    /// running closure itself, enabling recursion without a cycle.
    Function,
}

/// A defined identifier: its name, where it lives, and at which index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

/// One lexical level of name definitions.
#[derive(Debug, Default)]
pub struct SymbolTable {
    store: HashMap<String, Symbol>,
    /// Number of Global/Local definitions made in this table. This is the
    /// locals count a lambda reserves stack space for.
    pub count: usize,
    outer: Option<Box<SymbolTable>>,
    /// Symbols resolved through an enclosing scope, in capture order.
    pub free_symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table enclosed by `outer`.
    pub fn new_enclosed(outer: SymbolTable) -> Self {
        Self {
            outer: Some(Box::new(outer)),
            ..Self::default()
        }
    }

    /// Take back the enclosing table, consuming this one.
    pub fn into_outer(self) -> Option<SymbolTable> {
        self.outer.map(|outer| *outer)
    }

    pub fn is_global(&self) -> bool {
        self.outer.is_none()
    }

    /// Define an identifier at the next index of this table. Redefining a
    /// name in the same scope shadows it with a fresh index.
    pub fn define(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: if self.outer.is_none() {
                SymbolScope::Global
            } else {
                SymbolScope::Local
            },
            index: self.count,
        };

        self.store.insert(name.to_string(), symbol.clone());
        self.count += 1;

        symbol
    }

    /// Record a builtin at the caller-specified table position.
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };

        self.store.insert(name.to_string(), symbol.clone());

        symbol
    }

    /// Record the name of the lambda this table belongs to, so that the
    /// lambda body can refer to itself.
    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Function,
            index: 0,
        };

        self.store.insert(name.to_string(), symbol.clone());

        symbol
    }

    /// Resolve an identifier, walking outward through enclosing tables.
    /// A symbol found in an enclosing scope that is neither global nor
    /// builtin is converted into a free symbol of this table; the
    /// conversion is memoized by the local store.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }

        let outer_symbol = self.outer.as_mut()?.resolve(name)?;

        match outer_symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(outer_symbol),
            _ => Some(self.define_free(outer_symbol)),
        }
    }

    /// Store the enclosing scope's symbol as a free symbol of this table
    /// and hand back the local alias referring to the capture slot.
    fn define_free(&mut self, original: Symbol) -> Symbol {
        self.free_symbols.push(original.clone());

        let free = Symbol {
            name: original.name,
            scope: SymbolScope::Free,
            index: self.free_symbols.len() - 1,
        };

        self.store.insert(free.name.clone(), free.clone());

        free
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(name: &str, scope: SymbolScope, index: usize) -> Symbol {
        Symbol {
            name: name.to_string(),
            scope,
            index,
        }
    }

    #[test]
    fn test_define() {
        let mut global = SymbolTable::new();

        assert_eq!(global.define("a"), symbol("a", SymbolScope::Global, 0));
        assert_eq!(global.define("b"), symbol("b", SymbolScope::Global, 1));

        let mut first_local = SymbolTable::new_enclosed(global);

        assert_eq!(first_local.define("c"), symbol("c", SymbolScope::Local, 0));
        assert_eq!(first_local.define("d"), symbol("d", SymbolScope::Local, 1));

        let mut second_local = SymbolTable::new_enclosed(first_local);

        assert_eq!(second_local.define("e"), symbol("e", SymbolScope::Local, 0));
        assert_eq!(second_local.define("f"), symbol("f", SymbolScope::Local, 1));
    }

    #[test]
    fn test_redefinition_shadows_with_fresh_index() {
        let mut global = SymbolTable::new();

        global.define("a");
        assert_eq!(global.define("a"), symbol("a", SymbolScope::Global, 1));
        assert_eq!(global.resolve("a"), Some(symbol("a", SymbolScope::Global, 1)));
        assert_eq!(global.count, 2);
    }

    #[test]
    fn test_resolve_global_through_nested_scopes() {
        let mut global = SymbolTable::new();
        global.define("a");
        global.define("b");

        let mut first_local = SymbolTable::new_enclosed(global);
        first_local.define("c");

        let mut second_local = SymbolTable::new_enclosed(first_local);
        second_local.define("e");

        assert_eq!(
            second_local.resolve("a"),
            Some(symbol("a", SymbolScope::Global, 0))
        );
        assert_eq!(
            second_local.resolve("b"),
            Some(symbol("b", SymbolScope::Global, 1))
        );
        assert_eq!(
            second_local.resolve("e"),
            Some(symbol("e", SymbolScope::Local, 0))
        );
        assert_eq!(second_local.resolve("missing"), None);
    }

    #[test]
    fn test_define_and_resolve_builtins() {
        let mut global = SymbolTable::new();

        let expected = [
            symbol("a", SymbolScope::Builtin, 0),
            symbol("b", SymbolScope::Builtin, 1),
            symbol("e", SymbolScope::Builtin, 2),
            symbol("f", SymbolScope::Builtin, 3),
        ];

        for (i, sym) in expected.iter().enumerate() {
            global.define_builtin(i, &sym.name);
        }

        let mut second_local = SymbolTable::new_enclosed(SymbolTable::new_enclosed(global));

        for sym in &expected {
            assert_eq!(second_local.resolve(&sym.name), Some(sym.clone()));
        }
    }

    #[test]
    fn test_resolve_free() {
        let mut global = SymbolTable::new();
        global.define("a");
        global.define("b");

        let mut first_local = SymbolTable::new_enclosed(global);
        first_local.define("c");
        first_local.define("d");

        let mut second_local = SymbolTable::new_enclosed(first_local);
        second_local.define("e");
        second_local.define("f");

        // Enclosing locals surface as free symbols here.
        assert_eq!(
            second_local.resolve("c"),
            Some(symbol("c", SymbolScope::Free, 0))
        );
        assert_eq!(
            second_local.resolve("d"),
            Some(symbol("d", SymbolScope::Free, 1))
        );

        // Globals and locals resolve without being captured.
        assert_eq!(
            second_local.resolve("a"),
            Some(symbol("a", SymbolScope::Global, 0))
        );
        assert_eq!(
            second_local.resolve("f"),
            Some(symbol("f", SymbolScope::Local, 1))
        );

        assert_eq!(
            second_local.free_symbols,
            vec![
                symbol("c", SymbolScope::Local, 0),
                symbol("d", SymbolScope::Local, 1),
            ]
        );

        // Memoized: resolving again does not append another free symbol.
        second_local.resolve("c");
        assert_eq!(second_local.free_symbols.len(), 2);

        assert_eq!(second_local.resolve("g"), None);
    }

    #[test]
    fn test_define_function_name() {
        let mut table = SymbolTable::new_enclosed(SymbolTable::new());

        table.define_function_name("recurse");

        assert_eq!(
            table.resolve("recurse"),
            Some(symbol("recurse", SymbolScope::Function, 0))
        );
    }

    #[test]
    fn test_shadowing_function_name() {
        let mut table = SymbolTable::new_enclosed(SymbolTable::new());

        table.define_function_name("name");
        table.define("name");

        assert_eq!(
            table.resolve("name"),
            Some(symbol("name", SymbolScope::Local, 0))
        );
    }
}
