//! Interned symbols.
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

use smol_str::SmolStr;

/// An interned identifier.
///
/// Two symbols with the same name are the same symbol: interning maps a
/// name to a canonical id, so equality is identity comparison. The
/// intern table lives for the whole process (one per thread).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Symbol(u32);

impl Symbol {
    /// Get the interned symbol for `name`, creating it if needed.
    pub fn intern(name: impl AsRef<str>) -> Symbol {
        SYMBOLS.with(|table| table.borrow_mut().intern(name.as_ref()))
    }

    /// The symbol's name.
    pub fn name(self) -> SmolStr {
        SYMBOLS.with(|table| table.borrow().name(self))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<symbol {}>", self.name())
    }
}

thread_local! {
    static SYMBOLS: RefCell<SymbolTable> = RefCell::new(SymbolTable::new());
}

struct SymbolTable {
    names: Vec<SmolStr>,
    ids: HashMap<SmolStr, u32>,
}

impl SymbolTable {
    fn new() -> Self {
        Self {
            names: Vec::new(),
            ids: HashMap::new(),
        }
    }

    fn intern(&mut self, name: &str) -> Symbol {
        match self.ids.get(name) {
            Some(&id) => Symbol(id),
            None => {
                let id = self.names.len() as u32;
                let name = SmolStr::from(name);
                self.names.push(name.clone());
                self.ids.insert(name, id);
                Symbol(id)
            }
        }
    }

    fn name(&self, symbol: Symbol) -> SmolStr {
        self.names[symbol.0 as usize].clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_intern_identity() {
        // Any two interns of the same name yield the identical symbol.
        let a = Symbol::intern("foo");
        let b = Symbol::intern("foo");
        assert_eq!(a, b);

        let c = Symbol::intern("bar");
        assert_ne!(a, c);
    }

    #[test]
    fn test_name_round_trip() {
        let sym = Symbol::intern("list->vector");
        assert_eq!(sym.name(), "list->vector");
        assert_eq!(sym.to_string(), "list->vector");
    }
}
