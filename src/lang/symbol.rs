use arcstr::ArcStr;
use indexmap::IndexSet;

/// An interned identifier. The wrapped index doubles as the attribute key ID
/// inside the net, so the canonical ordering of attribute spines is the
/// interning order of their keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(pub(crate) u32);

impl Symbol {
    pub fn id(self) -> u32 {
        self.0
    }
}

/// Append-only interning table mapping names to stable [`Symbol`]s. Once
/// assigned, an ID never changes and never aliases a different name; the
/// table lives for the whole backend lifetime, across heap resets.
#[derive(Default)]
pub struct SymbolTable {
    names: IndexSet<ArcStr>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(index) = self.names.get_index_of(name) {
            return Symbol(index as u32);
        }
        let (index, _) = self.names.insert_full(ArcStr::from(name));
        Symbol(index as u32)
    }

    pub fn resolve(&self, symbol: Symbol) -> &str {
        self.names
            .get_index(symbol.0 as usize)
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    pub(crate) fn from_id(&self, id: u32) -> Option<Symbol> {
        if (id as usize) < self.names.len() {
            Some(Symbol(id))
        } else {
            None
        }
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
    fn interning_is_stable() {
        let mut table = SymbolTable::new();
        let a = table.intern("alpha");
        let b = table.intern("beta");
        assert_ne!(a, b);
        assert_eq!(table.intern("alpha"), a);
        assert_eq!(table.resolve(b), "beta");
        // interning more names never disturbs earlier IDs
        for i in 0..100 {
            table.intern(&format!("extra{}", i));
        }
        assert_eq!(table.intern("alpha"), a);
        assert_eq!(table.intern("beta"), b);
    }
}
