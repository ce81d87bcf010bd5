use arcstr::ArcStr;
use indexmap::IndexSet;

use super::tag;
use crate::net::{NetError, Runtime, Term};

/// Append-only table interning string content once and referring to it by a
/// stable small ID from then on. Unlike the heap, it survives resets and
/// lives for the backend's whole lifetime.
#[derive(Default)]
pub struct StringTable {
    entries: IndexSet<ArcStr>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, content: &str) -> u32 {
        if let Some(index) = self.entries.get_index_of(content) {
            return index as u32;
        }
        let (index, _) = self.entries.insert_full(ArcStr::from(content));
        index as u32
    }

    pub fn resolve(&self, id: u32) -> Option<ArcStr> {
        self.entries.get_index(id as usize).cloned()
    }
}

/// A literal: interned once, referenced by ID.
pub fn literal(rt: &mut Runtime, table: &mut StringTable, content: &str) -> Result<Term, NetError> {
    let id = table.intern(content);
    rt.ctr_node(tag::STR, &[Term::num(id)])
}

/// A lazy 2-ary concatenation, resolved only during result extraction by a
/// recursive flattening walk.
pub fn concat(rt: &mut Runtime, left: Term, right: Term) -> Result<Term, NetError> {
    rt.ctr_node(tag::CAT, &[left, right])
}

/// A number-to-string coercion wrapper, rendered at extraction.
pub fn coerce(rt: &mut Runtime, value: Term) -> Result<Term, NetError> {
    rt.ctr_node(tag::N2S, &[value])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_and_deduplicated() {
        let mut table = StringTable::new();
        let a = table.intern("hello");
        let b = table.intern("world");
        assert_ne!(a, b);
        assert_eq!(table.intern("hello"), a);
        assert_eq!(table.resolve(b).unwrap().as_str(), "world");
        assert_eq!(table.resolve(999), None);
    }
}
