use super::tag;
use crate::lang::value::Accessor;
use super::string::StringTable;
use crate::net::{NetError, Runtime, Term};

/// Interns opaque accessor identities, so a path value can carry its source
/// tree through the net as a small ID. Append-only, identity-based, alive
/// for the backend's lifetime. No filesystem access happens during
/// compilation or reduction, only when the host consumes the extracted path.
#[derive(Default)]
pub struct AccessorRegistry {
    entries: Vec<Accessor>,
}

impl AccessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, accessor: &Accessor) -> u32 {
        for (index, known) in self.entries.iter().enumerate() {
            if known.same(accessor) {
                return index as u32;
            }
        }
        self.entries.push(accessor.clone());
        (self.entries.len() - 1) as u32
    }

    pub fn resolve(&self, id: u32) -> Option<&Accessor> {
        self.entries.get(id as usize)
    }
}

/// `Pth{accessor id, path string id}`, both resolved through the side
/// tables.
pub fn build(
    rt: &mut Runtime,
    registry: &mut AccessorRegistry,
    strings: &mut StringTable,
    accessor: &Accessor,
    path: &str,
) -> Result<Term, NetError> {
    let accessor_id = registry.intern(accessor);
    let path_id = strings.intern(path);
    rt.ctr_node(tag::PTH, &[Term::num(accessor_id), Term::num(path_id)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_by_identity() {
        let mut registry = AccessorRegistry::new();
        let a = Accessor::new("/src");
        let b = Accessor::new("/src");
        let a_id = registry.intern(&a);
        let b_id = registry.intern(&b);
        assert_ne!(a_id, b_id, "equal roots, distinct identities");
        assert_eq!(registry.intern(&a.clone()), a_id);
        assert!(registry.resolve(a_id).unwrap().same(&a));
    }
}
