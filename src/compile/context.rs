use super::{CompileError, Result};
use crate::lang::symbol::Symbol;
use crate::net::{Runtime, Slot, Term};

/// A chain of duplication nodes making one affine value usable N times.
/// For N uses, N−1 nodes are chained: the first duplicates the original
/// binding, each subsequent one duplicates the second projection of its
/// predecessor. Of the N projections handed out, the first N−1 are first
/// projections and the last is a second projection.
///
/// The chain is a consuming source: taking more than N projections, or
/// finishing with fewer, is a compile error rather than a malformed graph.
pub(crate) struct DupChain {
    label: u32,
    nodes: Vec<Slot>,
    total: u32,
    handed: u32,
}

impl DupChain {
    pub fn build(rt: &mut Runtime, label: u32, source: Term, uses: u32) -> Result<DupChain> {
        debug_assert!(uses >= 2);
        let mut nodes = Vec::with_capacity((uses - 1) as usize);
        let mut feed = source;
        for _ in 0..uses - 1 {
            let slot = rt.alloc(1)?;
            rt.set(slot, feed);
            feed = Term::co1(label, slot);
            nodes.push(slot);
        }
        Ok(DupChain {
            label,
            nodes,
            total: uses,
            handed: 0,
        })
    }

    pub fn take(&mut self) -> Result<Term> {
        if self.handed >= self.total {
            return Err(CompileError::ProjectionOverflow);
        }
        let index = self.handed as usize;
        self.handed += 1;
        if index + 1 < self.total as usize {
            Ok(Term::co0(self.label, self.nodes[index]))
        } else {
            Ok(Term::co1(self.label, *self.nodes.last().unwrap()))
        }
    }

    pub fn finish(&self) -> Result<()> {
        if self.handed == self.total {
            Ok(())
        } else {
            Err(CompileError::ProjectionUnderflow)
        }
    }

    pub fn node_count(&self) -> u32 {
        self.nodes.len() as u32
    }
}

/// One entry on the binding stack. A binding starts in its counting state
/// (no heap slot); pass 1 accumulates `uses` only while it stays there.
/// Pass 2 assigns the slot, builds the duplication chain if the use count
/// demands one, and every reference consumes exactly one projection.
pub(crate) struct VarBinding {
    /// `None` for anonymous bindings: `with` namespaces, `inherit (e)`
    /// sources, and destructured lambda arguments.
    pub symbol: Option<Symbol>,
    pub group: u32,
    pub slot: Option<Slot>,
    pub uses: u32,
    taken: u32,
    pub chain: Option<DupChain>,
}

impl VarBinding {
    pub fn counting(symbol: Option<Symbol>, group: u32) -> VarBinding {
        VarBinding {
            symbol,
            group,
            slot: None,
            uses: 0,
            taken: 0,
            chain: None,
        }
    }

    /// A binding born with its slot and chain already settled, for
    /// anonymous bindings whose use count is known statically.
    pub fn assigned(
        symbol: Option<Symbol>,
        group: u32,
        slot: Slot,
        uses: u32,
        chain: Option<DupChain>,
    ) -> VarBinding {
        VarBinding {
            symbol,
            group,
            slot: Some(slot),
            uses,
            taken: 0,
            chain,
        }
    }

    pub fn is_counting(&self) -> bool {
        self.slot.is_none()
    }

    pub fn take_ref(&mut self) -> Result<Term> {
        let slot = self
            .slot
            .ok_or(CompileError::Unsupported("reference before slot assignment"))?;
        match &mut self.chain {
            Some(chain) => chain.take(),
            None => {
                self.taken += 1;
                if self.taken > 1 {
                    return Err(CompileError::ProjectionOverflow);
                }
                Ok(Term::var(slot))
            }
        }
    }

    pub fn finish(&self) -> Result<()> {
        match &self.chain {
            Some(chain) => chain.finish(),
            None => {
                if self.taken == self.uses.min(1) && self.uses <= 1 {
                    Ok(())
                } else {
                    Err(CompileError::ProjectionUnderflow)
                }
            }
        }
    }
}

/// Per-compilation mutable state. The binding stack, the `with` stack, and
/// the `inherit`-from stack are strict LIFO: every push during emission of a
/// subexpression is matched by a pop before control returns to the parent.
/// The context lives for exactly one `compile` call.
pub(crate) struct CompileContext {
    pub scope: Vec<VarBinding>,
    pub withs: Vec<VarBinding>,
    /// For each binding group currently being emitted, the scope indices of
    /// its `inherit (e)` source bindings.
    pub inherit_froms: Vec<Vec<usize>>,
    next_label: u32,
    next_group: u32,
    /// Duplication nodes allocated so far, for observability and tests.
    pub dup_nodes: u32,
}

impl CompileContext {
    pub fn new() -> CompileContext {
        CompileContext {
            scope: Vec::new(),
            withs: Vec::new(),
            inherit_froms: Vec::new(),
            next_label: 1,
            next_group: 1,
            dup_nodes: 0,
        }
    }

    pub fn fresh_label(&mut self) -> u32 {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    pub fn fresh_group(&mut self) -> u32 {
        let group = self.next_group;
        self.next_group += 1;
        group
    }

    /// Innermost lexical binding for `symbol`, optionally skipping one
    /// group (used by `inherit name;`, which rebinds from outside its own
    /// group).
    pub fn lookup_mut(&mut self, symbol: Symbol, skip: Option<u32>) -> Option<&mut VarBinding> {
        self.scope
            .iter_mut()
            .rev()
            .find(|b| b.symbol == Some(symbol) && Some(b.group) != skip)
    }

    pub fn is_lexically_bound(&self, symbol: Symbol) -> bool {
        self.scope
            .iter()
            .rev()
            .any(|b| b.symbol == Some(symbol))
    }
}
