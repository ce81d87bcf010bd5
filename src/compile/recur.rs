//! The target has no named recursion, so recursive spine walks (attribute
//! lookup, merge, list append) are encoded as a self-applying fixed point: a
//! one-argument "self" lambda is duplicated and applied to itself. This is
//! the one place that pattern lives; everything recursive is built on it.

use super::emit::Compiler;
use super::{CompileError, Result};
use crate::net::Term;

/// Hands out `(self self)` re-entry terms inside a fixed-point body. Each
/// recursion site consumes one pair of projections of the duplicated self
/// lambda; the site count is declared up front so the duplication chain is
/// sized exactly.
pub(crate) struct Recur {
    pairs: Vec<(Term, Term)>,
    next: usize,
}

impl Recur {
    /// Builds `(self self arg0 arg1 ..)` for one recursion site.
    pub fn call(&mut self, c: &mut Compiler, args: &[Term]) -> Result<Term> {
        let (s0, s1) = *self
            .pairs
            .get(self.next)
            .ok_or(CompileError::ProjectionOverflow)?;
        self.next += 1;
        let mut term = c.app(s0, s1)?;
        for arg in args {
            term = c.app(term, *arg)?;
        }
        Ok(term)
    }
}

/// Builds `F = (L L)` where `L = λself. body`, duplicating `L` once for the
/// outer self-application and the bound `self` enough times for every
/// declared recursion site in the body.
pub(crate) fn fix(
    c: &mut Compiler,
    recursion_sites: usize,
    build: impl FnOnce(&mut Compiler, &mut Recur) -> Result<Term>,
) -> Result<Term> {
    debug_assert!(recursion_sites >= 1);
    let self_slot = c.rt.alloc(1)?;
    let projections = c.dup_terms(Term::var(self_slot), 2 * recursion_sites as u32)?;
    let mut recur = Recur {
        pairs: projections
            .chunks(2)
            .map(|pair| (pair[0], pair[1]))
            .collect(),
        next: 0,
    };
    let body = build(c, &mut recur)?;
    if recur.next != recur.pairs.len() {
        return Err(CompileError::ProjectionUnderflow);
    }
    c.rt.set(self_slot, body);
    let copies = c.dup_terms(Term::lam(self_slot), 2)?;
    c.app(copies[0], copies[1])
}
