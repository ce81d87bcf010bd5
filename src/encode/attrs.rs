use super::tag;
use crate::net::{NetError, Runtime, Term};

/// `Ats{spine}` over `Atr{key, value}` cells kept ascending by key ID. The
/// wrapper exists so extraction and compiled pattern code can recognize an
/// attribute set without inspecting the spine.
///
/// `pairs` must already be sorted ascending by key ID; compiled merge code
/// relies on that order for its linear spine walk.
pub fn build(rt: &mut Runtime, pairs: &[(u32, Term)]) -> Result<Term, NetError> {
    debug_assert!(pairs.windows(2).all(|w| w[0].0 < w[1].0));
    let mut spine = Term::ctr0(tag::NIL);
    for (key, value) in pairs.iter().rev() {
        let pair = rt.ctr_node(tag::ATR, &[Term::num(*key), *value])?;
        spine = rt.ctr_node(tag::CON, &[pair, spine])?;
    }
    rt.ctr_node(tag::ATS, &[spine])
}
