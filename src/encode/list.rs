use super::tag;
use crate::net::{NetError, Runtime, Term};

/// `Lst{length, spine}` over a `Nil | Con{head, tail}` spine. The length is
/// cached so queries stay O(1); concatenation rebuilds only the cons cells
/// and recomputes the cached length as the sum of both operands.
pub fn build(rt: &mut Runtime, elements: &[Term]) -> Result<Term, NetError> {
    let mut spine = Term::ctr0(tag::NIL);
    for element in elements.iter().rev() {
        spine = rt.ctr_node(tag::CON, &[*element, spine])?;
    }
    rt.ctr_node(tag::LST, &[Term::num(elements.len() as u32), spine])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{RuntimeOptions, Tag};

    #[test]
    fn spine_preserves_order_and_caches_length() {
        let mut rt = Runtime::new(RuntimeOptions::default());
        let list = build(&mut rt, &[Term::num(1), Term::num(2), Term::num(3)]).unwrap();
        assert_eq!(list.ext(), tag::LST);
        assert_eq!(rt.get(list.slot()).val(), 3);
        let mut spine = rt.get(list.slot().offset(1));
        let mut seen = vec![];
        while spine.ext() == tag::CON {
            seen.push(rt.get(spine.slot()).val());
            spine = rt.get(spine.slot().offset(1));
        }
        assert_eq!(spine.ext(), tag::NIL);
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn empty_list_is_a_bare_nil_spine() {
        let mut rt = Runtime::new(RuntimeOptions::default());
        let list = build(&mut rt, &[]).unwrap();
        assert_eq!(rt.get(list.slot()).val(), 0);
        assert_eq!(rt.get(list.slot().offset(1)).tag(), Tag::Ctr);
        assert_eq!(rt.get(list.slot().offset(1)).ext(), tag::NIL);
    }
}
