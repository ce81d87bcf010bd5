//! Floats are carried, not computed on: the double's bit pattern is split
//! into two 32-bit halves in a constructor, and the capability layer rejects
//! any arithmetic that would touch them, because the VM's primitives only
//! operate on 32-bit native words.

use super::tag;
use crate::net::{NetError, Runtime, Term};

pub fn encode(rt: &mut Runtime, value: f64) -> Result<Term, NetError> {
    let (lo, hi) = split(value);
    rt.ctr_node(tag::FLT, &[Term::num(lo), Term::num(hi)])
}

pub fn split(value: f64) -> (u32, u32) {
    let bits = value.to_bits();
    (bits as u32, (bits >> 32) as u32)
}

pub fn combine(lo: u32, hi: u32) -> f64 {
    f64::from_bits(((hi as u64) << 32) | lo as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_patterns_round_trip() {
        let cases = [
            0.0,
            -0.0,
            1.5,
            -2.25,
            f64::MIN_POSITIVE,
            5e-324, // subnormal
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::from_bits(0x7FF8_0000_0000_0001), // a NaN payload
        ];
        for value in cases {
            let (lo, hi) = split(value);
            assert_eq!(combine(lo, hi).to_bits(), value.to_bits());
        }
    }
}
