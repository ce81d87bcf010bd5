//! Host integers are 64-bit and signed; the VM's scalar is a 32-bit word.
//! Values that fit i32 become native numbers directly, bit-reinterpreted as
//! signed. Anything wider becomes a 2-field constructor holding the 64-bit
//! magnitude split in halves, positive and negative separately, so compiled
//! comparison code can order the categories as
//! `Neg{} < small negative < small non-negative < Pos{}`.

use super::tag;
use crate::net::{NetError, Runtime, Term};

/// XOR-ing both operands with this bit turns native unsigned less-than into
/// signed less-than for small integers.
pub const SIGN_BIT: u32 = 0x8000_0000;

pub fn encode(rt: &mut Runtime, value: i64) -> Result<Term, NetError> {
    if let Ok(small) = i32::try_from(value) {
        return Ok(Term::num(small as u32));
    }
    let magnitude = value.unsigned_abs();
    let lo = Term::num(magnitude as u32);
    let hi = Term::num((magnitude >> 32) as u32);
    let ctor = if value < 0 { tag::NEG } else { tag::POS };
    rt.ctr_node(ctor, &[lo, hi])
}

pub fn decode_small(word: u32) -> i64 {
    word as i32 as i64
}

/// Recombines a wide integer from its constructor fields. `None` when the
/// magnitude does not fit the host's signed 64-bit range.
pub fn combine(negative: bool, lo: u32, hi: u32) -> Option<i64> {
    let magnitude = ((hi as u64) << 32) | lo as u64;
    if negative {
        if magnitude == 1u64 << 63 {
            return Some(i64::MIN);
        }
        i64::try_from(magnitude).ok().map(|m| -m)
    } else {
        i64::try_from(magnitude).ok()
    }
}
