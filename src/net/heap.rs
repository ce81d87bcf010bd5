use super::runtime::NetError;
use super::term::Term;

/// Index of a heap slot. Slot 0 is reserved; allocation starts at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot(pub(crate) u32);

impl Slot {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn offset(self, n: u32) -> Slot {
        Slot(self.0 + n)
    }
}

/// The term heap: one flat, preallocated array of words. Multi-field nodes
/// occupy consecutive slots starting at the index in their term's value
/// field. There is no incremental collection; the whole arena is reclaimed
/// at once by [`Heap::reset`], which is only correct because each compiled
/// unit is self-contained and discarded after one evaluation.
pub struct Heap {
    words: Vec<Term>,
    top: u32,
}

impl Heap {
    pub fn with_capacity(words: usize) -> Self {
        let words = words.max(2).min(u32::MAX as usize);
        Self {
            words: vec![Term::EMPTY; words],
            top: 1,
        }
    }

    /// Allocates `n` consecutive slots. Running past capacity is a hard,
    /// recoverable error, mapped to a fallback by the orchestrator.
    pub fn alloc(&mut self, n: u32) -> Result<Slot, NetError> {
        let start = self.top;
        let end = start as u64 + n as u64;
        if end > self.words.len() as u64 {
            return Err(NetError::HeapOverflow);
        }
        self.top = end as u32;
        Ok(Slot(start))
    }

    pub fn get(&self, slot: Slot) -> Term {
        self.words[slot.index()]
    }

    pub fn set(&mut self, slot: Slot, term: Term) {
        self.words[slot.index()] = term;
    }

    /// Words currently in use, for the cumulative statistics.
    pub fn used(&self) -> u32 {
        self.top
    }

    pub fn capacity(&self) -> usize {
        self.words.len()
    }

    /// Zero-fills everything allocated so far and rewinds the allocator.
    pub fn reset(&mut self) {
        for word in &mut self.words[..self.top as usize] {
            *word = Term::EMPTY;
        }
        self.top = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::term::Tag;

    #[test]
    fn alloc_is_consecutive_and_reserves_slot_zero() {
        let mut heap = Heap::with_capacity(16);
        let a = heap.alloc(2).unwrap();
        let b = heap.alloc(1).unwrap();
        assert_eq!(a.index(), 1);
        assert_eq!(b.index(), 3);
    }

    #[test]
    fn overflow_is_recoverable() {
        let mut heap = Heap::with_capacity(4);
        assert!(heap.alloc(3).is_ok());
        assert!(matches!(heap.alloc(1), Err(NetError::HeapOverflow)));
        // the failed allocation did not move the top
        assert_eq!(heap.used(), 4);
    }

    #[test]
    fn reset_zero_fills() {
        let mut heap = Heap::with_capacity(8);
        let slot = heap.alloc(2).unwrap();
        heap.set(slot, Term::num(42));
        heap.reset();
        assert_eq!(heap.used(), 1);
        assert_eq!(heap.get(slot).tag(), Tag::Free);
        // the arena is reusable after reset
        let again = heap.alloc(2).unwrap();
        assert_eq!(again.index(), 1);
    }
}
