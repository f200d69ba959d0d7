use alloc::vec;
use alloc::vec::Vec;

const WORD_BITS: usize = 64;

/// Fixed-length dense bitset, one row of a [`MatrixGraph`].
///
/// Bit `i` lives in word `i / 64` at position `i % 64`. Bits past `len`
/// are always zero.
///
/// [`MatrixGraph`]: crate::graph::matrix::MatrixGraph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BitSet {
    words: Vec<u64>,
    len: usize,
}

impl BitSet {
    #[must_use]
    pub fn zeros(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD_BITS)],
            len,
        }
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&word| word == 0)
    }

    /// # Panics
    ///
    /// Panics if `index >= len`.
    #[must_use]
    pub fn get(&self, index: usize) -> bool {
        assert!(index < self.len, "bit {index} out of range ({})", self.len);
        (self.words[index / WORD_BITS] >> (index % WORD_BITS)) & 1 == 1
    }

    /// Sets bit `index`, returning `true` if it was clear.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn insert(&mut self, index: usize) -> bool {
        assert!(index < self.len, "bit {index} out of range ({})", self.len);
        let word = &mut self.words[index / WORD_BITS];
        let mask = 1_u64 << (index % WORD_BITS);
        let was_clear = *word & mask == 0;
        *word |= mask;
        was_clear
    }

    /// `self |= other`. Returns `true` if any bit changed.
    ///
    /// # Panics
    ///
    /// Panics if the lengths differ.
    pub fn union_with(&mut self, other: &Self) -> bool {
        assert_eq!(self.len, other.len, "bitset length mismatch");
        let mut changed = false;
        for (word, &other_word) in self.words.iter_mut().zip(&other.words) {
            let merged = *word | other_word;
            changed |= merged != *word;
            *word = merged;
        }
        changed
    }

    #[must_use]
    pub fn count_ones(&self) -> usize {
        self.words
            .iter()
            .map(|word| word.count_ones() as usize)
            .sum()
    }

    /// Indices of set bits in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(word_index, &word)| {
                let mut remaining = word;
                core::iter::from_fn(move || {
                    if remaining == 0 {
                        return None;
                    }
                    let bit = remaining.trailing_zeros() as usize;
                    remaining &= remaining - 1;
                    Some(word_index * WORD_BITS + bit)
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_iterate() {
        let mut bits = BitSet::zeros(130);
        assert!(bits.is_empty());
        assert!(bits.insert(0));
        assert!(bits.insert(64));
        assert!(bits.insert(129));
        assert!(!bits.insert(64));
        assert!(bits.get(129));
        assert!(!bits.get(128));
        assert_eq!(bits.count_ones(), 3);
        assert_eq!(bits.ones().collect::<Vec<_>>(), vec![0, 64, 129]);
    }

    #[test]
    fn test_union_with() {
        let mut a = BitSet::zeros(70);
        let mut b = BitSet::zeros(70);
        a.insert(1);
        b.insert(69);
        assert!(a.union_with(&b));
        assert!(!a.union_with(&b));
        assert_eq!(a.ones().collect::<Vec<_>>(), vec![1, 69]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range() {
        let bits = BitSet::zeros(3);
        let _ = bits.get(3);
    }
}
