// Copyright 2022 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

use bitvec::{order::Lsb0, vec::BitVec};

/// A growable set of bit positions.
///
/// Positions are the insertion order of tracked messages and are never reused within a selection round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BitSet {
    bits: BitVec<u64, Lsb0>,
}

impl BitSet {
    /// Creates an empty set with room for `bits` positions.
    pub fn with_capacity(bits: usize) -> Self {
        Self {
            bits: BitVec::repeat(false, bits),
        }
    }

    /// Adds `bit`, growing the set as needed.
    pub fn insert(&mut self, bit: usize) {
        if bit >= self.bits.len() {
            self.bits.resize(bit + 1, false);
        }
        self.bits.set(bit, true);
    }

    /// Whether `bit` is set.
    pub fn contains(&self, bit: usize) -> bool {
        self.bits.get(bit).map_or(false, |set| *set)
    }

    /// Adds every bit of `other`.
    pub fn union_with(&mut self, other: &Self) {
        if other.bits.len() > self.bits.len() {
            self.bits.resize(other.bits.len(), false);
        }
        for bit in other.bits.iter_ones() {
            self.bits.set(bit, true);
        }
    }

    /// Removes every bit of `other`.
    pub fn difference_with(&mut self, other: &Self) {
        let len = self.bits.len();
        for bit in other.bits.iter_ones().take_while(|&bit| bit < len) {
            self.bits.set(bit, false);
        }
    }

    /// The number of set bits.
    pub fn count_ones(&self) -> usize {
        self.bits.count_ones()
    }

    /// Whether no bit is set in both sets.
    pub fn is_disjoint(&self, other: &Self) -> bool {
        other.bits.iter_ones().all(|bit| !self.contains(bit))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn grows_on_demand() {
        let mut set = BitSet::with_capacity(1);
        set.insert(0);
        set.insert(130);
        assert!(set.contains(0));
        assert!(set.contains(130));
        assert!(!set.contains(129));
        assert!(!set.contains(10_000));
        assert_eq!(set.count_ones(), 2);
    }

    #[test]
    fn union_and_difference() {
        let mut a = BitSet::default();
        a.insert(1);
        a.insert(2);
        let mut b = BitSet::default();
        b.insert(2);
        b.insert(200);

        let mut union = a.clone();
        union.union_with(&b);
        assert_eq!(union.count_ones(), 3);

        union.difference_with(&a);
        assert_eq!(union.count_ones(), 1);
        assert!(union.contains(200));
        assert!(union.is_disjoint(&a));
        assert!(!union.is_disjoint(&b));

        // Subtracting a longer set leaves the shorter one intact where they do not overlap.
        a.difference_with(&b);
        assert!(a.contains(1));
        assert!(!a.contains(2));
    }
}
