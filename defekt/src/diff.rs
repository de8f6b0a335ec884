// Copyright 2024-2025 The defekt developers
// released under BSD 3-Clause License
//! # Differential comparison
//! Compares two otherwise-identical injection dictionaries bit for bit to
//! detect fault propagation: one dictionary belongs to a golden simulation
//! instance, the other to the faulted one. Both sides are read only.

use crate::dictionary::Dictionary;
use crate::{DefektError, Result};

/// One detected difference: the entry, the differing storage word, and the
/// non-zero XOR value. For array-packed entries the word index is the
/// element index; for word-extended entries the word offset within the
/// element is folded in, so a wide element contributes one triplet per
/// non-zero word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffTriplet {
    pub target: usize,
    pub element: usize,
    pub xor: u64,
}

/// A differential view over two same-shaped dictionaries.
pub struct DictDiff<'a> {
    lhs: &'a Dictionary,
    rhs: &'a Dictionary,
}

impl<'a> DictDiff<'a> {
    pub fn new(lhs: &'a Dictionary, rhs: &'a Dictionary) -> Result<Self> {
        if lhs.len() != rhs.len() {
            return Err(DefektError::ShapeMismatch(format!(
                "{} vs {} entries",
                lhs.len(),
                rhs.len()
            )));
        }
        for (l, r) in lhs.iter().zip(rhs.iter()) {
            if !l.same_shape(r) {
                return Err(DefektError::ShapeMismatch(format!(
                    "entry `{}` vs `{}`",
                    l.name(),
                    r.name()
                )));
            }
        }
        Ok(DictDiff { lhs, rhs })
    }

    pub fn len(&self) -> usize {
        self.lhs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lhs.is_empty()
    }

    /// XOR of the storage words of entry `target`.
    pub fn diff_target(&self, target: usize) -> Vec<u64> {
        let l = self.lhs.get(target).expect("target in range");
        let r = self.rhs.get(target).expect("target in range");
        l.data()
            .iter()
            .zip(r.data().iter())
            .map(|(a, b)| a ^ b)
            .collect()
    }

    /// All non-zero differences across both dictionaries.
    pub fn compute_diff_vector(&self) -> Vec<DiffTriplet> {
        let mut out = Vec::new();
        for (target, (l, r)) in self.lhs.iter().zip(self.rhs.iter()).enumerate() {
            for (word, (a, b)) in l.data().iter().zip(r.data().iter()).enumerate() {
                let xor = a ^ b;
                if xor != 0 {
                    out.push(DiffTriplet {
                        target,
                        element: word,
                        xor,
                    });
                }
            }
        }
        out
    }

    /// Walks the entries starting at `cursor`, wrapping around once, and
    /// returns the first entry whose data differs. Repeated calls with the
    /// previous hit as the new cursor scan incrementally instead of
    /// restarting from entry zero.
    pub fn compare_fast(&self, cursor: usize) -> Option<usize> {
        let n = self.lhs.len();
        if n == 0 {
            return None;
        }
        for offset in 0..n {
            let index = (cursor + offset) % n;
            let l = self.lhs.get(index).unwrap();
            let r = self.rhs.get(index).unwrap();
            if l.data() != r.data() {
                return Some(index);
            }
        }
        None
    }
}
