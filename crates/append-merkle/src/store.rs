//! The two-level column store: a fixed outer sequence of 32 inner digest
//! vectors, one per tree level, leaves at level 0.

use crate::digest::{Digest, DigestVec};

/// Number of levels a [`ColumnStore`] always carries. `u32`/`u64` leaf
/// indices mean 32 levels is always enough headroom (`2^32` leaves fit in
/// levels `0..32`).
pub const LEVELS: usize = 32;

/// Owns every materialised node digest, indexed by level.
///
/// Level `L` holds the currently-retained nodes at height `L` (leaves at
/// `L = 0`). Bounds are a programmer error: out-of-range levels panic
/// rather than returning a recoverable error, matching the reference's
/// "abort with diagnostic" policy for layer-internal misuse.
#[derive(Clone, Debug, Default)]
pub struct ColumnStore {
    levels: [DigestVec; LEVELS],
}

impl ColumnStore {
    /// A fresh store with every level empty.
    #[must_use]
    pub fn new() -> Self {
        Self {
            levels: std::array::from_fn(|_| Vec::new()),
        }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, level: usize) -> &DigestVec {
        &self.levels[level]
    }

    #[inline]
    pub fn get_mut(&mut self, level: usize) -> &mut DigestVec {
        &mut self.levels[level]
    }

    /// Append an owned digest onto `level`.
    pub fn push(&mut self, level: usize, digest: Digest) {
        self.levels[level].push(digest);
    }

    /// Drop the first `ofs` elements of `level`, shifting the remainder
    /// down to index 0. A no-op for `ofs == 0`; equivalent to clearing the
    /// level when `ofs` is at least its current length.
    pub fn shift_left(&mut self, level: usize, ofs: usize) {
        let v = &mut self.levels[level];
        if ofs == 0 {
            return;
        }
        if ofs >= v.len() {
            v.clear();
            return;
        }
        v.drain(0..ofs);
    }

    /// Truncate `level` down to `new_sz` elements, dropping (and dropping
    /// the owned storage of) anything beyond it.
    pub fn shrink(&mut self, level: usize, new_sz: usize) {
        let v = &mut self.levels[level];
        if new_sz < v.len() {
            v.truncate(new_sz);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(b: u8) -> Digest {
        Digest::from_slice(&[b; 4])
    }

    #[test]
    fn shift_left_partial_and_full() {
        let mut cs = ColumnStore::new();
        for b in 0..5u8 {
            cs.push(0, d(b));
        }
        cs.shift_left(0, 2);
        assert_eq!(cs.get(0).len(), 3);
        assert_eq!(cs.get(0)[0], d(2));

        cs.shift_left(0, 100);
        assert!(cs.get(0).is_empty());
    }

    #[test]
    fn shift_left_noop_on_zero() {
        let mut cs = ColumnStore::new();
        cs.push(1, d(7));
        cs.shift_left(1, 0);
        assert_eq!(cs.get(1).len(), 1);
    }

    #[test]
    fn shrink_drops_tail() {
        let mut cs = ColumnStore::new();
        for b in 0..4u8 {
            cs.push(2, d(b));
        }
        cs.shrink(2, 2);
        assert_eq!(cs.get(2).len(), 2);
        assert_eq!(cs.get(2)[1], d(1));

        // Shrinking to a larger size than current is a no-op.
        cs.shrink(2, 10);
        assert_eq!(cs.get(2).len(), 2);
    }
}
