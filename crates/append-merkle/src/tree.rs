//! The Merkle tree engine: the stateful object combining the column store
//! with a global offset, a retention window, a lazily-materialized root,
//! and the hash function.
//!
//! This module carries the "hard part" of this crate:
//! the incremental hash carry on insertion, the `rhs` carry cache that lets
//! a root (or a path) be recomputed without rebuilding the tree, and the
//! flush/retract window primitives. The algorithms are transcribed
//! directly from the HACL* `MerkleTree.c` reference this crate tracks.

use crate::digest::Digest;
use crate::hash::{default_hash_fun, HashFn};
use crate::path::Path;
use crate::store::{ColumnStore, LEVELS};

/// `offset_range_limit = 2^32 - 1`: the largest `global_idx - offset` that
/// path/index operations will accept.
pub const OFFSET_RANGE_LIMIT: u64 = u32::MAX as u64;

/// Round `k` down to the nearest even number: the local index of the
/// left-most leaf that level-0 parity pairing would group `k` with.
#[inline]
#[must_use]
pub const fn offset_of(k: u32) -> u32 {
    k & !1
}

/// The append-only Merkle tree engine.
///
/// See the module doc comment for the field invariants this type
/// maintains between every public operation.
pub struct Tree {
    hash_size: u32,
    offset: u64,
    i: u32,
    j: u32,
    hs: ColumnStore,
    rhs_ok: bool,
    rhs: Vec<Digest>,
    mroot: Digest,
    hash_fun: HashFn,
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("hash_size", &self.hash_size)
            .field("offset", &self.offset)
            .field("i", &self.i)
            .field("j", &self.j)
            .field("rhs_ok", &self.rhs_ok)
            .finish_non_exhaustive()
    }
}

impl Tree {
    /// Create a tree with the default hash function (SHA-256, 32-byte
    /// digests) and a single initial leaf.
    #[must_use]
    pub fn create(initial_leaf: &Digest) -> Self {
        Self::create_custom(
            crate::hash::DEFAULT_HASH_SIZE,
            initial_leaf,
            default_hash_fun(),
        )
    }

    /// Create a tree with a caller-supplied digest size and hash function.
    ///
    /// `hash_fun` is not part of the wire format: a deserialized tree
    /// always takes its hash function from the caller,
    /// never from the byte stream.
    #[must_use]
    pub fn create_custom(hash_size: u32, initial_leaf: &Digest, hash_fun: HashFn) -> Self {
        let mut hs = ColumnStore::new();
        hs.push(0, initial_leaf.clone());
        Self {
            hash_size,
            offset: 0,
            i: 0,
            j: 1,
            hs,
            rhs_ok: false,
            rhs: (0..LEVELS).map(|_| Digest::zero(hash_size as usize)).collect(),
            mroot: Digest::zero(hash_size as usize),
            hash_fun,
        }
    }

    #[inline]
    #[must_use]
    pub fn hash_size(&self) -> u32 {
        self.hash_size
    }

    #[inline]
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[inline]
    #[must_use]
    pub fn i(&self) -> u32 {
        self.i
    }

    #[inline]
    #[must_use]
    pub fn j(&self) -> u32 {
        self.j
    }

    /// `true` exactly when `mroot`/`rhs` are known to match the current
    /// logical leaf range (set by [`Tree::get_root`], cleared by
    /// [`Tree::insert`] and [`Tree::retract_to`]).
    #[inline]
    #[must_use]
    pub fn is_root_cached(&self) -> bool {
        self.rhs_ok
    }

    /// Direct, read-only access to a materialized level, mostly useful for
    /// tests and the serialization codec.
    #[inline]
    #[must_use]
    pub fn level(&self, level: usize) -> &[Digest] {
        self.hs.get(level)
    }

    // ---------------------------------------------------------------
    // Insert
    // ---------------------------------------------------------------

    /// Total predicate for [`Tree::insert`].
    #[must_use]
    pub fn insert_pre(&self, _leaf: &Digest) -> bool {
        self.j < u32::MAX
            && self
                .offset
                .checked_add(u64::from(self.j))
                .and_then(|v| v.checked_add(1))
                .is_some()
    }

    /// Append a new leaf, carrying the hash up through every level the new
    /// leaf completes a pair at.
    ///
    /// # Panics
    /// Panics if [`Tree::insert_pre`] does not hold for `leaf`.
    pub fn insert(&mut self, leaf: &Digest) {
        assert!(self.insert_pre(leaf), "insert precondition violated");
        tracing::trace!(j = self.j, "merkle insert");

        self.hs.push(0, leaf.clone());
        let mut acc = leaf.clone();
        let mut jc = self.j;
        let mut level = 0usize;
        while jc % 2 == 1 {
            let sibling = {
                let lvl = self.hs.get(level);
                lvl[lvl.len() - 2].clone()
            };
            let mut next = Digest::zero(self.hash_size as usize);
            (self.hash_fun.as_ref())(sibling.as_bytes(), acc.as_bytes(), next.as_bytes_mut());
            acc = next;
            self.hs.push(level + 1, acc.clone());
            level += 1;
            jc /= 2;
        }
        self.j += 1;
        self.rhs_ok = false;
    }

    // ---------------------------------------------------------------
    // Root retrieval
    // ---------------------------------------------------------------

    /// Total predicate for [`Tree::get_root`] (always holds).
    #[inline]
    #[must_use]
    pub fn get_root_pre(&self) -> bool {
        true
    }

    /// Return the current Merkle root over the retained leaf window,
    /// recomputing the `rhs` carry cache if it is stale.
    #[must_use]
    pub fn get_root(&mut self) -> Digest {
        if self.rhs_ok {
            return self.mroot.clone();
        }
        tracing::debug!(i = self.i, j = self.j, "recomputing merkle root (rhs cache miss)");
        self.construct_rhs()
    }

    /// Walk the retained window bottom-up, populating `rhs[0..32]` with
    /// the carry values a future path extraction needs to complete the
    /// rightmost spine.
    fn construct_rhs(&mut self) -> Digest {
        let hash_size = self.hash_size as usize;
        let mut level = 0usize;
        let mut i = self.i;
        let mut j = self.j;
        let mut acc = Digest::zero(hash_size);
        let mut actd = false;

        while j != 0 {
            let ofs = offset_of(i);
            if j % 2 == 0 {
                level += 1;
                i /= 2;
                j /= 2;
            } else {
                let h = self.hs.get(level)[(j - 1 - ofs) as usize].clone();
                if actd {
                    self.rhs[level] = acc.clone();
                    let mut next = Digest::zero(hash_size);
                    (self.hash_fun.as_ref())(h.as_bytes(), acc.as_bytes(), next.as_bytes_mut());
                    acc = next;
                } else {
                    acc = h;
                    actd = true;
                }
                level += 1;
                i /= 2;
                j /= 2;
            }
        }

        self.mroot = acc.clone();
        self.rhs_ok = true;
        acc
    }

    // ---------------------------------------------------------------
    // Path extraction / verification
    // ---------------------------------------------------------------

    /// Total predicate for [`Tree::get_path`].
    #[must_use]
    pub fn get_path_pre(&self, idx: u64) -> bool {
        if idx < self.offset {
            return false;
        }
        let k = idx - self.offset;
        if k > OFFSET_RANGE_LIMIT {
            return false;
        }
        let k = k as u32;
        self.i <= k && k < self.j
    }

    /// Extract an inclusion path for leaf `idx`, refreshing the root cache
    /// along the way.
    ///
    /// Returns `(path, root, snapshot_j)`; `snapshot_j` is the value
    /// [`Tree::verify`] must be given as `max = offset + snapshot_j` to
    /// check this exact path.
    ///
    /// # Panics
    /// Panics if [`Tree::get_path_pre`] does not hold for `idx`.
    pub fn get_path(&mut self, idx: u64) -> (Path, Digest, u32) {
        assert!(self.get_path_pre(idx), "get_path precondition violated");
        let root = self.get_root();

        let k0 = (idx - self.offset) as u32;
        let ofs0 = offset_of(self.i);
        let mut path: Path = Vec::new();
        path.push(self.hs.get(0)[(k0 - ofs0) as usize].clone());

        let mut level = 0usize;
        let mut i = self.i;
        let mut j = self.j;
        let mut k = k0;
        let mut actd = false;
        let snapshot = j;

        while j != 0 {
            let ofs = offset_of(i);
            if k % 2 == 1 {
                path.push(self.hs.get(level)[(k - 1 - ofs) as usize].clone());
            } else if k == j {
                // target is the odd rightmost leaf at this frame: nothing to add.
            } else if k + 1 == j {
                if actd {
                    path.push(self.rhs[level].clone());
                }
            } else {
                path.push(self.hs.get(level)[(k + 1 - ofs) as usize].clone());
            }

            level += 1;
            i /= 2;
            j /= 2;
            k /= 2;
            actd = actd || j % 2 == 1;
        }

        (path, root, snapshot)
    }

    /// Total predicate for [`Tree::verify`].
    #[must_use]
    pub fn verify_pre(&self, tgt: u64, max: u64, path: &[Digest]) -> bool {
        if tgt >= max || tgt < self.offset || max < self.offset {
            return false;
        }
        let k = tgt - self.offset;
        let j = max - self.offset;
        if k > OFFSET_RANGE_LIMIT || j > OFFSET_RANGE_LIMIT {
            return false;
        }
        path.len() as u64 == 1 + u64::from(path_length(k as u32, j as u32, false))
    }

    /// Recompute a root from `path` and compare it against `root` in
    /// constant time.
    ///
    /// # Panics
    /// Panics if [`Tree::verify_pre`] does not hold for the arguments.
    #[must_use]
    pub fn verify(&self, tgt: u64, max: u64, path: &[Digest], root: &Digest) -> bool {
        assert!(self.verify_pre(tgt, max, path), "verify precondition violated");
        let hash_size = self.hash_size as usize;

        let mut acc = path[0].clone();
        let mut k = (tgt - self.offset) as u32;
        let mut j = (max - self.offset) as u32;
        let mut ppos = 1usize;
        let mut actd = false;

        while j != 0 {
            let nactd = actd || j % 2 == 1;
            if k % 2 == 0 {
                if !(j == k || (j == k + 1 && !actd)) {
                    let mut next = Digest::zero(hash_size);
                    (self.hash_fun.as_ref())(acc.as_bytes(), path[ppos].as_bytes(), next.as_bytes_mut());
                    acc = next;
                    ppos += 1;
                }
            } else {
                let mut next = Digest::zero(hash_size);
                (self.hash_fun.as_ref())(path[ppos].as_bytes(), acc.as_bytes(), next.as_bytes_mut());
                acc = next;
                ppos += 1;
            }
            k /= 2;
            j /= 2;
            actd = nactd;
        }

        acc == *root
    }

    // ---------------------------------------------------------------
    // Flush
    // ---------------------------------------------------------------

    /// Total predicate for [`Tree::flush`].
    #[inline]
    #[must_use]
    pub fn flush_pre(&self) -> bool {
        self.j > self.i
    }

    /// Retain only the last inserted leaf.
    ///
    /// # Panics
    /// Panics if [`Tree::flush_pre`] does not hold.
    pub fn flush(&mut self) {
        assert!(self.flush_pre(), "flush precondition violated");
        self.flush_to(self.offset + u64::from(self.j - 1));
    }

    /// Total predicate for [`Tree::flush_to`].
    #[must_use]
    pub fn flush_to_pre(&self, new_idx: u64) -> bool {
        if new_idx < self.offset {
            return false;
        }
        let k = new_idx - self.offset;
        if k > OFFSET_RANGE_LIMIT {
            return false;
        }
        let k = k as u32;
        k >= self.i && k < self.j
    }

    /// Discard leaves with global index `< new_idx`, narrowing higher
    /// levels to match.
    ///
    /// The `rhs` cache is left exactly as it was: flushing never changes
    /// the logical leaf range `[offset_of(i) + offset, j + offset)`, so a
    /// previously-valid root stays valid.
    ///
    /// # Panics
    /// Panics if [`Tree::flush_to_pre`] does not hold for `new_idx`.
    pub fn flush_to(&mut self, new_idx: u64) {
        assert!(self.flush_to_pre(new_idx), "flush_to precondition violated");
        tracing::trace!(new_idx, "merkle flush_to");

        let new_i = (new_idx - self.offset) as u32;
        let mut pi = self.i;
        let mut ni = new_i;
        for level in 0..LEVELS {
            let opi = offset_of(pi);
            let oi = offset_of(ni);
            if oi == opi {
                break;
            }
            self.hs.shift_left(level, (oi - opi) as usize);
            pi /= 2;
            ni /= 2;
        }
        self.i = new_i;
    }

    // ---------------------------------------------------------------
    // Retract
    // ---------------------------------------------------------------

    /// Total predicate for [`Tree::retract_to`].
    #[must_use]
    pub fn retract_to_pre(&self, r: u64) -> bool {
        if r < self.offset {
            return false;
        }
        let k = r - self.offset;
        if k > OFFSET_RANGE_LIMIT {
            return false;
        }
        let k = k as u32;
        self.i <= k && k < self.j
    }

    /// Truncate the logical leaf set so the highest retained global index
    /// is `r`. The leaf at `r` remains in the tree.
    ///
    /// # Panics
    /// Panics if [`Tree::retract_to_pre`] does not hold for `r`.
    pub fn retract_to(&mut self, r: u64) {
        assert!(self.retract_to_pre(r), "retract_to precondition violated");
        tracing::trace!(r, "merkle retract_to");

        let r1 = (r - self.offset) as u32;
        let new_j = r1 + 1;
        let mut i_at = self.i;
        let mut s = new_j;
        for level in 0..LEVELS {
            let ofs = offset_of(i_at);
            self.hs.shrink(level, (s - ofs) as usize);
            i_at /= 2;
            s /= 2;
        }
        self.j = new_j;
        self.rhs_ok = false;
    }

    /// Raw field access used only by the serialization codec.
    pub(crate) fn raw_parts(
        &self,
    ) -> (u32, u64, u32, u32, &ColumnStore, bool, &[Digest], &Digest) {
        (
            self.hash_size,
            self.offset,
            self.i,
            self.j,
            &self.hs,
            self.rhs_ok,
            &self.rhs,
            &self.mroot,
        )
    }

    /// Reconstruct a tree from raw, already-validated parts. Used only by
    /// the deserializer.
    pub(crate) fn from_raw_parts(
        hash_size: u32,
        offset: u64,
        i: u32,
        j: u32,
        hs: ColumnStore,
        rhs_ok: bool,
        rhs: Vec<Digest>,
        mroot: Digest,
        hash_fun: HashFn,
    ) -> Self {
        Self {
            hash_size,
            offset,
            i,
            j,
            hs,
            rhs_ok,
            rhs,
            mroot,
            hash_fun,
        }
    }
}

/// The `mt_path_length`/`mt_path_length_step` recursion from the HACL*
/// reference, reused by both [`Tree::get_path_pre`] (implicitly, via its
/// length expectation) and [`Tree::verify_pre`].
#[must_use]
pub fn path_length(k: u32, j: u32, actd: bool) -> u32 {
    if j == 0 {
        return 0;
    }
    let nactd = actd || j % 2 == 1;
    path_length_step(k, j, actd) + path_length(k / 2, j / 2, nactd)
}

fn path_length_step(k: u32, j: u32, actd: bool) -> u32 {
    if j == 0 {
        return 0;
    }
    if k % 2 == 0 {
        u32::from(!(j == k || (j == k + 1 && !actd)))
    } else {
        1
    }
}

/// Structural invariant check used by the deserializer: `j >= i`, and
/// `offset + j` fits in a `u64`.
#[must_use]
pub(crate) fn merkle_tree_conditions(offset: u64, i: u32, j: u32) -> bool {
    j >= i && offset.checked_add(u64::from(j)).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u8) -> Digest {
        let mut bytes = [0u8; 32];
        bytes[31] = n;
        Digest::from_slice(&bytes)
    }

    #[test]
    fn single_leaf_root_is_the_leaf() {
        let l0 = leaf(1);
        let mut t = Tree::create(&l0);
        assert_eq!(t.get_root(), l0);
    }

    #[test]
    fn two_leaves_root_is_their_hash() {
        let l0 = leaf(1);
        let l1 = leaf(2);
        let mut t = Tree::create(&l0);
        t.insert(&l1);
        let mut expected = Digest::zero(32);
        crate::hash::sha256_compress(l0.as_bytes(), l1.as_bytes(), expected.as_bytes_mut());
        assert_eq!(t.get_root(), expected);
    }

    #[test]
    fn get_root_is_idempotent() {
        let mut t = Tree::create(&leaf(1));
        t.insert(&leaf(2));
        t.insert(&leaf(3));
        let r1 = t.get_root();
        assert!(t.is_root_cached());
        let r2 = t.get_root();
        assert_eq!(r1, r2);
    }

    #[test]
    fn insert_invalidates_root_cache() {
        let mut t = Tree::create(&leaf(1));
        let _ = t.get_root();
        assert!(t.is_root_cached());
        t.insert(&leaf(2));
        assert!(!t.is_root_cached());
    }

    #[test]
    fn path_round_trips_through_verify() {
        let mut t = Tree::create(&leaf(1));
        for n in 2..=7u8 {
            t.insert(&leaf(n));
        }
        for idx in 0..7u64 {
            let (path, root, max) = t.get_path(idx);
            assert!(t.verify(idx, u64::from(max), &path, &root));
        }
    }

    #[test]
    fn tampered_path_fails_verification() {
        let mut t = Tree::create(&leaf(1));
        t.insert(&leaf(2));
        t.insert(&leaf(3));
        let (mut path, root, max) = t.get_path(2);
        let last = path.len() - 1;
        let mut bytes = path[last].as_bytes().to_vec();
        bytes[0] ^= 0xFF;
        path[last] = Digest::from_slice(&bytes);
        assert!(!t.verify(2, u64::from(max), &path, &root));
    }

    #[test]
    fn flush_preserves_root() {
        let mut t = Tree::create(&leaf(1));
        for n in 2..=8u8 {
            t.insert(&leaf(n));
        }
        let before = t.get_root();
        t.flush_to(5);
        let after = t.get_root();
        assert_eq!(before, after);
        assert!(!t.get_path_pre(4));
        let (path, root, max) = t.get_path(5);
        assert!(t.verify(5, u64::from(max), &path, &root));
    }

    #[test]
    fn flush_idempotent() {
        let mut t = Tree::create(&leaf(1));
        for n in 2..=8u8 {
            t.insert(&leaf(n));
        }
        t.flush_to(4);
        let snapshot_i = t.i();
        t.flush_to(4);
        assert_eq!(t.i(), snapshot_i);
    }

    #[test]
    fn retract_then_root_matches_shorter_tree() {
        let mut t = Tree::create(&leaf(1));
        for n in 2..=8u8 {
            t.insert(&leaf(n));
        }
        t.retract_to(4);
        assert_eq!(t.j(), 5);

        let mut shorter = Tree::create(&leaf(1));
        for n in 2..=5u8 {
            shorter.insert(&leaf(n));
        }
        assert_eq!(t.get_root(), shorter.get_root());
        assert!(!t.get_path_pre(5));
    }
}
