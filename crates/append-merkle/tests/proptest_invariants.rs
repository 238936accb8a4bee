//! Property tests for the tree's universal invariants.

use append_merkle::{hash::sha256_compress, Digest, Tree};
use proptest::prelude::*;

fn leaf(n: u32) -> Digest {
    let mut bytes = [0u8; 32];
    bytes[28..].copy_from_slice(&n.to_be_bytes());
    Digest::from_slice(&bytes)
}

fn h(a: &Digest, b: &Digest) -> Digest {
    let mut out = Digest::zero(32);
    sha256_compress(a.as_bytes(), b.as_bytes(), out.as_bytes_mut());
    out
}

/// Independent reference implementation of the "odd rightmost carried
/// unpaired" Merkle root convention, used to cross-check [`Tree::get_root`]
/// without going through the tree's own incremental algorithm.
fn naive_root(leaves: &[Digest]) -> Digest {
    assert!(!leaves.is_empty());
    let mut level: Vec<Digest> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut it = level.into_iter();
        loop {
            match (it.next(), it.next()) {
                (Some(a), Some(b)) => next.push(h(&a, &b)),
                (Some(a), None) => next.push(a),
                (None, _) => break,
            }
        }
        level = next;
    }
    level.into_iter().next().expect("non-empty by construction")
}

fn leaf_count_strategy() -> impl Strategy<Value = usize> {
    1usize..40
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// P1: two successive `get_root` calls agree, and only set the cache flag.
    #[test]
    fn p1_root_well_defined(n in leaf_count_strategy()) {
        let mut t = Tree::create(&leaf(0));
        for k in 1..n as u32 {
            t.insert(&leaf(k));
        }
        let r1 = t.get_root();
        prop_assert!(t.is_root_cached());
        let r2 = t.get_root();
        prop_assert_eq!(r1, r2);
    }

    /// P2: insert -> root consistency against an independent reference root.
    #[test]
    fn p2_insert_root_consistency(n in leaf_count_strategy()) {
        let leaves: Vec<Digest> = (0..n as u32).map(leaf).collect();
        let mut t = Tree::create(&leaves[0]);
        for l in &leaves[1..] {
            t.insert(l);
        }
        prop_assert_eq!(t.get_root(), naive_root(&leaves));
    }

    /// P3 + P4: every retained index's path verifies against the true root,
    /// and tampering any path byte or the root breaks verification.
    #[test]
    fn p3_p4_path_soundness_and_tamper_detection(n in leaf_count_strategy(), tamper_seed in any::<u8>()) {
        let mut t = Tree::create(&leaf(0));
        for k in 1..n as u32 {
            t.insert(&leaf(k));
        }

        for idx in 0..n as u64 {
            let (path, root, max) = t.get_path(idx);
            prop_assert!(t.verify(idx, u64::from(max), &path, &root));

            if !path.is_empty() {
                let victim = (tamper_seed as usize) % path.len();
                let mut tampered = path.clone();
                let mut bytes = tampered[victim].as_bytes().to_vec();
                bytes[0] ^= 0xFF;
                tampered[victim] = Digest::from_slice(&bytes);
                prop_assert!(!t.verify(idx, u64::from(max), &tampered, &root));
            }

            let mut bad_root_bytes = root.as_bytes().to_vec();
            bad_root_bytes[0] ^= 0xFF;
            let bad_root = Digest::from_slice(&bad_root_bytes);
            prop_assert!(!t.verify(idx, u64::from(max), &path, &bad_root));
        }
    }

    /// P6: repeating a flush_to at the same cutoff is a no-op, and flush
    /// never changes the root.
    #[test]
    fn p6_flush_idempotent_and_root_preserving(n in 2usize..40, cut in 0usize..39) {
        let n = n.max(2);
        let cut = cut % n;
        let mut t = Tree::create(&leaf(0));
        for k in 1..n as u32 {
            t.insert(&leaf(k));
        }
        let root_before = t.get_root();

        t.flush_to(cut as u64);
        let i_after_first = t.i();
        let root_after_first = t.get_root();

        t.flush_to(cut as u64);
        prop_assert_eq!(t.i(), i_after_first);
        prop_assert_eq!(t.get_root(), root_after_first);
        prop_assert_eq!(root_after_first, root_before);
    }

    /// P7: retract_to(r) leaves j - offset == r - offset + 1, and every
    /// surviving index still verifies against the refreshed root.
    #[test]
    fn p7_retract_monotone(n in 2usize..40, cut in 0usize..39) {
        let n = n.max(2);
        let cut = cut % n;
        let mut t = Tree::create(&leaf(0));
        for k in 1..n as u32 {
            t.insert(&leaf(k));
        }

        t.retract_to(cut as u64);
        prop_assert_eq!(u64::from(t.j()), cut as u64 + 1);

        if cut + 1 < n {
            prop_assert!(!t.get_path_pre(cut as u64 + 1));
        }

        for idx in 0..=cut as u64 {
            let (path, root, max) = t.get_path(idx);
            prop_assert!(t.verify(idx, u64::from(max), &path, &root));
        }
    }
}
