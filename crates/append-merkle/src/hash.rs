//! The hash function collaborator.
//!
//! The compression primitive is treated as an external collaborator with
//! a stated interface only: given two digests, produce one digest of the
//! same size. The default is SHA-256 over the 64-byte
//! concatenation of the two inputs; the tree engine never looks inside a
//! `HashFn`, so swapping in BLAKE3, a keyed MAC, or a test stub is just a
//! matter of providing a different closure to [`crate::Tree::create_custom`].

use sha2::{Digest as _, Sha256};
use std::sync::Arc;

/// `hash_fun(left, right, out)`: compress two digests into one.
///
/// Implementations must be deterministic, pure, and thread-safe. They may
/// alias `out` with `left` or `right` (the insert carry in [`crate::tree`]
/// relies on this), so an implementation must finish reading both inputs
/// before writing to `out`.
pub type HashFn = Arc<dyn Fn(&[u8], &[u8], &mut [u8]) + Send + Sync>;

/// SHA-256 over `left || right`, writing the 32-byte digest into `out`.
///
/// `out` may alias `left` and/or `right`: the concatenation is hashed into
/// an internal buffer before anything is written back.
pub fn sha256_compress(left: &[u8], right: &[u8], out: &mut [u8]) {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    let digest = hasher.finalize();
    out.copy_from_slice(digest.as_slice());
}

/// The default hash function: SHA-256, 32-byte digests.
#[must_use]
pub fn default_hash_fun() -> HashFn {
    Arc::new(sha256_compress)
}

/// Digest size (in bytes) produced by [`default_hash_fun`].
pub const DEFAULT_HASH_SIZE: u32 = 32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_output_with_inputs() {
        let mut buf = vec![0u8; 64];
        buf[..32].copy_from_slice(&[0xAA; 32]);
        buf[32..].copy_from_slice(&[0xBB; 32]);
        let mut expected = [0u8; 32];
        sha256_compress(&[0xAA; 32], &[0xBB; 32], &mut expected);

        let (left, right) = buf.split_at_mut(32);
        let mut out = [0u8; 32];
        sha256_compress(left, right, &mut out);
        assert_eq!(out, expected);

        // Aliasing out with one of the inputs must still be correct.
        let mut a = [0xAA; 32];
        let b = [0xBB; 32];
        let a_copy = a;
        sha256_compress(&a_copy, &b, &mut a);
        assert_eq!(a, expected);
    }

    #[test]
    fn deterministic() {
        let mut out1 = [0u8; 32];
        let mut out2 = [0u8; 32];
        sha256_compress(&[1u8; 32], &[2u8; 32], &mut out1);
        sha256_compress(&[1u8; 32], &[2u8; 32], &mut out2);
        assert_eq!(out1, out2);
    }
}
