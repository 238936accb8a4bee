//! Fixed-size digest buffers and the vectors of them that every tree level
//! and every inclusion path is built from.

use std::fmt;

/// A heap-owned, fixed-size hash output.
///
/// All digests produced or consumed by a given [`crate::Tree`] share the
/// same length (`hash_size`); nothing in this module enforces that across
/// independent `Digest` values, it is the tree engine's job (see
/// [`crate::tree`]).
#[derive(Clone)]
pub struct Digest(Box<[u8]>);

impl Digest {
    /// A zero-filled digest of the given size.
    #[must_use]
    pub fn zero(hash_size: usize) -> Self {
        Self(vec![0u8; hash_size].into_boxed_slice())
    }

    /// Copy a digest out of a byte slice.
    ///
    /// This does not itself check `bytes.len()` against any expected
    /// `hash_size` — the resulting `Digest` is simply as long as `bytes`.
    /// Callers at the API boundary (a `*_pre` predicate, or the codec's own
    /// bounds checks in [`crate::codec`]) are responsible for only ever
    /// constructing same-length digests within a given `Tree`, since the
    /// tree engine assumes every digest it holds shares one `hash_size`.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(bytes.to_vec().into_boxed_slice())
    }

    /// Number of bytes in this digest.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` if this digest holds no bytes (never produced by this crate,
    /// but a legitimate state for a hand-built `Digest`).
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }

    /// Overwrite this digest's bytes from `other`.
    ///
    /// # Panics
    /// Panics if `self.len() != other.len()`.
    pub fn copy_from(&mut self, other: &Digest) {
        self.0.copy_from_slice(other.as_bytes());
    }
}

impl PartialEq for Digest {
    /// Constant-time, byte-wise equality: every byte is compared and the
    /// per-byte results are folded together rather than short-circuiting
    /// on the first mismatch.
    fn eq(&self, other: &Self) -> bool {
        if self.0.len() != other.0.len() {
            return false;
        }
        let mut diff = 0u8;
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

impl Eq for Digest {}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", hex::encode(&self.0))
    }
}

/// A dynamic, ordered sequence of owned [`Digest`]s.
///
/// This is a thin alias rather than a bespoke type: `Vec<Digest>` already
/// gives geometric capacity growth and an exact logical length (`sz`),
/// which is the entire contract a `DigestVec` needs to satisfy.
pub type DigestVec = Vec<Digest>;
