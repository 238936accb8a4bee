//! Inclusion paths.

use crate::digest::Digest;

/// An ordered list of sibling (or cached right-hash carry) digests needed
/// to recompute a root from a target leaf.
///
/// A `Path` conceptually *borrows* digests from the `Tree` it was
/// extracted from, and a borrow-checked implementation is one reasonable
/// way to enforce the resulting lifetime hazard (the tree must not be
/// mutated — `insert`, `flush`, `flush_to`, `retract_to` — while a
/// borrowed path is alive). This crate takes the other option instead:
/// [`crate::Tree::get_path`] copies each
/// digest out at extraction time, so a `Path` is a fully owned, `'static`
/// value that safely outlives any number of later mutations to its source
/// tree. The tradeoff is one allocation and a handful of memcpys per path
/// element, which is negligible next to a hash call.
pub type Path = Vec<Digest>;
