// crates/append-merkle/src/lib.rs

//! Append-only, verifiable Merkle hash tree.
//!
//! - Canonical shape: a level-indexed column store (leaves at level 0),
//!   grown incrementally by [`Tree::insert`] with a hash carry that touches
//!   only `O(log n)` nodes per insertion.
//! - The current root is cached lazily: [`Tree::get_root`] only walks the
//!   retained window when the cache is stale, and in doing so populates a
//!   "right-hashes" carry used to complete inclusion paths over an
//!   incomplete rightmost subtree.
//! - [`Tree::get_path`] / [`Tree::verify`] implement inclusion proofs;
//!   [`Tree::flush_to`] / [`Tree::retract_to`] implement the retention
//!   window (forget old leaves / undo recent ones).
//! - [`codec`] is a self-framing, bounds-checked, big-endian binary format
//!   for a whole tree or a single path.
//!
//! The hash function is pluggable (see [`hash::HashFn`]); the default is
//! SHA-256 over the 64-byte concatenation of two digests.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod digest;
pub mod hash;
pub mod io;
pub mod path;
pub mod store;
pub mod tree;

pub use digest::{Digest, DigestVec};
pub use hash::{default_hash_fun, sha256_compress, HashFn, DEFAULT_HASH_SIZE};
pub use path::Path;
pub use store::ColumnStore;
pub use tree::{offset_of, path_length, Tree, OFFSET_RANGE_LIMIT};
