//! Self-framing, bounds-checked, big-endian byte codec for [`Tree`] and
//! [`Path`].
//!
//! Every primitive here is bounds-checked against the remaining buffer
//! before it touches any bytes. A failed check propagates out as `0`
//! (serialize) or `None` (deserialize). These are sentinel returns, not
//! `anyhow` errors: the reference implementation this format matches treats
//! them as plain values a caller's `*_pre` predicate is meant to have
//! already ruled out.

use crate::digest::Digest;
use crate::hash::HashFn;
use crate::path::Path;
use crate::store::{ColumnStore, LEVELS};
use crate::tree::{merkle_tree_conditions, Tree};

/// The only wire format version this crate recognises.
pub const FORMAT_VERSION: u8 = 1;

// ---------------------------------------------------------------------
// Primitive encoders/decoders
// ---------------------------------------------------------------------

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn put_bytes(&mut self, bytes: &[u8]) -> bool {
        if self.remaining() < bytes.len() {
            return false;
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        true
    }

    fn put_u8(&mut self, v: u8) -> bool {
        self.put_bytes(&[v])
    }

    fn put_bool(&mut self, v: bool) -> bool {
        self.put_u8(u8::from(v))
    }

    fn put_u32(&mut self, v: u32) -> bool {
        self.put_bytes(&v.to_be_bytes())
    }

    fn put_u64(&mut self, v: u64) -> bool {
        self.put_bytes(&v.to_be_bytes())
    }

    fn put_digest(&mut self, d: &Digest) -> bool {
        self.put_bytes(d.as_bytes())
    }

    fn put_digest_vec(&mut self, v: &[Digest]) -> bool {
        if v.len() > u32::MAX as usize {
            return false;
        }
        if !self.put_u32(v.len() as u32) {
            return false;
        }
        for d in v {
            if !self.put_digest(d) {
                return false;
            }
        }
        true
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    poisoned: bool,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            poisoned: false,
        }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.poisoned || self.remaining() < n {
            self.poisoned = true;
            return None;
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Some(s)
    }

    fn get_u8(&mut self) -> Option<u8> {
        self.take(1).map(|s| s[0])
    }

    fn get_bool(&mut self) -> Option<bool> {
        match self.get_u8()? {
            0 => Some(false),
            1 => Some(true),
            _ => {
                self.poisoned = true;
                None
            }
        }
    }

    fn get_u32(&mut self) -> Option<u32> {
        self.take(4).map(|s| u32::from_be_bytes(s.try_into().expect("len checked")))
    }

    fn get_u64(&mut self) -> Option<u64> {
        self.take(8).map(|s| u64::from_be_bytes(s.try_into().expect("len checked")))
    }

    fn get_digest(&mut self, hash_size: usize) -> Option<Digest> {
        self.take(hash_size).map(Digest::from_slice)
    }

    fn get_digest_vec(&mut self, hash_size: usize) -> Option<Vec<Digest>> {
        let count = self.get_u32()? as usize;
        let mut out = Vec::with_capacity(count.min(1 << 20));
        for _ in 0..count {
            out.push(self.get_digest(hash_size)?);
        }
        Some(out)
    }

    fn get_digest_vv(&mut self, hash_size: usize) -> Option<Vec<Vec<Digest>>> {
        let count = self.get_u32()? as usize;
        let mut out = Vec::with_capacity(count.min(1 << 10));
        for _ in 0..count {
            out.push(self.get_digest_vec(hash_size)?);
        }
        Some(out)
    }
}

// ---------------------------------------------------------------------
// Tree (de)serialization
// ---------------------------------------------------------------------

/// Number of bytes needed to serialize `tree`, saturating to `u64::MAX` on
/// overflow.
#[must_use]
pub fn serialize_size(tree: &Tree) -> u64 {
    let (hash_size, _offset, _i, _j, hs, _rhs_ok, _rhs, _mroot) = tree.raw_parts();
    let hash_size = u64::from(hash_size);

    let mut hs_bytes: u64 = 4; // outer count
    for level in 0..LEVELS {
        let sz = hs.get(level).len() as u64;
        let Some(level_bytes) = sz
            .checked_mul(hash_size)
            .and_then(|b| b.checked_add(4))
        else {
            return u64::MAX;
        };
        hs_bytes = match hs_bytes.checked_add(level_bytes) {
            Some(v) => v,
            None => return u64::MAX,
        };
    }
    if hs_bytes >= u64::from(u32::MAX) {
        return u64::MAX;
    }

    let Some(rhs_bytes) = hash_size
        .checked_mul(LEVELS as u64)
        .and_then(|b| b.checked_add(4))
    else {
        return u64::MAX;
    };

    // 1 (version) + 4 (hash_size) + 8 (offset) + 4 (i) + 4 (j) = 21
    [21u64, hs_bytes, 1, rhs_bytes, hash_size]
        .into_iter()
        .try_fold(0u64, |acc, x| acc.checked_add(x))
        .unwrap_or(u64::MAX)
}

/// Serialize `tree` into `buf[..len]`, returning the number of bytes
/// written, or `0` on failure. `len` is capped at
/// `2^32 - 1`.
#[must_use]
pub fn serialize(tree: &Tree, buf: &mut [u8], len: u64) -> u64 {
    let cap = len.min(u64::from(u32::MAX)) as usize;
    if cap > buf.len() {
        return 0;
    }
    let (hash_size, offset, i, j, hs, rhs_ok, rhs, mroot) = tree.raw_parts();

    let mut w = Writer::new(&mut buf[..cap]);
    let ok = (|| -> bool {
        if !w.put_u8(FORMAT_VERSION) {
            return false;
        }
        if !w.put_u32(hash_size) {
            return false;
        }
        if !w.put_u64(offset) {
            return false;
        }
        if !w.put_u32(i) {
            return false;
        }
        if !w.put_u32(j) {
            return false;
        }
        if !w.put_u32(LEVELS as u32) {
            return false;
        }
        for level in 0..LEVELS {
            if !w.put_digest_vec(hs.get(level)) {
                return false;
            }
        }
        if !w.put_bool(rhs_ok) {
            return false;
        }
        if !w.put_digest_vec(rhs) {
            return false;
        }
        if !w.put_digest(mroot) {
            return false;
        }
        true
    })();

    if ok {
        w.pos as u64
    } else {
        0
    }
}

/// Parse a tree out of `buf[..len]`, taking its hash function from the
/// caller (the format never serializes it).
#[must_use]
pub fn deserialize(hash_size: u32, buf: &[u8], len: u64, hash_fun: HashFn) -> Option<Tree> {
    let cap = len.min(u64::from(u32::MAX)) as usize;
    if cap > buf.len() {
        return None;
    }
    let mut r = Reader::new(&buf[..cap]);

    let version = r.get_u8()?;
    if version != FORMAT_VERSION {
        return None;
    }
    let encoded_hash_size = r.get_u32()?;
    if encoded_hash_size != hash_size {
        return None;
    }
    let hsz = hash_size as usize;

    let offset = r.get_u64()?;
    let i = r.get_u32()?;
    let j = r.get_u32()?;

    let levels = r.get_digest_vv(hsz)?;
    if levels.len() != LEVELS {
        return None;
    }
    let mut hs = ColumnStore::new();
    for (level, v) in levels.into_iter().enumerate() {
        for d in v {
            hs.push(level, d);
        }
    }

    let rhs_ok = r.get_bool()?;
    let rhs = r.get_digest_vec(hsz)?;
    if rhs.len() != LEVELS {
        return None;
    }
    let mroot = r.get_digest(hsz)?;

    if !merkle_tree_conditions(offset, i, j) {
        return None;
    }

    Some(Tree::from_raw_parts(
        hash_size, offset, i, j, hs, rhs_ok, rhs, mroot, hash_fun,
    ))
}

// ---------------------------------------------------------------------
// Path (de)serialization
// ---------------------------------------------------------------------

/// Serialize `path` (whose digests must be `tree.hash_size()` bytes each)
/// into `buf[..len]`, returning bytes written or `0` on failure.
#[must_use]
pub fn serialize_path(path: &[Digest], tree: &Tree, buf: &mut [u8], len: u64) -> u64 {
    let cap = len.min(u64::from(u32::MAX)) as usize;
    if cap > buf.len() {
        return 0;
    }
    let mut w = Writer::new(&mut buf[..cap]);
    let ok = w.put_u32(tree.hash_size()) && w.put_digest_vec(path);
    if ok {
        w.pos as u64
    } else {
        0
    }
}

/// Parse a [`Path`] out of `buf[..len]`. The returned digests are freshly
/// allocated and alias nothing in any tree.
#[must_use]
pub fn deserialize_path(hash_size: u32, buf: &[u8], len: u64) -> Option<Path> {
    let cap = len.min(u64::from(u32::MAX)) as usize;
    if cap > buf.len() {
        return None;
    }
    let mut r = Reader::new(&buf[..cap]);
    let encoded_hash_size = r.get_u32()?;
    if encoded_hash_size != hash_size {
        return None;
    }
    r.get_digest_vec(hash_size as usize)
}
