//! File-based convenience wrappers around the binary codec.
//!
//! These load everything into memory, run the exact same [`crate::codec`]
//! used for in-memory (de)serialization, and surface failures as
//! `anyhow::Result` with `with_context` breadcrumbs, since these functions
//! — unlike the core codec primitives — are not part of the
//! precondition-checked core contract and can fail for ordinary I/O
//! reasons.

use crate::codec;
use crate::digest::Digest;
use crate::hash::HashFn;
use crate::path::Path;
use crate::tree::Tree;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path as FsPath;

fn display(path: &FsPath) -> String {
    path.to_string_lossy().into_owned()
}

/// Serialize `tree` and write it to `path`, creating parent directories as
/// needed. Returns the number of bytes written.
pub fn write_tree_to_path<P: AsRef<FsPath>>(tree: &Tree, path: P) -> Result<u64> {
    let path_ref = path.as_ref();
    if let Some(dir) = path_ref.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating parent directory for {}", display(path_ref)))?;
        }
    }

    let size = codec::serialize_size(tree);
    if size == u64::MAX {
        return Err(anyhow!("tree is too large to serialize ({})", display(path_ref)));
    }
    let mut buf = vec![0u8; size as usize];
    let written = codec::serialize(tree, &mut buf, size);
    if written != size {
        return Err(anyhow!(
            "serialize failed for {} (wrote {written} of {size} bytes)",
            display(path_ref)
        ));
    }

    fs::write(path_ref, &buf).with_context(|| format!("write {}", display(path_ref)))?;
    Ok(written)
}

/// Read and deserialize a tree from `path`.
pub fn read_tree_from_path<P: AsRef<FsPath>>(
    hash_size: u32,
    path: P,
    hash_fun: HashFn,
) -> Result<Tree> {
    let path_ref = path.as_ref();
    let buf = fs::read(path_ref).with_context(|| format!("open {}", display(path_ref)))?;
    let len = buf.len() as u64;
    codec::deserialize(hash_size, &buf, len, hash_fun).ok_or_else(|| {
        anyhow!(
            "malformed or incompatible tree file: {} (first bytes: {})",
            display(path_ref),
            hex::encode(&buf[..buf.len().min(8)])
        )
    })
}

/// Serialize `path` (the inclusion path) and write it to `out_path`.
pub fn write_path_to_path<P: AsRef<FsPath>>(
    inclusion_path: &[Digest],
    tree: &Tree,
    out_path: P,
) -> Result<u64> {
    let path_ref = out_path.as_ref();
    if let Some(dir) = path_ref.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating parent directory for {}", display(path_ref)))?;
        }
    }
    let size = 4 + 4 + inclusion_path.len() as u64 * u64::from(tree.hash_size());
    let mut buf = vec![0u8; size as usize];
    let written = codec::serialize_path(inclusion_path, tree, &mut buf, size);
    if written != size {
        return Err(anyhow!(
            "serialize_path failed for {} (wrote {written} of {size} bytes)",
            display(path_ref)
        ));
    }
    fs::write(path_ref, &buf).with_context(|| format!("write {}", display(path_ref)))?;
    Ok(written)
}

/// Read and deserialize an inclusion path from `path`.
pub fn read_path_from_path<P: AsRef<FsPath>>(hash_size: u32, path: P) -> Result<Path> {
    let path_ref = path.as_ref();
    let buf = fs::read(path_ref).with_context(|| format!("open {}", display(path_ref)))?;
    let len = buf.len() as u64;
    codec::deserialize_path(hash_size, &buf, len)
        .ok_or_else(|| anyhow!("malformed or incompatible path file: {}", display(path_ref)))
}
