// Copyright 2019-2020 PolkaX Authors. Licensed under GPL-3.0.

//! Accessors for the fixed 96-byte, 4-byte-aligned B-tree node header.
//!
//! ```text
//! bytes  0..4   gen_type   : low 8 bits node type, high 24 bits generation
//! bytes  4..32  hashes[7]  : ascending DJB2 hashes, valid [0..key_count)
//! bytes 32..36  size_kc    : low 3 bits key_count, bits 6+ subtree size
//! bytes 36..64  kv_ofs[7]  : payload offset per hash slot
//! bytes 64..96  child_ofs[8]
//! ```
//!
//! Every function here takes the *whole* backing buffer plus a node offset,
//! rather than holding a borrowed slice, because the arena may reallocate
//! between calls (see [`crate::arena`]).

use lite3_params::{GENERATION_MODULUS, MAX_CHILDREN, MAX_KEYS, NODE_SIZE};

use crate::bytes::{read_u32, write_u32};
use crate::error::{Lite3Error, Result};

const GEN_TYPE_OFS: usize = 0;
const HASHES_OFS: usize = 4;
const SIZE_KC_OFS: usize = 32;
const KV_OFS_OFS: usize = 36;
const CHILD_OFS_OFS: usize = 64;

/// The type tag stored in a node's low 8 `gen_type` bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// A keyed mapping.
    Object,
    /// A dense, index-keyed sequence.
    Array,
}

impl NodeType {
    /// Raw byte this type is encoded as.
    pub fn as_u8(self) -> u8 {
        match self {
            NodeType::Object => 6,
            NodeType::Array => 7,
        }
    }

    /// Decodes a raw type byte, failing on anything but OBJECT(6)/ARRAY(7).
    pub fn from_u8(b: u8) -> Result<Self> {
        match b {
            6 => Ok(NodeType::Object),
            7 => Ok(NodeType::Array),
            other => Err(Lite3Error::BadMessage(format!(
                "node type byte {} is neither OBJECT(6) nor ARRAY(7)",
                other
            ))),
        }
    }
}

fn at(node_ofs: u32, field: usize) -> usize {
    node_ofs as usize + field
}

/// Node type stored at `node_ofs`.
pub fn node_type(buf: &[u8], node_ofs: u32) -> Result<NodeType> {
    let word = read_u32(buf, at(node_ofs, GEN_TYPE_OFS));
    NodeType::from_u8((word & 0xff) as u8)
}

/// Generation counter stored at `node_ofs` (meaningful only at the root).
pub fn generation(buf: &[u8], node_ofs: u32) -> u32 {
    read_u32(buf, at(node_ofs, GEN_TYPE_OFS)) >> 8
}

/// Increments the generation counter at `node_ofs`, wrapping mod 2^24, and
/// returns the new value. Leaves the low 8 (type) bits untouched.
pub fn bump_generation(buf: &mut [u8], node_ofs: u32) -> u32 {
    let word = read_u32(buf, at(node_ofs, GEN_TYPE_OFS));
    let ty = word & 0xff;
    let gen = (word >> 8).wrapping_add(1) % GENERATION_MODULUS;
    write_u32(buf, at(node_ofs, GEN_TYPE_OFS), ty | (gen << 8));
    gen
}

/// Sets the generation counter at `node_ofs` directly, preserving the type
/// bits. Used to restore a root's generation after `init_node` has zeroed it
/// during a root split: the split is internal bookkeeping, not a caller
/// mutation, so the generation a reader last observed must still hold.
pub fn set_generation(buf: &mut [u8], node_ofs: u32, gen: u32) {
    let word = read_u32(buf, at(node_ofs, GEN_TYPE_OFS));
    let ty = word & 0xff;
    write_u32(buf, at(node_ofs, GEN_TYPE_OFS), ty | ((gen % GENERATION_MODULUS) << 8));
}

/// Number of keyed entries currently present at `node_ofs` (0..=7).
pub fn key_count(buf: &[u8], node_ofs: u32) -> usize {
    (read_u32(buf, at(node_ofs, SIZE_KC_OFS)) & 0x7) as usize
}

/// Sets the key-count field, preserving the subtree-size bits of the same word.
pub fn set_key_count(buf: &mut [u8], node_ofs: u32, count: usize) {
    debug_assert!(count <= MAX_KEYS);
    let word = read_u32(buf, at(node_ofs, SIZE_KC_OFS));
    write_u32(
        buf,
        at(node_ofs, SIZE_KC_OFS),
        (word & !0x7) | (count as u32 & 0x7),
    );
}

/// Subtree size at `node_ofs` (meaningful only at the root).
pub fn subtree_size(buf: &[u8], node_ofs: u32) -> u32 {
    read_u32(buf, at(node_ofs, SIZE_KC_OFS)) >> 6
}

/// Sets the subtree-size field, preserving the key-count bits of the same word.
pub fn set_subtree_size(buf: &mut [u8], node_ofs: u32, size: u32) {
    let word = read_u32(buf, at(node_ofs, SIZE_KC_OFS));
    write_u32(buf, at(node_ofs, SIZE_KC_OFS), (word & 0x7) | (size << 6));
}

/// The DJB2 hash stored in slot `i` (`i < 7`).
pub fn hash_at(buf: &[u8], node_ofs: u32, i: usize) -> u32 {
    debug_assert!(i < MAX_KEYS);
    read_u32(buf, at(node_ofs, HASHES_OFS + i * 4))
}

/// Sets the hash stored in slot `i`.
pub fn set_hash_at(buf: &mut [u8], node_ofs: u32, i: usize, hash: u32) {
    debug_assert!(i < MAX_KEYS);
    write_u32(buf, at(node_ofs, HASHES_OFS + i * 4), hash);
}

/// The payload offset stored in slot `i`.
pub fn kv_ofs_at(buf: &[u8], node_ofs: u32, i: usize) -> u32 {
    debug_assert!(i < MAX_KEYS);
    read_u32(buf, at(node_ofs, KV_OFS_OFS + i * 4))
}

/// Sets the payload offset stored in slot `i`.
pub fn set_kv_ofs_at(buf: &mut [u8], node_ofs: u32, i: usize, ofs: u32) {
    debug_assert!(i < MAX_KEYS);
    write_u32(buf, at(node_ofs, KV_OFS_OFS + i * 4), ofs);
}

/// The child offset stored in slot `i` (`i <= key_count`, up to 8 slots).
pub fn child_ofs_at(buf: &[u8], node_ofs: u32, i: usize) -> u32 {
    debug_assert!(i < MAX_CHILDREN);
    read_u32(buf, at(node_ofs, CHILD_OFS_OFS + i * 4))
}

/// Sets the child offset stored in slot `i`.
pub fn set_child_ofs_at(buf: &mut [u8], node_ofs: u32, i: usize, ofs: u32) {
    debug_assert!(i < MAX_CHILDREN);
    write_u32(buf, at(node_ofs, CHILD_OFS_OFS + i * 4), ofs);
}

/// A node with a zero in `child_ofs[0]` has no children.
pub fn is_leaf(buf: &[u8], node_ofs: u32) -> bool {
    child_ofs_at(buf, node_ofs, 0) == 0
}

/// Zeroes the 96-byte header at `node_ofs` and writes a fresh `ty` header:
/// `gen=0`, `key_count=0`, every child slot cleared. Callers preserving a
/// root's generation/subtree-size across reinitialization must save and
/// restore those fields themselves (see `btree::split_root`).
pub fn init_node(buf: &mut [u8], node_ofs: u32, ty: NodeType) {
    let start = node_ofs as usize;
    let end = start + NODE_SIZE as usize;
    buf[start..end].fill(0);
    write_u32(buf, at(node_ofs, GEN_TYPE_OFS), ty.as_u8() as u32);
}
