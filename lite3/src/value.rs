// Copyright 2019-2020 PolkaX Authors. Licensed under GPL-3.0.

//! Type-tag dispatch for values, and the in-place-overwrite-vs-reallocate
//! decision that lets a mutation avoid growing the buffer.
//!
//! A value's on-wire tag byte and a node's own type byte share the same
//! numbering (OBJECT=6, ARRAY=7): for a nested value the "tag byte" IS the
//! low byte of the nested node's `gen_type` word, so reading one byte at a
//! value's offset is enough to tell a scalar from a nested node in either
//! case.

use lite3_hash::{djb2, key_tag_size};
use lite3_params::NODE_SIZE;

use crate::arena::Arena;
use crate::bytes::{
    read_f64, read_i64, read_key_tag, read_u32, write_f64, write_i64, write_key_tag, write_u32,
};
use crate::btree::{self, InsertOutcome, MAX_SPLIT_OVERHEAD};
use crate::error::{Lite3Error, Result};
use crate::node::{self, NodeType};

/// The 1-byte type tag that prefixes every scalar value (and that a nested
/// node's own type byte happens to alias).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueTag {
    /// NULL(0)
    Null,
    /// BOOL(1)
    Bool,
    /// I64(2)
    I64,
    /// F64(3)
    F64,
    /// BYTES(4)
    Bytes,
    /// STRING(5)
    String,
    /// OBJECT(6)
    Object,
    /// ARRAY(7)
    Array,
}

impl ValueTag {
    fn as_u8(self) -> u8 {
        match self {
            ValueTag::Null => 0,
            ValueTag::Bool => 1,
            ValueTag::I64 => 2,
            ValueTag::F64 => 3,
            ValueTag::Bytes => 4,
            ValueTag::String => 5,
            ValueTag::Object => 6,
            ValueTag::Array => 7,
        }
    }

    fn from_u8(b: u8) -> Result<Self> {
        match b {
            0 => Ok(ValueTag::Null),
            1 => Ok(ValueTag::Bool),
            2 => Ok(ValueTag::I64),
            3 => Ok(ValueTag::F64),
            4 => Ok(ValueTag::Bytes),
            5 => Ok(ValueTag::String),
            6 => Ok(ValueTag::Object),
            7 => Ok(ValueTag::Array),
            other => Err(Lite3Error::BadMessage(format!(
                "value type tag {} is outside 0..=7",
                other
            ))),
        }
    }
}

/// An owned scalar value, either about to be written or just decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// NULL
    Null,
    /// BOOL
    Bool(bool),
    /// I64
    I64(i64),
    /// F64
    F64(f64),
    /// BYTES
    Bytes(Vec<u8>),
    /// STRING
    Str(String),
}

impl Scalar {
    fn tag(&self) -> ValueTag {
        match self {
            Scalar::Null => ValueTag::Null,
            Scalar::Bool(_) => ValueTag::Bool,
            Scalar::I64(_) => ValueTag::I64,
            Scalar::F64(_) => ValueTag::F64,
            Scalar::Bytes(_) => ValueTag::Bytes,
            Scalar::Str(_) => ValueTag::String,
        }
    }

    /// Total bytes this scalar occupies on the wire, tag byte included.
    fn encoded_len(&self) -> u32 {
        match self {
            Scalar::Null => 1,
            Scalar::Bool(_) => 2,
            Scalar::I64(_) => 9,
            Scalar::F64(_) => 9,
            Scalar::Bytes(b) => 1 + 4 + b.len() as u32,
            Scalar::Str(s) => 1 + 4 + s.len() as u32 + 1,
        }
    }

    /// Writes this scalar (tag byte included) at `buf[at..]`. The caller
    /// must have already reserved `self.encoded_len()` bytes there.
    fn write(&self, buf: &mut [u8], at: u32) {
        let at = at as usize;
        buf[at] = self.tag().as_u8();
        match self {
            Scalar::Null => {}
            Scalar::Bool(v) => buf[at + 1] = if *v { 1 } else { 0 },
            Scalar::I64(v) => write_i64(buf, at + 1, *v),
            Scalar::F64(v) => write_f64(buf, at + 1, *v),
            Scalar::Bytes(b) => {
                write_u32(buf, at + 1, b.len() as u32);
                buf[at + 5..at + 5 + b.len()].copy_from_slice(b);
            }
            Scalar::Str(s) => {
                let len_with_nul = s.len() as u32 + 1;
                write_u32(buf, at + 1, len_with_nul);
                buf[at + 5..at + 5 + s.len()].copy_from_slice(s.as_bytes());
                buf[at + 5 + s.len()] = 0;
            }
        }
    }
}

/// What [`read_value`] found at a value offset: an immediately-usable
/// scalar, or the offset (and type) of a nested node a caller must recurse
/// into (via [`crate::traverse`]).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueRead {
    /// A decoded scalar (owned, since `Bytes`/`Str` copy out of the buffer).
    Scalar,
    /// A nested OBJECT/ARRAY; the value offset IS the nested node's offset.
    Nested(u32, NodeType),
}

/// Reads the tag byte at `value_ofs` and, for scalars, the value itself.
/// Fails with `bad_message` if the tag is outside 0..=7 or a length field
/// would run past the buffer's used length.
pub fn read_value(arena: &Arena, value_ofs: u32) -> Result<(ValueRead, Option<Scalar>)> {
    arena.check_bounds(value_ofs, 1)?;
    let buf = arena.raw();
    let tag = ValueTag::from_u8(buf[value_ofs as usize])?;
    match tag {
        ValueTag::Null => Ok((ValueRead::Scalar, Some(Scalar::Null))),
        ValueTag::Bool => {
            arena.check_bounds(value_ofs, 2)?;
            Ok((
                ValueRead::Scalar,
                Some(Scalar::Bool(buf[value_ofs as usize + 1] != 0)),
            ))
        }
        ValueTag::I64 => {
            arena.check_bounds(value_ofs, 9)?;
            Ok((
                ValueRead::Scalar,
                Some(Scalar::I64(read_i64(buf, value_ofs as usize + 1))),
            ))
        }
        ValueTag::F64 => {
            arena.check_bounds(value_ofs, 9)?;
            Ok((
                ValueRead::Scalar,
                Some(Scalar::F64(read_f64(buf, value_ofs as usize + 1))),
            ))
        }
        ValueTag::Bytes => {
            arena.check_bounds(value_ofs, 5)?;
            let len = read_u32(buf, value_ofs as usize + 1);
            arena.check_bounds(value_ofs + 5, len)?;
            let start = value_ofs as usize + 5;
            Ok((
                ValueRead::Scalar,
                Some(Scalar::Bytes(buf[start..start + len as usize].to_vec())),
            ))
        }
        ValueTag::String => {
            arena.check_bounds(value_ofs, 5)?;
            let len_with_nul = read_u32(buf, value_ofs as usize + 1);
            if len_with_nul == 0 {
                return Err(Lite3Error::BadMessage(
                    "string length field is zero but must include a trailing NUL".into(),
                ));
            }
            arena.check_bounds(value_ofs + 5, len_with_nul)?;
            let start = value_ofs as usize + 5;
            let s = std::str::from_utf8(&buf[start..start + len_with_nul as usize - 1])
                .map_err(|e| Lite3Error::BadMessage(format!("string is not valid utf-8: {}", e)))?
                .to_owned();
            Ok((ValueRead::Scalar, Some(Scalar::Str(s))))
        }
        ValueTag::Object => Ok((ValueRead::Nested(value_ofs, NodeType::Object), None)),
        ValueTag::Array => Ok((ValueRead::Nested(value_ofs, NodeType::Array), None)),
    }
}

/// Size, in bytes, of the value already written at `value_ofs` (tag byte
/// included for scalars; the full node for nested values).
pub fn value_byte_size(arena: &Arena, value_ofs: u32) -> Result<u32> {
    arena.check_bounds(value_ofs, 1)?;
    let tag = ValueTag::from_u8(arena.raw()[value_ofs as usize])?;
    Ok(match tag {
        ValueTag::Null => 1,
        ValueTag::Bool => 2,
        ValueTag::I64 | ValueTag::F64 => 9,
        ValueTag::Bytes => {
            let len = read_u32(arena.raw(), value_ofs as usize + 1);
            5 + len
        }
        ValueTag::String => {
            let len = read_u32(arena.raw(), value_ofs as usize + 1);
            5 + len
        }
        ValueTag::Object | ValueTag::Array => NODE_SIZE,
    })
}

/// A decoded object key and the offset its value starts at.
#[derive(Debug, Clone)]
pub struct KeyEntry {
    /// The decoded UTF-8 key (NUL terminator excluded).
    pub key: String,
    /// Offset of this entry's value (tag byte, or nested node start).
    pub value_ofs: u32,
}

/// Decodes the key-tagged prefix of an OBJECT entry's payload at
/// `payload_ofs`.
pub fn read_key(arena: &Arena, payload_ofs: u32) -> Result<KeyEntry> {
    arena.check_bounds(payload_ofs, 1)?;
    let buf = arena.raw();
    let (tag_size, len_with_nul) = read_key_tag(buf, payload_ofs as usize);
    arena.check_bounds(payload_ofs, tag_size as u32 + len_with_nul)?;
    let start = payload_ofs as usize + tag_size as usize;
    let key = std::str::from_utf8(&buf[start..start + len_with_nul as usize - 1])
        .map_err(|e| Lite3Error::BadMessage(format!("key is not valid utf-8: {}", e)))?
        .to_owned();
    Ok(KeyEntry {
        key,
        value_ofs: payload_ofs + tag_size as u32 + len_with_nul,
    })
}

fn key_payload_len(key: &str) -> u32 {
    let len_with_nul = key.len() as u32 + 1;
    key_tag_size(len_with_nul as usize) as u32 + len_with_nul
}

fn write_key_prefix(arena: &mut Arena, at: u32, key: &str) -> u32 {
    let len_with_nul = key.len() as u32 + 1;
    let tag_size = key_tag_size(len_with_nul as usize);
    let buf = arena.raw_mut();
    let n = write_key_tag(buf, at as usize, tag_size, len_with_nul) as u32;
    let key_start = at + n;
    buf[key_start as usize..key_start as usize + key.len()].copy_from_slice(key.as_bytes());
    buf[key_start as usize + key.len()] = 0;
    at + n + len_with_nul
}

/// Worst-case bytes an object `set` of `key` to `scalar` may consume:
/// up to two splits, plus a brand new `key_tag ‖ key ‖ NUL ‖ value` payload.
pub fn scalar_set_reservation(key: &str, scalar: &Scalar) -> u32 {
    MAX_SPLIT_OVERHEAD + key_payload_len(key) + scalar.encoded_len()
}

/// Worst-case bytes an array `append` of `scalar` may consume.
pub fn scalar_append_reservation(scalar: &Scalar) -> u32 {
    MAX_SPLIT_OVERHEAD + scalar.encoded_len()
}

/// Worst-case bytes a `set_object`/`set_array` of `key` may consume.
pub fn nested_set_reservation(key: &str) -> u32 {
    MAX_SPLIT_OVERHEAD + key_payload_len(key) + NODE_SIZE + lite3_params::DEFAULT_ALIGNMENT
}

/// Worst-case bytes an array `append_object`/`append_array` may consume.
pub fn nested_append_reservation() -> u32 {
    MAX_SPLIT_OVERHEAD + NODE_SIZE + lite3_params::DEFAULT_ALIGNMENT
}

/// Sets `key` to `scalar` inside the OBJECT rooted at `root_ofs`. The caller
/// must already have reserved at least [`scalar_set_reservation`] bytes.
pub fn set_scalar(arena: &mut Arena, root_ofs: u32, key: &str, scalar: Scalar) -> Result<()> {
    let hash = djb2(key.as_bytes());
    match btree::insert(arena, root_ofs, hash)? {
        InsertOutcome::New { node_ofs, index } => {
            let total = key_payload_len(key) + scalar.encoded_len();
            let payload_ofs = arena.reserve(total)?;
            let value_ofs = write_key_prefix(arena, payload_ofs, key);
            scalar.write(arena.raw_mut(), value_ofs);
            btree::record_new_payload(arena, root_ofs, node_ofs, index, payload_ofs);
        }
        InsertOutcome::Existing { node_ofs, index } => {
            let old_kv_ofs = node::kv_ofs_at(arena.raw(), node_ofs, index);
            let old_key = read_key(arena, old_kv_ofs)?;
            let old_size = value_byte_size(arena, old_key.value_ofs)?;
            if scalar.encoded_len() <= old_size {
                scalar.write(arena.raw_mut(), old_key.value_ofs);
            } else {
                let total = key_payload_len(key) + scalar.encoded_len();
                let payload_ofs = arena.reserve(total)?;
                let value_ofs = write_key_prefix(arena, payload_ofs, key);
                scalar.write(arena.raw_mut(), value_ofs);
                node::set_kv_ofs_at(arena.raw_mut(), node_ofs, index, payload_ofs);
            }
        }
    }
    Ok(())
}

/// Sets `key` inside the OBJECT rooted at `root_ofs` to a freshly
/// initialized nested `ty` node, returning its offset. If `key` already
/// held a nested OBJECT/ARRAY, that node is cleared and reused in place
/// (same offset); if it held a scalar, a new key/node pair is appended
/// instead. The caller must already have reserved at least
/// [`nested_set_reservation`] bytes. Unlike [`append_nested`], the node is
/// placed immediately after the key with no alignment padding; see
/// DESIGN.md for why.
pub fn set_nested(arena: &mut Arena, root_ofs: u32, key: &str, ty: NodeType) -> Result<u32> {
    let hash = djb2(key.as_bytes());
    match btree::insert(arena, root_ofs, hash)? {
        InsertOutcome::New { node_ofs, index } => {
            let key_len = key_payload_len(key);
            let key_ofs = arena.reserve(key_len)?;
            write_key_prefix(arena, key_ofs, key);
            let node_ofs_new = arena.reserve(NODE_SIZE)?;
            node::init_node(arena.raw_mut(), node_ofs_new, ty);
            btree::record_new_payload(arena, root_ofs, node_ofs, index, key_ofs);
            Ok(node_ofs_new)
        }
        InsertOutcome::Existing { node_ofs, index } => {
            let old_kv_ofs = node::kv_ofs_at(arena.raw(), node_ofs, index);
            let old_key = read_key(arena, old_kv_ofs)?;
            let (read, _) = read_value(arena, old_key.value_ofs)?;
            match read {
                ValueRead::Nested(existing_ofs, _) => {
                    node::init_node(arena.raw_mut(), existing_ofs, ty);
                    Ok(existing_ofs)
                }
                ValueRead::Scalar => {
                    let key_len = key_payload_len(key);
                    let key_ofs = arena.reserve(key_len)?;
                    write_key_prefix(arena, key_ofs, key);
                    let node_ofs_new = arena.reserve(NODE_SIZE)?;
                    node::init_node(arena.raw_mut(), node_ofs_new, ty);
                    node::set_kv_ofs_at(arena.raw_mut(), node_ofs, index, key_ofs);
                    Ok(node_ofs_new)
                }
            }
        }
    }
}

/// Appends `scalar` at the end of the ARRAY rooted at `root_ofs` (index =
/// current size). The caller must already have reserved at least
/// [`scalar_append_reservation`] bytes.
pub fn append_scalar(arena: &mut Arena, root_ofs: u32, scalar: Scalar) -> Result<()> {
    let index_hash = node::subtree_size(arena.raw(), root_ofs);
    match btree::insert(arena, root_ofs, index_hash)? {
        InsertOutcome::New { node_ofs, index } => {
            let payload_ofs = arena.reserve(scalar.encoded_len())?;
            scalar.write(arena.raw_mut(), payload_ofs);
            btree::record_new_payload(arena, root_ofs, node_ofs, index, payload_ofs);
            Ok(())
        }
        InsertOutcome::Existing { .. } => Err(Lite3Error::InvalidArgument(
            "array append produced a duplicate index hash; buffer is corrupt".into(),
        )),
    }
}

/// Appends a freshly initialized nested `ty` node at the end of the ARRAY
/// rooted at `root_ofs`, returning its offset. The caller must already have
/// reserved at least [`nested_append_reservation`] bytes.
pub fn append_nested(arena: &mut Arena, root_ofs: u32, ty: NodeType) -> Result<u32> {
    let index_hash = node::subtree_size(arena.raw(), root_ofs);
    match btree::insert(arena, root_ofs, index_hash)? {
        InsertOutcome::New { node_ofs, index } => {
            let node_ofs_new =
                arena.reserve_aligned(NODE_SIZE, lite3_params::DEFAULT_ALIGNMENT)?;
            node::init_node(arena.raw_mut(), node_ofs_new, ty);
            btree::record_new_payload(arena, root_ofs, node_ofs, index, node_ofs_new);
            Ok(node_ofs_new)
        }
        InsertOutcome::Existing { .. } => Err(Lite3Error::InvalidArgument(
            "array append produced a duplicate index hash; buffer is corrupt".into(),
        )),
    }
}

/// Looks up `key` inside the OBJECT rooted at `root_ofs`.
pub fn get(arena: &Arena, root_ofs: u32, key: &str) -> Result<Option<(ValueRead, Option<Scalar>)>> {
    let hash = djb2(key.as_bytes());
    match btree::find(arena.raw(), root_ofs, hash)? {
        None => Ok(None),
        Some((node_ofs, index)) => {
            let kv_ofs = node::kv_ofs_at(arena.raw(), node_ofs, index);
            let entry = read_key(arena, kv_ofs)?;
            Ok(Some(read_value(arena, entry.value_ofs)?))
        }
    }
}

/// Looks up index `i` inside the ARRAY rooted at `root_ofs`.
pub fn get_at(arena: &Arena, root_ofs: u32, i: u32) -> Result<Option<(ValueRead, Option<Scalar>)>> {
    match btree::find(arena.raw(), root_ofs, i)? {
        None => Ok(None),
        Some((node_ofs, index)) => {
            let value_ofs = node::kv_ofs_at(arena.raw(), node_ofs, index);
            Ok(Some(read_value(arena, value_ofs)?))
        }
    }
}

/// `true` if `key` is present in the OBJECT rooted at `root_ofs`.
pub fn has(arena: &Arena, root_ofs: u32, key: &str) -> Result<bool> {
    let hash = djb2(key.as_bytes());
    Ok(btree::find(arena.raw(), root_ofs, hash)?.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_root(ty: NodeType, cap: u32) -> (Arena, u32) {
        let mut arena = Arena::new(cap);
        let root_ofs = arena.reserve_aligned(NODE_SIZE, 4).unwrap();
        node::init_node(arena.raw_mut(), root_ofs, ty);
        (arena, root_ofs)
    }

    #[test]
    fn scalar_set_and_get_round_trip() {
        let (mut arena, root) = new_root(NodeType::Object, 4096);
        arena
            .ensure_space(scalar_set_reservation("lap", &Scalar::I64(55)))
            .unwrap();
        set_scalar(&mut arena, root, "lap", Scalar::I64(55)).unwrap();
        let (read, scalar) = get(&arena, root, "lap").unwrap().unwrap();
        assert_eq!(read, ValueRead::Scalar);
        assert_eq!(scalar, Some(Scalar::I64(55)));
        assert!(get(&arena, root, "missing").unwrap().is_none());
    }

    #[test]
    fn overwrite_with_smaller_or_equal_value_does_not_grow_buffer() {
        let (mut arena, root) = new_root(NodeType::Object, 4096);
        arena
            .ensure_space(scalar_set_reservation("lap", &Scalar::I64(55)))
            .unwrap();
        set_scalar(&mut arena, root, "lap", Scalar::I64(55)).unwrap();
        let used_before = arena.used();
        arena
            .ensure_space(scalar_set_reservation("lap", &Scalar::I64(56)))
            .unwrap();
        set_scalar(&mut arena, root, "lap", Scalar::I64(56)).unwrap();
        assert_eq!(arena.used(), used_before);
        let (_, scalar) = get(&arena, root, "lap").unwrap().unwrap();
        assert_eq!(scalar, Some(Scalar::I64(56)));
    }

    #[test]
    fn overwrite_with_larger_value_reallocates() {
        let (mut arena, root) = new_root(NodeType::Object, 4096);
        arena
            .ensure_space(scalar_set_reservation("x", &Scalar::Bool(true)))
            .unwrap();
        set_scalar(&mut arena, root, "x", Scalar::Bool(true)).unwrap();
        let used_before = arena.used();
        let big = Scalar::Str("a".repeat(100));
        arena.ensure_space(scalar_set_reservation("x", &big)).unwrap();
        set_scalar(&mut arena, root, "x", big.clone()).unwrap();
        assert!(arena.used() > used_before);
        let (_, scalar) = get(&arena, root, "x").unwrap().unwrap();
        assert_eq!(scalar, Some(big));
    }

    #[test]
    fn array_append_round_trips_in_order() {
        let (mut arena, root) = new_root(NodeType::Array, 4096);
        for v in [1i64, 2, 3] {
            arena.ensure_space(scalar_append_reservation(&Scalar::I64(v))).unwrap();
            append_scalar(&mut arena, root, Scalar::I64(v)).unwrap();
        }
        for (i, expect) in [1i64, 2, 3].into_iter().enumerate() {
            let (_, scalar) = get_at(&arena, root, i as u32).unwrap().unwrap();
            assert_eq!(scalar, Some(Scalar::I64(expect)));
        }
    }

    #[test]
    fn set_nested_then_reinit_clears_contents() {
        let (mut arena, root) = new_root(NodeType::Object, 4096);
        arena.ensure_space(nested_set_reservation("h")).unwrap();
        let nested_ofs = set_nested(&mut arena, root, "h", NodeType::Object).unwrap();
        arena
            .ensure_space(scalar_set_reservation("a", &Scalar::Bool(true)))
            .unwrap();
        set_scalar(&mut arena, nested_ofs, "a", Scalar::Bool(true)).unwrap();
        assert!(has(&arena, nested_ofs, "a").unwrap());

        arena.ensure_space(nested_set_reservation("h")).unwrap();
        let reinit_ofs = set_nested(&mut arena, root, "h", NodeType::Object).unwrap();
        assert_eq!(reinit_ofs, nested_ofs);
        assert!(!has(&arena, reinit_ofs, "a").unwrap());
    }
}
