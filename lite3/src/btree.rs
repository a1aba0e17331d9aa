// Copyright 2019-2020 PolkaX Authors. Licensed under GPL-3.0.

//! Find, insert and split over the in-place B-tree embedded in a
//! [`crate::arena::Arena`].
//!
//! Every tree here is independently rooted: the `root_ofs` a caller passes
//! is whichever node is currently playing the role of root for that
//! subtree (the true buffer root at offset 0 for the outermost value, or a
//! nested object/array's own node for anything underneath it). Generation
//! and subtree-size bookkeeping is always relative to that `root_ofs`, not
//! to offset 0.

use log::debug;

use lite3_params::{MAX_KEYS, MAX_TREE_HEIGHT, MEDIAN_INDEX, MIN_KEYS, NODE_SIZE};

use crate::arena::Arena;
use crate::error::{Lite3Error, Result};
use crate::node::{
    self, child_ofs_at, hash_at, init_node, is_leaf, key_count, kv_ofs_at, set_child_ofs_at,
    set_hash_at, set_key_count, set_kv_ofs_at,
};

/// Worst-case arena headroom an `insert` may consume beyond the payload
/// itself: up to one root split (two fresh 96-byte nodes) and one interior
/// split on the path back down (one fresh 96-byte node), each possibly
/// preceded by alignment padding.
pub const MAX_SPLIT_OVERHEAD: u32 = 3 * NODE_SIZE + 3 * lite3_params::DEFAULT_ALIGNMENT;

/// Outcome of [`insert`]: whether the hash was already present, and where
/// its slot lives either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// `hash` was not present; a slot was made for it at `(node_ofs, index)`
    /// with `kv_ofs` left unset. The caller must write the payload and call
    /// [`record_new_payload`].
    New { node_ofs: u32, index: usize },
    /// `hash` was already present at `(node_ofs, index)`.
    Existing { node_ofs: u32, index: usize },
}

/// Looks up `hash` under the subtree rooted at `root_ofs` without mutating
/// anything. Returns `Ok(None)` if absent.
pub fn find(buf: &[u8], root_ofs: u32, hash: u32) -> Result<Option<(u32, usize)>> {
    let mut node_ofs = root_ofs;
    let mut depth = 0u32;
    loop {
        log::trace!("find: descending into node {} for hash {}", node_ofs, hash);
        depth += 1;
        if depth > MAX_TREE_HEIGHT {
            return Err(Lite3Error::BadMessage(format!(
                "tree height exceeded {} while searching for hash {}",
                MAX_TREE_HEIGHT, hash
            )));
        }
        let kc = key_count(buf, node_ofs);
        let mut i = 0;
        while i < kc && hash_at(buf, node_ofs, i) < hash {
            i += 1;
        }
        if i < kc && hash_at(buf, node_ofs, i) == hash {
            return Ok(Some((node_ofs, i)));
        }
        if is_leaf(buf, node_ofs) {
            return Ok(None);
        }
        node_ofs = child_ofs_at(buf, node_ofs, i);
    }
}

/// Inserts `hash` into the subtree rooted at `root_ofs`, splitting any full
/// node encountered along the way. Bumps `root_ofs`'s generation counter
/// exactly once, at the start, regardless of outcome.
///
/// The caller must have already reserved `MAX_SPLIT_OVERHEAD + payload_size`
/// bytes of arena headroom before calling this.
pub fn insert(arena: &mut Arena, root_ofs: u32, hash: u32) -> Result<InsertOutcome> {
    let gen = node::bump_generation(arena.raw_mut(), root_ofs);
    debug!("insert: bumped generation of root {} to {}", root_ofs, gen);

    let mut node_ofs = root_ofs;
    // (parent_ofs, child_index) pairs from the true root down to node_ofs's parent.
    let mut path: Vec<(u32, usize)> = Vec::new();

    loop {
        if path.len() as u32 > MAX_TREE_HEIGHT {
            return Err(Lite3Error::BadMessage(format!(
                "tree height exceeded {} while inserting hash {}",
                MAX_TREE_HEIGHT, hash
            )));
        }

        if key_count(arena.raw(), node_ofs) == MAX_KEYS {
            match path.last().copied() {
                None => {
                    split_root(arena, node_ofs)?;
                    // root stays at node_ofs; rescan it with its new single key.
                }
                Some((parent_ofs, child_index)) => {
                    split_interior(arena, parent_ofs, child_index, node_ofs)?;
                    path.pop();
                    node_ofs = parent_ofs;
                }
            }
            continue;
        }

        let buf = arena.raw();
        let kc = key_count(buf, node_ofs);
        let mut i = 0;
        while i < kc && hash_at(buf, node_ofs, i) < hash {
            i += 1;
        }
        if i < kc && hash_at(buf, node_ofs, i) == hash {
            return Ok(InsertOutcome::Existing { node_ofs, index: i });
        }
        if is_leaf(buf, node_ofs) {
            insert_entry_at(arena.raw_mut(), node_ofs, i, hash, kc);
            return Ok(InsertOutcome::New { node_ofs, index: i });
        }
        let child = child_ofs_at(buf, node_ofs, i);
        path.push((node_ofs, i));
        node_ofs = child;
    }
}

/// After writing a *new* entry's payload at `kv_ofs`, records it in the
/// node/index an [`InsertOutcome::New`] pointed at and bumps the subtree
/// size rooted at `root_ofs`.
pub fn record_new_payload(arena: &mut Arena, root_ofs: u32, node_ofs: u32, index: usize, kv_ofs: u32) {
    set_kv_ofs_at(arena.raw_mut(), node_ofs, index, kv_ofs);
    let size = node::subtree_size(arena.raw(), root_ofs);
    node::set_subtree_size(arena.raw_mut(), root_ofs, size + 1);
}

/// Shifts entries `[index..key_count)` one slot right and writes `hash` at
/// `index` with an unset (zero) `kv_ofs`, then bumps `key_count` by one.
/// Does not touch child offsets; callers at a leaf never need to.
fn insert_entry_at(buf: &mut [u8], node_ofs: u32, index: usize, hash: u32, key_count_before: usize) {
    for j in (index..key_count_before).rev() {
        let h = hash_at(buf, node_ofs, j);
        let kv = kv_ofs_at(buf, node_ofs, j);
        set_hash_at(buf, node_ofs, j + 1, h);
        set_kv_ofs_at(buf, node_ofs, j + 1, kv);
    }
    set_hash_at(buf, node_ofs, index, hash);
    set_kv_ofs_at(buf, node_ofs, index, 0);
    set_key_count(buf, node_ofs, key_count_before + 1);
}

/// Shifts entries `[index..key_count)` and children `[index+1..=key_count]`
/// one slot right, writes `hash`/`kv_ofs` at `index` and `child_ofs` at
/// `index+1`, then bumps `key_count` by one. Used to install a split's
/// median and new sibling into a parent.
fn insert_entry_and_child_at(
    buf: &mut [u8],
    node_ofs: u32,
    index: usize,
    hash: u32,
    kv_ofs: u32,
    child_ofs: u32,
    key_count_before: usize,
) {
    for j in (index..key_count_before).rev() {
        let h = hash_at(buf, node_ofs, j);
        let kv = kv_ofs_at(buf, node_ofs, j);
        set_hash_at(buf, node_ofs, j + 1, h);
        set_kv_ofs_at(buf, node_ofs, j + 1, kv);
    }
    for j in (index + 1..=key_count_before).rev() {
        let c = child_ofs_at(buf, node_ofs, j);
        set_child_ofs_at(buf, node_ofs, j + 1, c);
    }
    set_hash_at(buf, node_ofs, index, hash);
    set_kv_ofs_at(buf, node_ofs, index, kv_ofs);
    set_child_ofs_at(buf, node_ofs, index + 1, child_ofs);
    set_key_count(buf, node_ofs, key_count_before + 1);
}

/// Splits a full root in place: the current 96 bytes become the new left
/// child, a fresh right child is appended, and the root is reinitialized
/// with a single median entry pointing at both.
fn split_root(arena: &mut Arena, root_ofs: u32) -> Result<()> {
    let buf = arena.raw();
    let ty = node::node_type(buf, root_ofs)?;
    let gen = node::generation(buf, root_ofs);
    let size = node::subtree_size(buf, root_ofs);
    let mut root_copy = vec![0u8; NODE_SIZE as usize];
    root_copy.copy_from_slice(&buf[root_ofs as usize..root_ofs as usize + NODE_SIZE as usize]);

    let left_ofs = arena.reserve_aligned(NODE_SIZE, lite3_params::DEFAULT_ALIGNMENT)?;
    arena.raw_mut()[left_ofs as usize..left_ofs as usize + NODE_SIZE as usize]
        .copy_from_slice(&root_copy);
    let right_ofs = arena.reserve_aligned(NODE_SIZE, lite3_params::DEFAULT_ALIGNMENT)?;
    init_node(arena.raw_mut(), right_ofs, ty);

    let median_hash = hash_at(&root_copy, 0, MEDIAN_INDEX);
    let median_kv = kv_ofs_at(&root_copy, 0, MEDIAN_INDEX);

    for i in 0..MIN_KEYS {
        let h = hash_at(&root_copy, 0, MEDIAN_INDEX + 1 + i);
        let kv = kv_ofs_at(&root_copy, 0, MEDIAN_INDEX + 1 + i);
        set_hash_at(arena.raw_mut(), right_ofs, i, h);
        set_kv_ofs_at(arena.raw_mut(), right_ofs, i, kv);
    }
    for i in 0..MIN_KEYS + 1 {
        let c = child_ofs_at(&root_copy, 0, MEDIAN_INDEX + 1 + i);
        set_child_ofs_at(arena.raw_mut(), right_ofs, i, c);
    }
    set_key_count(arena.raw_mut(), right_ofs, MIN_KEYS);
    set_key_count(arena.raw_mut(), left_ofs, MIN_KEYS);

    init_node(arena.raw_mut(), root_ofs, ty);
    node::set_subtree_size(arena.raw_mut(), root_ofs, size);
    node::set_generation(arena.raw_mut(), root_ofs, gen);
    set_key_count(arena.raw_mut(), root_ofs, 1);
    set_hash_at(arena.raw_mut(), root_ofs, 0, median_hash);
    set_kv_ofs_at(arena.raw_mut(), root_ofs, 0, median_kv);
    set_child_ofs_at(arena.raw_mut(), root_ofs, 0, left_ofs);
    set_child_ofs_at(arena.raw_mut(), root_ofs, 1, right_ofs);

    debug!(
        "btree: split root {} around hash {} (left={}, right={})",
        root_ofs, median_hash, left_ofs, right_ofs
    );
    Ok(())
}

/// Splits a full non-root node `node_ofs` (the child at `parent_ofs`'s
/// `child_index` slot), installing the median into the already-non-full
/// parent.
fn split_interior(arena: &mut Arena, parent_ofs: u32, child_index: usize, node_ofs: u32) -> Result<()> {
    let buf = arena.raw();
    let ty = node::node_type(buf, node_ofs)?;
    let median_hash = hash_at(buf, node_ofs, MEDIAN_INDEX);
    let median_kv = kv_ofs_at(buf, node_ofs, MEDIAN_INDEX);

    let mut upper_hash = [0u32; MIN_KEYS];
    let mut upper_kv = [0u32; MIN_KEYS];
    for i in 0..MIN_KEYS {
        upper_hash[i] = hash_at(buf, node_ofs, MEDIAN_INDEX + 1 + i);
        upper_kv[i] = kv_ofs_at(buf, node_ofs, MEDIAN_INDEX + 1 + i);
    }
    let mut upper_children = [0u32; MIN_KEYS + 1];
    for i in 0..MIN_KEYS + 1 {
        upper_children[i] = child_ofs_at(buf, node_ofs, MEDIAN_INDEX + 1 + i);
    }

    let sibling_ofs = arena.reserve_aligned(NODE_SIZE, lite3_params::DEFAULT_ALIGNMENT)?;
    init_node(arena.raw_mut(), sibling_ofs, ty);
    for i in 0..MIN_KEYS {
        set_hash_at(arena.raw_mut(), sibling_ofs, i, upper_hash[i]);
        set_kv_ofs_at(arena.raw_mut(), sibling_ofs, i, upper_kv[i]);
    }
    for i in 0..MIN_KEYS + 1 {
        set_child_ofs_at(arena.raw_mut(), sibling_ofs, i, upper_children[i]);
    }
    set_key_count(arena.raw_mut(), sibling_ofs, MIN_KEYS);
    set_key_count(arena.raw_mut(), node_ofs, MIN_KEYS);

    let parent_kc = key_count(arena.raw(), parent_ofs);
    insert_entry_and_child_at(
        arena.raw_mut(),
        parent_ofs,
        child_index,
        median_hash,
        median_kv,
        sibling_ofs,
        parent_kc,
    );

    debug!(
        "btree: split interior node {} around hash {} (parent={}, sibling={})",
        node_ofs, median_hash, parent_ofs, sibling_ofs
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;

    fn new_object(cap: u32) -> (Arena, u32) {
        let mut arena = Arena::new(cap);
        let root_ofs = arena.reserve_aligned(NODE_SIZE, 4).unwrap();
        init_node(arena.raw_mut(), root_ofs, NodeType::Object);
        (arena, root_ofs)
    }

    #[test]
    fn insert_then_find_round_trips() {
        let (mut arena, root) = new_object(4096);
        for h in [10u32, 3, 77, 1] {
            arena.ensure_space(MAX_SPLIT_OVERHEAD).unwrap();
            let outcome = insert(&mut arena, root, h).unwrap();
            assert!(matches!(outcome, InsertOutcome::New { .. }));
        }
        for h in [10u32, 3, 77, 1] {
            assert!(find(arena.raw(), root, h).unwrap().is_some());
        }
        assert!(find(arena.raw(), root, 999).unwrap().is_none());
    }

    #[test]
    fn reinserting_same_hash_reports_existing() {
        let (mut arena, root) = new_object(4096);
        arena.ensure_space(MAX_SPLIT_OVERHEAD).unwrap();
        let first = insert(&mut arena, root, 42).unwrap();
        let node_ofs = match first {
            InsertOutcome::New { node_ofs, index } => {
                record_new_payload(&mut arena, root, node_ofs, index, 1234);
                node_ofs
            }
            _ => unreachable!(),
        };
        arena.ensure_space(MAX_SPLIT_OVERHEAD).unwrap();
        let second = insert(&mut arena, root, 42).unwrap();
        assert_eq!(
            second,
            InsertOutcome::Existing {
                node_ofs,
                index: 0
            }
        );
    }

    #[test]
    fn eight_keys_force_a_root_split_and_stay_sorted() {
        let (mut arena, root) = new_object(8192);
        for h in 0..8u32 {
            arena.ensure_space(MAX_SPLIT_OVERHEAD).unwrap();
            let outcome = insert(&mut arena, root, h).unwrap();
            if let InsertOutcome::New { node_ofs, index } = outcome {
                record_new_payload(&mut arena, root, node_ofs, index, 1000 + h);
            }
        }
        assert_eq!(key_count(arena.raw(), root), 1);
        assert!(!is_leaf(arena.raw(), root));
        for h in 0..8u32 {
            assert!(find(arena.raw(), root, h).unwrap().is_some());
        }
        assert_eq!(node::subtree_size(arena.raw(), root), 8);
    }

    #[test]
    fn fifty_keys_keep_height_bounded_and_nodes_in_range() {
        let (mut arena, root) = new_object(65536);
        for h in 0..50u32 {
            arena.ensure_space(MAX_SPLIT_OVERHEAD + 16).unwrap();
            let outcome = insert(&mut arena, root, h).unwrap();
            if let InsertOutcome::New { node_ofs, index } = outcome {
                record_new_payload(&mut arena, root, node_ofs, index, h);
            }
        }
        for h in 0..50u32 {
            assert!(find(arena.raw(), root, h).unwrap().is_some());
        }
        assert_eq!(node::subtree_size(arena.raw(), root), 50);
    }
}
