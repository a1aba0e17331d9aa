// Copyright 2019-2020 PolkaX Authors. Licensed under GPL-3.0.

//! Tunable constants for the Lite3 buffer/B-tree engine.
//!
//! Collected here, rather than inlined across the engine, the same way the
//! rest of this workspace keeps protocol constants in one dedicated module.

// /////
// Node layout

/// Size in bytes of a single node header.
pub const NODE_SIZE: u32 = 96;

/// Alignment, in bytes, nodes and appended payloads are placed at.
pub const DEFAULT_ALIGNMENT: u32 = 4;

/// Maximum number of keyed entries a node may hold before it must split.
pub const MAX_KEYS: usize = 7;

/// Minimum number of keyed entries a non-root node must hold.
pub const MIN_KEYS: usize = 3;

/// Index of the median entry used when splitting a full node.
pub const MEDIAN_INDEX: usize = 3;

/// Maximum number of child offsets a node may hold (`MAX_KEYS + 1`).
pub const MAX_CHILDREN: usize = MAX_KEYS + 1;

// /////
// Buffer arena

/// Default initial capacity, in bytes, for a freshly constructed buffer.
pub const DEFAULT_CAPACITY: u32 = 1024;

/// Largest legal buffer length. The format addresses bytes with 32-bit
/// offsets, so this is `u32::MAX`.
pub const MAX_BUFFER_LEN: u32 = u32::MAX;

// /////
// Tree shape

/// Maximum legal tree height. A deeper tree indicates buffer corruption.
pub const MAX_TREE_HEIGHT: u32 = 9;

// /////
// Generation counter

/// Number of bits the root's generation counter occupies (the remaining 8
/// bits of the same word hold the node type).
pub const GENERATION_BITS: u32 = 24;

/// The generation counter wraps modulo this value.
pub const GENERATION_MODULUS: u32 = 1 << GENERATION_BITS;

// /////
// Safe-integer boundary (see DESIGN.md for the narrow/wide reader note)

/// Largest magnitude an integer may have and still be considered "safe" in
/// the JS-derived sense the wire format traces back to (2^53 - 1).
pub const MAX_SAFE_INTEGER: i64 = (1i64 << 53) - 1;

/// Smallest (most negative) safe integer, `-(2^53 - 1)`.
pub const MIN_SAFE_INTEGER: i64 = -MAX_SAFE_INTEGER;
