// Copyright 2019-2020 PolkaX Authors. Licensed under GPL-3.0.

/// Result alias used throughout the Lite3 engine.
pub type Result<T> = std::result::Result<T, Lite3Error>;

/// The error type surfaced across the Lite3 public boundary.
///
/// Reads of missing keys are NOT represented here: `get`/`has` return an
/// absent sentinel (`None`) rather than an error. Every variant here is a
/// genuine fault: a caller mistake, or a buffer that has run out of room or
/// is corrupt.
#[derive(Debug, thiserror::Error)]
pub enum Lite3Error {
    /// A handle was used before `init_object`/`init_array`, the root node is
    /// not the type the caller expected, or `set` was given a runtime value
    /// type the engine does not support.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Growing the backing buffer would exceed the 2^32-1 byte limit the
    /// 32-bit offset addressing scheme allows.
    #[error("buffer would exceed the maximum of {} bytes", lite3_params::MAX_BUFFER_LEN)]
    NoBufferSpace,

    /// Reserved for callers layering a "must exist" contract on top of
    /// `get`; the core itself never returns this, it returns `None`.
    #[error("key not found")]
    KeyNotFound,

    /// Corruption detected while descending or decoding: a tree deeper than
    /// [`lite3_params::MAX_TREE_HEIGHT`], a type tag outside 0..=7, or a
    /// length field that runs past the end of the buffer.
    #[error("malformed buffer: {0}")]
    BadMessage(String),

    /// An offset argument pointed outside the buffer's used region.
    #[error("offset {offset} is out of bounds (used length {used})")]
    OutOfBounds {
        /// The offset the caller supplied.
        offset: u32,
        /// The buffer's used length at the time of the call.
        used: u32,
    },
}
