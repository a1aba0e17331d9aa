// Copyright 2019-2020 PolkaX Authors. Licensed under GPL-3.0.

//! A bump-allocated, geometrically growable byte region.
//!
//! There is no freelist and nothing is ever reclaimed: every reservation
//! advances `used` monotonically toward higher offsets. This mirrors the
//! wire format's own append-only discipline: dead bytes left behind by an
//! overwrite simply become unreachable, not reused.

use lite3_params::MAX_BUFFER_LEN;

use crate::bytes::align_offset;
use crate::error::{Lite3Error, Result};

/// The growable backing store for a single Lite3 buffer.
#[derive(Debug, Clone)]
pub struct Arena {
    buf: Vec<u8>,
    used: u32,
}

impl Arena {
    /// Creates an empty arena with at least `capacity` bytes of backing
    /// storage already allocated.
    pub fn new(capacity: u32) -> Self {
        Arena {
            buf: vec![0u8; capacity as usize],
            used: 0,
        }
    }

    /// Wraps an already-encoded buffer, trusting the caller's `used` length
    /// with no validation. Consumers must trust the producer.
    pub fn from_existing(bytes: Vec<u8>, used: u32) -> Self {
        Arena { buf: bytes, used }
    }

    /// Bytes actually written so far.
    pub fn used(&self) -> u32 {
        self.used
    }

    /// A view of the used region only.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.used as usize]
    }

    /// The full backing storage, including capacity beyond `used`. Node and
    /// value accessors read/write through this; callers are responsible for
    /// checking offsets against [`Arena::used`] first.
    pub fn raw(&self) -> &[u8] {
        &self.buf
    }

    /// Mutable access to the full backing storage.
    pub fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Fails if `offset + len` runs past the used region.
    pub fn check_bounds(&self, offset: u32, len: u32) -> Result<()> {
        let end = offset.checked_add(len).ok_or(Lite3Error::OutOfBounds {
            offset,
            used: self.used,
        })?;
        if end > self.used {
            return Err(Lite3Error::OutOfBounds {
                offset,
                used: self.used,
            });
        }
        Ok(())
    }

    /// Grows the backing storage so that at least `self.used + additional`
    /// bytes are addressable, doubling capacity at minimum, and never
    /// exceeding [`MAX_BUFFER_LEN`].
    pub fn ensure_space(&mut self, additional: u32) -> Result<()> {
        let needed = self
            .used
            .checked_add(additional)
            .ok_or(Lite3Error::NoBufferSpace)?;
        if needed > MAX_BUFFER_LEN {
            return Err(Lite3Error::NoBufferSpace);
        }
        if (self.buf.len() as u32) >= needed {
            return Ok(());
        }
        let doubled = (self.buf.len() as u32).saturating_mul(2).max(1);
        let new_cap = doubled.max(needed).min(MAX_BUFFER_LEN);
        self.buf.resize(new_cap as usize, 0);
        Ok(())
    }

    /// Aligns the current tail to `align`, ensures `size` bytes of space
    /// starting there, advances `used` past them, and returns the aligned
    /// offset the caller should write `size` bytes at.
    pub fn reserve_aligned(&mut self, size: u32, align: u32) -> Result<u32> {
        let aligned = align_offset(self.used, align);
        let padding = aligned - self.used;
        self.ensure_space(padding + size)?;
        self.used = aligned + size;
        Ok(aligned)
    }

    /// Reserves `size` bytes at the current tail with no alignment
    /// requirement.
    pub fn reserve(&mut self, size: u32) -> Result<u32> {
        self.reserve_aligned(size, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_advances_used_and_zero_fills() {
        let mut arena = Arena::new(4);
        let ofs = arena.reserve(10).unwrap();
        assert_eq!(ofs, 0);
        assert_eq!(arena.used(), 10);
        assert!(arena.raw().len() >= 10);
    }

    #[test]
    fn reserve_aligned_pads_to_boundary() {
        let mut arena = Arena::new(4);
        arena.reserve(1).unwrap();
        let ofs = arena.reserve_aligned(8, 4).unwrap();
        assert_eq!(ofs, 4);
        assert_eq!(arena.used(), 12);
    }

    #[test]
    fn ensure_space_doubles_geometrically() {
        let mut arena = Arena::new(8);
        arena.reserve(8).unwrap();
        arena.ensure_space(1).unwrap();
        assert_eq!(arena.raw().len(), 16);
    }

    #[test]
    fn check_bounds_rejects_past_used() {
        let mut arena = Arena::new(4);
        arena.reserve(4).unwrap();
        assert!(arena.check_bounds(0, 4).is_ok());
        assert!(arena.check_bounds(1, 4).is_err());
    }
}
