// Copyright 2019-2020 PolkaX Authors. Licensed under GPL-3.0.

//! DJB2 key hashing for the Lite3 B-tree.
//!
//! The core orders every key by its 32-bit DJB2 hash rather than by the key
//! bytes themselves. This is NOT a cryptographic hash: two distinct keys that
//! collide under DJB2 are indistinguishable to the tree, and the later write
//! wins. See [`djb2`] for the exact algorithm.

#![deny(missing_docs)]

/// Seed DJB2 is initialized with.
pub const DJB2_SEED: u32 = 5381;

/// Hashes `key` with DJB2 (`h = h * 33 + b`, wrapping mod 2^32), seeded at
/// [`DJB2_SEED`].
///
/// The trailing NUL that terminates keys on the wire is never part of the
/// hashed bytes; callers pass the raw UTF-8 key.
///
/// # Example
/// ```
/// use lite3_hash::djb2;
///
/// assert_eq!(djb2(b""), 5381);
/// assert_eq!(djb2(b"a"), 5381u32.wrapping_mul(33).wrapping_add(b'a' as u32));
/// ```
pub fn djb2(key: &[u8]) -> u32 {
    let mut h = DJB2_SEED;
    for &b in key {
        h = h.wrapping_mul(33).wrapping_add(b as u32);
    }
    h
}

/// Number of bytes a key tag needs to address a key (including its trailing
/// NUL) of `key_len_with_nul` bytes.
///
/// Tag size is the smallest of 1..=4 bytes whose 2-bit `tag_size - 1` plus
/// remaining-bits length field can hold `key_len_with_nul`:
/// 1 byte up to 63, 2 bytes up to 16383, 3 bytes up to 4194303, 4 bytes above.
pub fn key_tag_size(key_len_with_nul: usize) -> u8 {
    if key_len_with_nul <= 0x3f {
        1
    } else if key_len_with_nul <= 0x3fff {
        2
    } else if key_len_with_nul <= 0x3f_ffff {
        3
    } else {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_hashes_to_seed() {
        assert_eq!(djb2(b""), DJB2_SEED);
    }

    #[test]
    fn matches_reference_values() {
        // h = 5381, then h = h*33 + b for 'a','b','c'
        let mut h = 5381u32;
        h = h.wrapping_mul(33).wrapping_add(b'a' as u32);
        h = h.wrapping_mul(33).wrapping_add(b'b' as u32);
        h = h.wrapping_mul(33).wrapping_add(b'c' as u32);
        assert_eq!(djb2(b"abc"), h);
    }

    #[test]
    fn distinct_keys_usually_differ() {
        assert_ne!(djb2(b"lap"), djb2(b"event"));
    }

    #[test]
    fn key_tag_size_boundaries() {
        assert_eq!(key_tag_size(1), 1);
        assert_eq!(key_tag_size(0x3f), 1);
        assert_eq!(key_tag_size(0x40), 2);
        assert_eq!(key_tag_size(0x3fff), 2);
        assert_eq!(key_tag_size(0x4000), 3);
        assert_eq!(key_tag_size(0x3f_ffff), 3);
        assert_eq!(key_tag_size(0x40_0000), 4);
    }
}
