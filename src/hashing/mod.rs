//! Hash functions used to place keys and virtual nodes on the ring.
//!
//! Both functions are pure and total. They are reproducible across calls (tests rely on it)
//! but nothing is promised about other platforms or future versions.

/// Signature of the function used to place keys on the ring
pub type KeyHashFn = fn(&[u8]) -> u32;

/// Signature of the function used to place virtual nodes (replica tags) on the ring
pub type TagHashFn = fn(i32) -> u32;

const DJB2_SEED: u32 = 5381;
const TAG_MIX_MULTIPLIER: u32 = 0x45d9f3b;

/// djb2 string hash (`h = h * 33 + byte`, seeded at 5381).
///
/// Hashing stops at the first NUL byte, so `b"foo\0bar"` and `b"foo"` share a position.
pub fn hash_key(key: &[u8]) -> u32 {
    key.iter()
        .take_while(|byte| **byte != 0)
        .fold(DJB2_SEED, |hash, byte| {
            (hash << 5).wrapping_add(hash).wrapping_add(*byte as u32)
        })
}

/// Integer avalanche mix applied to a replica tag.
///
/// Every step (xorshift and multiplication by an odd constant) is invertible, so two distinct
/// tags never produce the same hash.
pub fn hash_server_tag(tag: i32) -> u32 {
    let mut hash = tag as u32;
    hash = ((hash >> 16) ^ hash).wrapping_mul(TAG_MIX_MULTIPLIER);
    hash = ((hash >> 16) ^ hash).wrapping_mul(TAG_MIX_MULTIPLIER);
    (hash >> 16) ^ hash
}
