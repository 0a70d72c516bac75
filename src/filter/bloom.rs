//! Fixed-width bloom filter for subtree summaries.
//!
//! The filter is a single `u64` so it fits in every internal entry and can be
//! unioned with a bitwise OR. Bit positions come from double hashing two
//! seeded FNV-1a hashes: `h_i = h1 + i * h2 (mod 64)`.

use crate::filter::Filter;
use std::hash::Hasher;

/// Number of bits in a subtree filter.
pub const BLOOM_BITS: u32 = 64;

/// A 64-bit bloom filter with a configurable number of hash functions.
///
/// # Example
/// ```
/// use smolidx::filter::{Filter, SubtreeBloom};
///
/// let mut left = SubtreeBloom::new(2);
/// left.add(b"apple");
/// let mut right = SubtreeBloom::new(2);
/// right.add(b"pear");
///
/// left.merge(&right);
/// assert!(left.may_contain(b"apple"));
/// assert!(left.may_contain(b"pear"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtreeBloom {
    bits: u64,
    num_hashes: u8,
}

impl SubtreeBloom {
    /// Create an empty filter.
    pub fn new(num_hashes: u8) -> Self {
        Self { bits: 0, num_hashes: num_hashes.max(1) }
    }

    /// Rebuild a filter from its stored bitmap.
    pub fn from_bits(bits: u64, num_hashes: u8) -> Self {
        Self { bits, num_hashes: num_hashes.max(1) }
    }

    /// The raw bitmap.
    pub fn bits(&self) -> u64 {
        self.bits
    }

    /// Union with a filter built with the same hash count, so a parent
    /// summarises its children.
    pub fn merge(&mut self, other: &SubtreeBloom) {
        self.bits |= other.bits;
    }

    /// Bitmask of the positions a key sets.
    fn mask(&self, key: &[u8]) -> u64 {
        let h1 = hash_with_seed(key, 0xbc9f1d34);
        let h2 = hash_with_seed(key, 0xd0e89c7b) | 1;
        let mut mask = 0u64;
        for i in 0..self.num_hashes as u32 {
            let pos = h1.wrapping_add(i.wrapping_mul(h2)) % BLOOM_BITS;
            mask |= 1u64 << pos;
        }
        mask
    }
}

impl Filter for SubtreeBloom {
    fn may_contain(&self, key: &[u8]) -> bool {
        let mask = self.mask(key);
        self.bits & mask == mask
    }

    fn add(&mut self, key: &[u8]) {
        self.bits |= self.mask(key);
    }
}

fn hash_with_seed(key: &[u8], seed: u32) -> u32 {
    let mut hasher = FnvHasher::new_with_seed(seed);
    hasher.write(key);
    let h = hasher.finish();
    (h ^ (h >> 32)) as u32
}

/// Simple FNV-1a hasher
struct FnvHasher {
    state: u64,
}

impl FnvHasher {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    fn new_with_seed(seed: u32) -> Self {
        Self { state: Self::FNV_OFFSET_BASIS ^ (seed as u64) }
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= byte as u64;
            self.state = self.state.wrapping_mul(Self::FNV_PRIME);
        }
    }
}
