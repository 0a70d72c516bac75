//! Membership filters for pruning equality scans.
//!
//! Every leaf and every internal entry carries a fixed 64-bit bloom filter
//! summarizing the keys of its subtree. Parents hold the bitwise OR of their
//! children, so a filter never rejects a key stored anywhere below it.

pub mod bloom;

pub use bloom::SubtreeBloom;

/// A probabilistic set of keys: no false negatives, some false positives.
pub trait Filter {
    /// False only when `key` was never added.
    fn may_contain(&self, key: &[u8]) -> bool;

    /// Insert a key.
    fn add(&mut self, key: &[u8]);
}
