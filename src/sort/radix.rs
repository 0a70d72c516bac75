//! LSD radix sorts for integer keys.
//!
//! Signed keys are sorted on their sign-flipped bit pattern so that unsigned
//! byte order equals numeric order. Every pass is a stable counting sort, so
//! the paired variant can sort by the second key first and the first key
//! last.

use crate::types::ordered_u64;

/// Sort signed 64-bit keys ascending: 8 passes of 8 bits.
///
/// Passes whose digit is identical for every key are skipped.
pub fn radix_sort_i64(keys: &mut [i64]) {
    if keys.len() < 2 {
        return;
    }
    let mut src: Vec<u64> = keys.iter().map(|&k| ordered_u64(k)).collect();
    let mut dst = vec![0u64; src.len()];

    for pass in 0..8 {
        let shift = pass * 8;
        let mut counts = [0usize; 256];
        for &v in &src {
            counts[((v >> shift) & 0xFF) as usize] += 1;
        }
        if counts.iter().any(|&c| c == src.len()) {
            continue;
        }
        prefix_sums(&mut counts);
        for &v in &src {
            let digit = ((v >> shift) & 0xFF) as usize;
            dst[counts[digit]] = v;
            counts[digit] += 1;
        }
        std::mem::swap(&mut src, &mut dst);
    }

    for (k, v) in keys.iter_mut().zip(src) {
        *k = (v ^ 0x8000_0000_0000_0000) as i64;
    }
}

/// Sort `(k1, k2)` pairs ascending by `k1` then `k2`.
///
/// Four 16-bit passes over `k2`, then four over `k1`.
pub fn radix_sort_pairs(pairs: &mut [(i64, i64)]) {
    if pairs.len() < 2 {
        return;
    }
    let mut src: Vec<(u64, u64)> =
        pairs.iter().map(|&(a, b)| (ordered_u64(a), ordered_u64(b))).collect();
    let mut dst = vec![(0u64, 0u64); src.len()];
    let mut counts = vec![0usize; 1 << 16];

    for pass in 0..8 {
        let first = pass >= 4;
        let shift = (pass % 4) * 16;
        let digit = |p: &(u64, u64)| {
            let v = if first { p.0 } else { p.1 };
            ((v >> shift) & 0xFFFF) as usize
        };

        counts.iter_mut().for_each(|c| *c = 0);
        for p in &src {
            counts[digit(p)] += 1;
        }
        if counts.iter().any(|&c| c == src.len()) {
            continue;
        }
        prefix_sums(&mut counts);
        for p in &src {
            let d = digit(p);
            dst[counts[d]] = *p;
            counts[d] += 1;
        }
        std::mem::swap(&mut src, &mut dst);
    }

    for (out, (a, b)) in pairs.iter_mut().zip(src) {
        *out = ((a ^ 0x8000_0000_0000_0000) as i64, (b ^ 0x8000_0000_0000_0000) as i64);
    }
}

/// Turn bucket counts into bucket start offsets.
fn prefix_sums(counts: &mut [usize]) {
    let mut sum = 0;
    for c in counts.iter_mut() {
        let n = *c;
        *c = sum;
        sum += n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_radix_sort_i64() {
        let mut keys = vec![5, -1, i64::MAX, 0, i64::MIN, 3, -300, 5];
        radix_sort_i64(&mut keys);
        assert_eq!(keys, vec![i64::MIN, -300, -1, 0, 3, 5, 5, i64::MAX]);
    }

    #[test]
    fn test_radix_sort_matches_std() {
        let mut rng = rand::rng();
        let mut keys: Vec<i64> = (0..5000).map(|_| rng.random_range(-100_000..100_000)).collect();
        let mut expected = keys.clone();
        expected.sort();
        radix_sort_i64(&mut keys);
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_radix_sort_pairs() {
        let mut pairs = vec![(1, 10), (1, 5), (2, 1), (-7, 3), (1, -5)];
        radix_sort_pairs(&mut pairs);
        assert_eq!(pairs, vec![(-7, 3), (1, -5), (1, 5), (1, 10), (2, 1)]);
    }

    #[test]
    fn test_radix_sort_pairs_matches_std() {
        let mut rng = rand::rng();
        let mut pairs: Vec<(i64, i64)> =
            (0..3000).map(|_| (rng.random_range(-50..50), rng.random_range(-1000..1000))).collect();
        let mut expected = pairs.clone();
        expected.sort();
        radix_sort_pairs(&mut pairs);
        assert_eq!(pairs, expected);
    }
}
