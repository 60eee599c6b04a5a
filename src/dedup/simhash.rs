//! 64-bit SimHash
//!
//! Locality-sensitive hash used for near-duplicate detection: similar
//! texts produce hashes within a small Hamming distance of each other.
//! The exact construction is a behavioral contract shared with the
//! persisted hashes, so it must not change: tokens are whitespace-split
//! lowercase words, each token's rolling 32-bit hash (`h = h*31 + char`)
//! votes +1/-1 into 64 weight buckets, bucket `i` reading bit `i mod 32`
//! of the token hash, and output bit `i` is set iff its weight is
//! positive.

/// Computes the 64-bit SimHash of a text
pub fn simhash64(text: &str) -> u64 {
    let mut weights = [0i32; 64];

    for token in text.to_lowercase().split_whitespace() {
        let mut h: u32 = 0;
        for ch in token.chars() {
            h = h.wrapping_mul(31).wrapping_add(ch as u32);
        }

        for (i, weight) in weights.iter_mut().enumerate() {
            if (h >> (i % 32)) & 1 == 1 {
                *weight += 1;
            } else {
                *weight -= 1;
            }
        }
    }

    let mut hash: u64 = 0;
    for (i, weight) in weights.iter().enumerate() {
        if *weight > 0 {
            hash |= 1u64 << i;
        }
    }
    hash
}

/// Hamming distance between two hashes (XOR + popcount)
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}
