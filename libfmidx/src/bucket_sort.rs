//! Ordering of suffixes that share a bucket
//!
//! Regular symbols compare by code. A special symbol or the end of
//! the sequence is larger than every regular symbol, and two suffixes
//! reaching special symbols at the same offset are ordered by their
//! start position.
use crate::{
    error::Result,
    radix_sort::{KeyPair, RadixSort, SMALL_BUCKET},
    types::{is_special, Symbol},
};
use std::cmp::Ordering;

/// Largest run of extension keys radix-sorted at once
pub const RADIX_RUN_LEN: usize = 1 << 16;

// --------------------------------------------------
#[inline(always)]
fn regular_at(text: &[Symbol], pos: usize) -> Option<Symbol> {
    text.get(pos).copied().filter(|&sym| !is_special(sym))
}

// --------------------------------------------------
/// Compare the suffixes at `a` and `b`, skipping the first `offset`
/// symbols which the caller knows to be equal
pub fn compare_suffixes(text: &[Symbol], a: usize, b: usize, offset: usize) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }
    let mut depth = offset;
    loop {
        match (regular_at(text, a + depth), regular_at(text, b + depth)) {
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
            }
            (None, None) => return a.cmp(&b),
            (None, Some(_)) => return Ordering::Greater,
            (Some(_), None) => return Ordering::Less,
        }
        depth += 1;
    }
}

// --------------------------------------------------
/// Number of base-`(num_chars + 1)` digits that fit a `u64`
pub fn key_digits(num_chars: usize) -> usize {
    let base = num_chars as u64 + 1;
    let mut digits = 0;
    let mut power: u64 = 1;
    while let Some(next) = power.checked_mul(base) {
        power = next;
        digits += 1;
    }
    digits
}

// --------------------------------------------------
/// Pack the `digits` symbols after `depth` into one key. The first
/// special symbol (or the end) becomes digit `num_chars`, every digit
/// after it is zero.
#[inline]
fn extension_key(
    text: &[Symbol],
    pos: usize,
    depth: usize,
    num_chars: usize,
    digits: usize,
) -> u64 {
    let base = num_chars as u64 + 1;
    let mut key = 0u64;
    let mut cut = false;
    for i in 0..digits {
        let digit = if cut {
            0
        } else {
            match regular_at(text, pos + depth + i) {
                Some(sym) => sym as u64,
                None => {
                    cut = true;
                    num_chars as u64
                }
            }
        };
        key = key * base + digit;
    }
    key
}

// --------------------------------------------------
/// Sort one bucket of suffix positions whose first `depth` symbols
/// are known to be equal. Returns the bytes held by the radix sorter.
pub fn sort_bucket(
    text: &[Symbol],
    bucket: &mut [usize],
    depth: usize,
    num_chars: usize,
) -> Result<usize> {
    sort_bucket_in_runs(text, bucket, depth, num_chars, RADIX_RUN_LEN)
}

// --------------------------------------------------
/// Large buckets are radix-sorted on extension keys in runs of at
/// most `run_len` and read back in merged order
fn sort_bucket_in_runs(
    text: &[Symbol],
    bucket: &mut [usize],
    depth: usize,
    num_chars: usize,
    run_len: usize,
) -> Result<usize> {
    if bucket.len() <= 1 {
        return Ok(0);
    }
    if bucket.len() <= SMALL_BUCKET {
        bucket.sort_unstable_by(|&a, &b| compare_suffixes(text, a, b, depth));
        return Ok(0);
    }

    let digits = key_digits(num_chars);
    let parts = bucket.len().div_ceil(run_len.max(1));
    let mut sorter: RadixSort<KeyPair> = RadixSort::new(bucket.len(), parts)?;
    for (slot, &pos) in sorter.values_mut().iter_mut().zip(bucket.iter()) {
        *slot = KeyPair {
            key: extension_key(text, pos, depth, num_chars, digits),
            value: pos as u64,
        };
    }
    sorter.sort(bucket.len())?;

    // Equal keys share the next `digits` symbols or were cut at the
    // same offset; finish those runs by comparison
    let mut merged = sorter.merged();
    let mut filled = 0;
    let mut pending = merged.next();
    while let Some(first) = pending {
        let start = filled;
        bucket[filled] = first.value as usize;
        filled += 1;
        pending = merged.next();
        while let Some(pair) = pending.filter(|pair| pair.key == first.key) {
            bucket[filled] = pair.value as usize;
            filled += 1;
            pending = merged.next();
        }
        if filled - start > 1 {
            bucket[start..filled]
                .sort_unstable_by(|&a, &b| compare_suffixes(text, a, b, depth));
        }
    }
    Ok(sorter.size())
}

// --------------------------------------------------
/// Reference suffix array by plain comparison sorting, including the
/// end position
pub fn naive_suffix_array(text: &[Symbol]) -> Vec<usize> {
    let mut suffixes: Vec<usize> = (0..=text.len()).collect();
    suffixes.sort_by(|&a, &b| compare_suffixes(text, a, b, 0));
    suffixes
}

// --------------------------------------------------
#[cfg(test)]
mod test {
    use super::{
        compare_suffixes, key_digits, naive_suffix_array, sort_bucket, sort_bucket_in_runs,
    };
    use crate::types::{SEPARATOR, WILDCARD};
    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use rand::Rng;
    use std::cmp::Ordering;

    #[test]
    fn test_compare_suffixes() -> Result<()> {
        // $=0 a=1 b=2 n=3
        let text = [2, 1, 3, 1, 3, 1, 0];
        assert_eq!(compare_suffixes(&text, 3, 1, 0), Ordering::Less);
        assert_eq!(compare_suffixes(&text, 6, 5, 0), Ordering::Less);
        assert_eq!(compare_suffixes(&text, 7, 6, 0), Ordering::Greater);
        assert_eq!(compare_suffixes(&text, 2, 2, 0), Ordering::Equal);

        // Both hit a special at the same offset: position decides
        let text = [0, WILDCARD, 0, SEPARATOR, 0];
        assert_eq!(compare_suffixes(&text, 2, 0, 0), Ordering::Greater);
        assert_eq!(compare_suffixes(&text, 0, 4, 0), Ordering::Less);
        assert_eq!(compare_suffixes(&text, 1, 3, 0), Ordering::Less);
        Ok(())
    }

    #[test]
    fn test_naive_banana() -> Result<()> {
        let text = [2, 1, 3, 1, 3, 1, 0];
        assert_eq!(naive_suffix_array(&text), [6, 5, 3, 1, 0, 4, 2, 7]);
        Ok(())
    }

    #[test]
    fn test_key_digits() -> Result<()> {
        assert_eq!(key_digits(1), 64);
        assert_eq!(key_digits(3), 32);
        assert_eq!(key_digits(4), 27);
        Ok(())
    }

    #[test]
    fn test_sort_bucket_large() -> Result<()> {
        let mut rng = rand::thread_rng();
        for num_chars in [2usize, 4] {
            let text: Vec<u8> = (0..3000)
                .map(|_| {
                    if rng.gen_ratio(1, 50) {
                        WILDCARD
                    } else {
                        rng.gen_range(0..num_chars as u8)
                    }
                })
                .collect();
            let mut bucket: Vec<usize> = (0..=text.len()).collect();
            sort_bucket(&text, &mut bucket, 0, num_chars)?;
            assert_eq!(bucket, naive_suffix_array(&text));
        }
        Ok(())
    }

    #[test]
    fn test_sort_bucket_repetitive() -> Result<()> {
        let mut text = vec![0u8; 500];
        text.extend([1, 0, 1, 0].repeat(50));
        let mut bucket: Vec<usize> = (0..text.len()).filter(|&i| text[i] == 0).collect();
        let mut expected = bucket.clone();
        expected.sort_by(|&a, &b| compare_suffixes(&text, a, b, 0));
        sort_bucket(&text, &mut bucket, 1, 2)?;
        assert_eq!(bucket, expected);
        Ok(())
    }

    #[test]
    fn test_sort_bucket_in_runs() -> Result<()> {
        let mut rng = rand::thread_rng();
        let text: Vec<u8> = (0..2500)
            .map(|_| {
                if rng.gen_ratio(1, 40) {
                    SEPARATOR
                } else {
                    rng.gen_range(0..3)
                }
            })
            .collect();
        let expected = naive_suffix_array(&text);
        for run_len in [100, 1000, 2501] {
            let mut bucket: Vec<usize> = (0..=text.len()).rev().collect();
            let bytes = sort_bucket_in_runs(&text, &mut bucket, 0, 3, run_len)?;
            assert_eq!(bucket, expected);
            // Keys and positions of the bucket plus one run of scratch
            assert!(bytes > 2501 * 16);
            assert!(bytes <= (2501 + run_len) * 16);
        }

        // Long repeats tie on every key
        let text = [0u8, 1].repeat(300);
        let mut bucket: Vec<usize> = (0..text.len()).step_by(2).collect();
        let mut expected = bucket.clone();
        expected.sort_by(|&a, &b| compare_suffixes(&text, a, b, 0));
        sort_bucket_in_runs(&text, &mut bucket, 0, 2, 50)?;
        assert_eq!(bucket, expected);
        Ok(())
    }
}
