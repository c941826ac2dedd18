//! Most-significant-digit radix sort over integer keys
//!
//! Sorts plain `u64` values or [KeyPair]s ordered by their key.
//! With more than one part the array is sorted as independent runs
//! which are then read back in merged order without materializing
//! the merged array.
use crate::error::{FmIndexError, Result};
use std::{cmp::min, mem};

/// Buckets at or below this size are finished with a comparison sort
pub const SMALL_BUCKET: usize = 64;

const DIGIT_BITS: u32 = 8;
const NUM_DIGITS: usize = 1 << DIGIT_BITS;

// --------------------------------------------------
pub trait RadixKey: Copy + Default + Send + Sync {
    fn key(&self) -> u64;
}

impl RadixKey for u64 {
    #[inline(always)]
    fn key(&self) -> u64 {
        *self
    }
}

// --------------------------------------------------
/// A sort key with an attached payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyPair {
    pub key: u64,
    pub value: u64,
}

impl RadixKey for KeyPair {
    #[inline(always)]
    fn key(&self) -> u64 {
        self.key
    }
}

// --------------------------------------------------
/// Radix sorter that owns its array and scratch space
#[derive(Debug)]
pub struct RadixSort<K: RadixKey> {
    values: Vec<K>,
    temp: Vec<K>,
    run_len: usize,
    sorted_len: usize,
}

impl<K: RadixKey> RadixSort<K> {
    /// Allocate room for `max_len` elements sorted in `parts` runs
    pub fn new(max_len: usize, parts: usize) -> Result<Self> {
        if parts == 0 {
            return Err(FmIndexError::InvalidParameter(
                "radix sort needs at least one part".to_string(),
            ));
        }
        let run_len = max_len.div_ceil(parts);
        Ok(RadixSort {
            values: vec![K::default(); max_len],
            temp: vec![K::default(); run_len],
            run_len,
            sorted_len: 0,
        })
    }

    /// Maximum number of elements that fit `memory_limit` bytes
    /// when sorted in `parts` runs: the array plus one run of scratch.
    pub fn entries(pair: bool, parts: usize, memory_limit: usize) -> usize {
        let elem = if pair {
            mem::size_of::<KeyPair>()
        } else {
            mem::size_of::<u64>()
        };
        let parts = parts.max(1);
        memory_limit.saturating_mul(parts) / (elem * (parts + 1))
    }

    /// The full array, for filling before [RadixSort::sort]
    pub fn values_mut(&mut self) -> &mut [K] {
        &mut self.values
    }

    /// Bytes held by the array and the scratch buffer
    pub fn size(&self) -> usize {
        (self.values.len() + self.temp.len()) * mem::size_of::<K>()
    }

    // --------------------------------------------------
    /// Sort the first `len` elements. With one part the prefix is
    /// fully sorted; otherwise each run of `ceil(capacity / parts)`
    /// elements is sorted and [RadixSort::merged] yields them in order.
    pub fn sort(&mut self, len: usize) -> Result<()> {
        if len > self.values.len() {
            return Err(FmIndexError::InvalidParameter(format!(
                "cannot sort {len} elements with capacity {}",
                self.values.len()
            )));
        }
        for start in (0..len).step_by(self.run_len.max(1)) {
            let end = min(start + self.run_len, len);
            let run = &mut self.values[start..end];
            sort_run(run, &mut self.temp[..end - start]);
        }
        self.sorted_len = len;
        Ok(())
    }

    /// The sorted runs from the last call to [RadixSort::sort]
    pub fn runs(&self) -> Vec<&[K]> {
        self.values[..self.sorted_len]
            .chunks(self.run_len.max(1))
            .collect()
    }

    /// Stream the sorted runs in merged order
    pub fn merged(&self) -> MergedRuns<'_, K> {
        let mut runs = self.runs();
        match runs.len() {
            0 => MergedRuns::Single([].iter()),
            1 => MergedRuns::Single(runs[0].iter()),
            2 => MergedRuns::Pair(RadixReader::new(runs[0], runs[1])),
            _ => {
                // Merge the first two runs with a reader, the rest by selection
                let rest = runs.split_off(2);
                MergedRuns::Many {
                    reader: RadixReader::new(runs[0], runs[1]),
                    head: None,
                    rest: rest.into_iter().map(|r| (r, 0)).collect(),
                }
            }
        }
    }
}

// --------------------------------------------------
fn sort_run<K: RadixKey>(values: &mut [K], temp: &mut [K]) {
    if values.len() <= 1 {
        return;
    }
    let max_key = values.iter().map(|v| v.key()).max().unwrap_or(0);
    let bits = u64::BITS - max_key.leading_zeros();
    if bits == 0 {
        return;
    }
    let shift = ((bits - 1) / DIGIT_BITS) * DIGIT_BITS;
    msd_sort(values, temp, shift);
}

// --------------------------------------------------
fn msd_sort<K: RadixKey>(values: &mut [K], temp: &mut [K], shift: u32) {
    if values.len() <= SMALL_BUCKET {
        values.sort_unstable_by_key(|v| v.key());
        return;
    }

    let digit = |v: &K| ((v.key() >> shift) as usize) & (NUM_DIGITS - 1);
    let mut counts = [0usize; NUM_DIGITS];
    for val in values.iter() {
        counts[digit(val)] += 1;
    }

    let mut starts = [0usize; NUM_DIGITS];
    let mut total = 0;
    for (start, count) in starts.iter_mut().zip(counts.iter()) {
        *start = total;
        total += count;
    }

    let temp = &mut temp[..values.len()];
    let mut next = starts;
    for val in values.iter() {
        let d = digit(val);
        temp[next[d]] = *val;
        next[d] += 1;
    }
    values.copy_from_slice(temp);

    if shift == 0 {
        return;
    }
    for (start, count) in starts.iter().zip(counts.iter()) {
        if *count > 1 {
            let range = *start..start + count;
            msd_sort(
                &mut values[range.clone()],
                &mut temp[range],
                shift - DIGIT_BITS,
            );
        }
    }
}

// --------------------------------------------------
/// Two-way merge reader over two sorted runs. Ties go to the first
/// run. Returns `None` once both runs are exhausted.
#[derive(Debug, Clone)]
pub struct RadixReader<'a, K: RadixKey> {
    first: &'a [K],
    second: &'a [K],
    pos1: usize,
    pos2: usize,
}

impl<'a, K: RadixKey> RadixReader<'a, K> {
    pub fn new(first: &'a [K], second: &'a [K]) -> Self {
        RadixReader {
            first,
            second,
            pos1: 0,
            pos2: 0,
        }
    }
}

impl<K: RadixKey> Iterator for RadixReader<'_, K> {
    type Item = K;

    fn next(&mut self) -> Option<K> {
        match (self.first.get(self.pos1), self.second.get(self.pos2)) {
            (Some(a), Some(b)) => {
                if a.key() <= b.key() {
                    self.pos1 += 1;
                    Some(*a)
                } else {
                    self.pos2 += 1;
                    Some(*b)
                }
            }
            (Some(a), None) => {
                self.pos1 += 1;
                Some(*a)
            }
            (None, Some(b)) => {
                self.pos2 += 1;
                Some(*b)
            }
            (None, None) => None,
        }
    }
}

// --------------------------------------------------
/// Iterator over all runs of a [RadixSort] in key order
#[derive(Debug)]
pub enum MergedRuns<'a, K: RadixKey> {
    Single(std::slice::Iter<'a, K>),
    Pair(RadixReader<'a, K>),
    Many {
        reader: RadixReader<'a, K>,
        head: Option<K>,
        rest: Vec<(&'a [K], usize)>,
    },
}

impl<K: RadixKey> Iterator for MergedRuns<'_, K> {
    type Item = K;

    fn next(&mut self) -> Option<K> {
        match self {
            MergedRuns::Single(iter) => iter.next().copied(),
            MergedRuns::Pair(reader) => reader.next(),
            MergedRuns::Many { reader, head, rest } => {
                if head.is_none() {
                    *head = reader.next();
                }
                let mut best: Option<(u64, Option<usize>)> =
                    head.map(|h| (h.key(), None));
                for (i, (run, pos)) in rest.iter().enumerate() {
                    if let Some(val) = run.get(*pos) {
                        if best.map_or(true, |(key, _)| val.key() < key) {
                            best = Some((val.key(), Some(i)));
                        }
                    }
                }
                match best {
                    None => None,
                    Some((_, None)) => head.take(),
                    Some((_, Some(i))) => {
                        let (run, pos) = &mut rest[i];
                        *pos += 1;
                        Some(run[*pos - 1])
                    }
                }
            }
        }
    }
}

// --------------------------------------------------
#[cfg(test)]
mod test {
    use super::{KeyPair, RadixKey, RadixReader, RadixSort, SMALL_BUCKET};
    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use rand::Rng;

    fn radix_sorted<K: RadixKey>(input: &[K], parts: usize) -> Result<Vec<K>> {
        let mut sorter: RadixSort<K> = RadixSort::new(input.len(), parts)?;
        sorter.values_mut().copy_from_slice(input);
        sorter.sort(input.len())?;
        Ok(sorter.merged().collect())
    }

    #[test]
    fn test_sort_100k_random() -> Result<()> {
        let mut rng = rand::thread_rng();
        let input: Vec<u64> = (0..100_000).map(|_| rng.gen()).collect();
        let sorted = radix_sorted(&input, 1)?;
        assert!(sorted.windows(2).all(|w| w[0] <= w[1]));

        let mut expected = input.clone();
        expected.sort_unstable();
        assert_eq!(sorted, expected);
        Ok(())
    }

    #[test]
    fn test_sort_small_keys_and_duplicates() -> Result<()> {
        let mut rng = rand::thread_rng();
        let input: Vec<u64> = (0..5000).map(|_| rng.gen_range(0..300)).collect();
        let mut expected = input.clone();
        expected.sort_unstable();
        assert_eq!(radix_sorted(&input, 1)?, expected);

        let zeros = vec![0u64; SMALL_BUCKET * 3];
        assert_eq!(radix_sorted(&zeros, 2)?, zeros);

        let empty: Vec<u64> = vec![];
        assert!(radix_sorted(&empty, 1)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_sort_pairs_keeps_payloads() -> Result<()> {
        let mut rng = rand::thread_rng();
        let pairs: Vec<KeyPair> = (0..10_000)
            .map(|i| KeyPair {
                key: rng.gen_range(0..1_000_000),
                value: i,
            })
            .collect();
        let sorted = radix_sorted(&pairs, 4)?;
        assert_eq!(sorted.len(), pairs.len());
        assert!(sorted.windows(2).all(|w| w[0].key <= w[1].key));
        for pair in &sorted {
            assert_eq!(pairs[pair.value as usize].key, pair.key);
        }
        Ok(())
    }

    #[test]
    fn test_sort_parts_merged() -> Result<()> {
        let mut rng = rand::thread_rng();
        for parts in [2, 3, 5] {
            let len = 9_999;
            let input: Vec<u64> = (0..len).map(|_| rng.gen_range(0..50_000)).collect();
            let mut sorter: RadixSort<u64> = RadixSort::new(len, parts)?;
            sorter.values_mut().copy_from_slice(&input);
            sorter.sort(len)?;
            assert_eq!(sorter.runs().len(), parts);
            for run in sorter.runs() {
                assert!(run.windows(2).all(|w| w[0] <= w[1]));
            }
            let merged: Vec<u64> = sorter.merged().collect();
            let mut expected = input.clone();
            expected.sort_unstable();
            assert_eq!(merged, expected);
        }
        Ok(())
    }

    #[test]
    fn test_sort_rejects_overlong() -> Result<()> {
        let mut sorter: RadixSort<u64> = RadixSort::new(10, 1)?;
        assert!(sorter.sort(11).is_err());
        assert!(RadixSort::<u64>::new(10, 0).is_err());
        Ok(())
    }

    #[test]
    fn test_reader() -> Result<()> {
        let first = [1u64, 4, 4, 9];
        let second = [0u64, 4, 10];
        let reader = RadixReader::new(&first, &second);
        let out: Vec<u64> = reader.collect();
        assert_eq!(out, [0, 1, 4, 4, 4, 9, 10]);

        // Ties come from the first run
        let first = [KeyPair { key: 2, value: 1 }];
        let second = [KeyPair { key: 2, value: 2 }];
        let values: Vec<u64> = RadixReader::new(&first, &second).map(|p| p.value).collect();
        assert_eq!(values, [1, 2]);
        Ok(())
    }

    #[test]
    fn test_entries_and_size() -> Result<()> {
        assert_eq!(RadixSort::<u64>::entries(false, 1, 1600), 100);
        assert_eq!(RadixSort::<u64>::entries(true, 1, 3200), 100);
        assert_eq!(RadixSort::<u64>::entries(false, 3, 3200), 300);

        let sorter: RadixSort<KeyPair> = RadixSort::new(100, 1)?;
        assert_eq!(sorter.size(), 200 * 16);
        assert!(sorter.size() <= 3200);

        let sorter: RadixSort<u64> = RadixSort::new(300, 3)?;
        assert_eq!(sorter.size(), 400 * 8);
        Ok(())
    }
}
