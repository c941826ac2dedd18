//! Construction of the rank, sample, and exception tables from a
//! stream of `(suffix, bwt symbol)` pairs in suffix-array order
use crate::{
    alphabet::Alphabet,
    bitpack::{required_bits, BitString},
    bwt_index::BwtIndex,
    encseq::EncodedSequence,
    error::{FmIndexError, Result},
    suffixer::Suffixer,
    types::{FmIndexOptions, ReadMode, SuffixerOptions, Symbol, SEPARATOR, UNDEF_BWT, WILDCARD},
};
use log::{debug, info};
use std::{borrow::Cow, ops::Range, time::Instant};

/// Number of progress callbacks per construction pass
pub const PROGRESS_TICKS: usize = 78;

/// Largest block size exponent; block counts are `u16`
pub const MAX_LOG2_BLOCK_SIZE: u32 = 15;

// --------------------------------------------------
/// Anything that can hand out a suffix array together with its BWT
pub trait SuffixBwtSource {
    /// Next suffix position (logical coordinates) and the symbol in
    /// front of it, in ascending suffix order
    fn next_entry(&mut self) -> Result<Option<(usize, Symbol)>>;

    fn total_length(&self) -> usize;

    fn special_characters(&self) -> usize;

    fn alphabet(&self) -> &Alphabet;

    fn num_chars(&self) -> usize {
        self.alphabet().num_chars()
    }

    fn read_mode(&self) -> ReadMode;

    /// Runs of special symbols in logical coordinates, ascending
    fn special_ranges(&self) -> Vec<Range<usize>>;

    fn sequence_starts(&self) -> &[usize];

    fn headers(&self) -> &[String];
}

// --------------------------------------------------
/// A suffix array built in memory for one sequence
#[derive(Debug)]
pub struct SuffixTable<'a> {
    seq: &'a EncodedSequence,
    text: Cow<'a, [Symbol]>,
    read_mode: ReadMode,
    suffixes: Vec<usize>,
    next: usize,
}

impl<'a> SuffixTable<'a> {
    pub fn new(seq: &'a EncodedSequence, opts: &SuffixerOptions) -> Result<Self> {
        let suffixes = Suffixer::new(seq, opts)?.collect()?;
        Ok(SuffixTable {
            seq,
            text: seq.logical_symbols(opts.read_mode),
            read_mode: opts.read_mode,
            suffixes,
            next: 0,
        })
    }

    pub fn suffixes(&self) -> &[usize] {
        &self.suffixes
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}

impl SuffixBwtSource for SuffixTable<'_> {
    fn next_entry(&mut self) -> Result<Option<(usize, Symbol)>> {
        Ok(self.suffixes.get(self.next).map(|&suffix| {
            self.next += 1;
            let bwt = if suffix == 0 {
                UNDEF_BWT
            } else {
                self.text[suffix - 1]
            };
            (suffix, bwt)
        }))
    }

    fn total_length(&self) -> usize {
        self.seq.len()
    }

    fn special_characters(&self) -> usize {
        self.seq.special_characters()
    }

    fn alphabet(&self) -> &Alphabet {
        self.seq.alphabet()
    }

    fn read_mode(&self) -> ReadMode {
        self.read_mode
    }

    fn special_ranges(&self) -> Vec<Range<usize>> {
        self.seq.logical_special_ranges(self.read_mode)
    }

    fn sequence_starts(&self) -> &[usize] {
        self.seq.sequence_starts()
    }

    fn headers(&self) -> &[String] {
        self.seq.headers()
    }
}

// --------------------------------------------------
/// Number of ranked rows whose BWT symbol is special or undefined:
/// one per special run followed by a regular symbol, plus the row
/// of suffix 0 when the sequence starts with a regular symbol
pub fn exception_capacity(special_ranges: &[Range<usize>], total_length: usize) -> usize {
    let followed = special_ranges
        .iter()
        .filter(|r| r.end < total_length)
        .count();
    let leading = total_length > 0 && special_ranges.first().map_or(true, |r| r.start > 0);
    followed + usize::from(leading)
}

// --------------------------------------------------
/// Packed BWT value: regular symbols keep their code, then
/// wildcard, separator, and undefined
#[inline]
pub(crate) fn symbol_to_code(sym: Symbol, num_chars: usize) -> Result<u64> {
    if (sym as usize) < num_chars {
        return Ok(sym as u64);
    }
    match sym {
        WILDCARD => Ok(num_chars as u64),
        SEPARATOR => Ok(num_chars as u64 + 1),
        UNDEF_BWT => Ok(num_chars as u64 + 2),
        _ => Err(FmIndexError::InvalidParameter(format!(
            "BWT symbol {sym} is outside an alphabet of {num_chars} characters"
        ))),
    }
}

// --------------------------------------------------
#[inline]
pub(crate) fn code_to_symbol(code: u64, num_chars: usize) -> Symbol {
    let k = num_chars as u64;
    if code < k {
        code as Symbol
    } else if code == k {
        WILDCARD
    } else if code == k + 1 {
        SEPARATOR
    } else {
        UNDEF_BWT
    }
}

// --------------------------------------------------
/// Move the codes of `num_rows` rows staged for one block into the
/// packed BWT at `first_row`
fn flush_block(
    bwt: &mut BitString,
    staged: &BitString,
    first_row: usize,
    num_rows: usize,
    code_bits: u32,
) {
    let bits = code_bits as usize;
    bwt.copy_from(first_row * bits, staged, 0, num_rows * bits);
}

// --------------------------------------------------
#[derive(Debug, Clone)]
pub struct FmIndexBuilder {
    options: FmIndexOptions,
}

impl FmIndexBuilder {
    pub fn new(options: FmIndexOptions) -> Result<Self> {
        let FmIndexOptions {
            log2_block_size,
            log2_superblock_size,
            locate_interval,
        } = options;
        if log2_block_size == 0 || log2_block_size > MAX_LOG2_BLOCK_SIZE {
            return Err(FmIndexError::InvalidParameter(format!(
                "log2 block size {log2_block_size} must be between 1 and {MAX_LOG2_BLOCK_SIZE}"
            )));
        }
        if log2_superblock_size < log2_block_size || log2_superblock_size >= usize::BITS / 2 {
            return Err(FmIndexError::InvalidParameter(format!(
                "log2 superblock size {log2_superblock_size} must be between \
                {log2_block_size} and {}",
                usize::BITS / 2 - 1
            )));
        }
        if locate_interval == Some(0) {
            return Err(FmIndexError::InvalidParameter(
                "locate interval must be at least 1".to_string(),
            ));
        }
        Ok(FmIndexBuilder { options })
    }

    pub fn options(&self) -> &FmIndexOptions {
        &self.options
    }

    // --------------------------------------------------
    /// Consume `source` in one pass and build the index
    pub fn build<S: SuffixBwtSource + ?Sized>(
        &self,
        source: &mut S,
        mut progress: Option<&mut dyn FnMut(usize, usize)>,
    ) -> Result<BwtIndex> {
        let now = Instant::now();
        let total_length = source.total_length();
        let rows = total_length + 1;
        let num_chars = source.num_chars();
        let num_classes = num_chars + 1;
        let special_characters = source.special_characters();
        let special_ranges = source.special_ranges();
        if special_ranges.iter().map(|r| r.len()).sum::<usize>() != special_characters
            || special_characters > total_length
        {
            return Err(FmIndexError::InvalidParameter(format!(
                "special ranges do not cover {special_characters} special characters"
            )));
        }
        let num_ranked = total_length - special_characters;
        let capacity = exception_capacity(&special_ranges, total_length);

        let log2_block = self.options.log2_block_size;
        let log2_superblock = self.options.log2_superblock_size;
        let num_blocks = (rows >> log2_block) + 1;
        let num_superblocks = (rows >> log2_superblock) + 2;
        let code_bits = required_bits(num_chars as u64 + 2);
        let sample_bits = required_bits(total_length as u64);
        let locate_interval = self.options.locate_interval;

        let mut bwt = BitString::new(rows * code_bits as usize);
        let block_rows = 1usize << log2_block;
        let mut staged = BitString::new(block_rows * code_bits as usize);
        let mut count = vec![0usize; num_chars + 2];
        let mut block_counts = vec![0u16; num_classes * num_blocks];
        let mut superblock_counts = vec![0usize; num_classes * num_superblocks];
        let mut samples =
            locate_interval.map(|interval| BitString::new(rows.div_ceil(interval) * sample_bits as usize));
        let mut exceptions: Vec<(usize, usize)> = Vec::with_capacity(capacity);
        let mut longest: Option<usize> = None;
        debug!(
            "{rows} rows, {num_blocks} blocks, {num_superblocks} superblocks, \
            exception capacity {capacity}"
        );

        let tick = (rows / PROGRESS_TICKS).max(1);
        let mut row = 0;
        while let Some((suffix, sym)) = source.next_entry()? {
            if row == rows {
                let mut found = rows + 1;
                while source.next_entry()?.is_some() {
                    found += 1;
                }
                return Err(FmIndexError::EntryCountMismatch {
                    expected: rows,
                    found,
                });
            }

            let code = symbol_to_code(sym, num_chars)?;
            let class = (code as usize).min(num_chars);
            staged.set_uint((row & (block_rows - 1)) * code_bits as usize, code_bits, code);
            count[class + 1] += 1;
            block_counts[class * num_blocks + (row >> log2_block)] += 1;
            superblock_counts[class * num_superblocks + (row >> log2_superblock) + 1] += 1;

            if let (Some(samples), Some(interval)) = (samples.as_mut(), locate_interval) {
                if row % interval == 0 {
                    samples.set_uint(
                        (row / interval) * sample_bits as usize,
                        sample_bits,
                        suffix as u64,
                    );
                }
            }

            if suffix == 0 {
                if let Some(first) = longest {
                    return Err(FmIndexError::LongestDefinedTwice { first, second: row });
                }
                longest = Some(row);
            }

            if row < num_ranked && class == num_chars {
                if exceptions.len() == capacity {
                    return Err(FmIndexError::ExceptionListOverflow { capacity });
                }
                exceptions.push((row, suffix));
            }

            row += 1;
            if row % block_rows == 0 {
                flush_block(&mut bwt, &staged, row - block_rows, block_rows, code_bits);
            }
            if let Some(report) = progress.as_mut() {
                if row % tick == 0 || row == rows {
                    report(row, rows);
                }
            }
        }

        if row != rows {
            return Err(FmIndexError::EntryCountMismatch {
                expected: rows,
                found: row,
            });
        }
        let tail = row % block_rows;
        if tail > 0 {
            flush_block(&mut bwt, &staged, row - tail, tail, code_bits);
        }
        if exceptions.len() != capacity {
            return Err(FmIndexError::ExceptionListUnderfilled {
                capacity,
                used: exceptions.len(),
            });
        }
        let longest = longest.ok_or(FmIndexError::LongestUndefined)?;

        // Cumulative folds
        for i in 1..count.len() {
            count[i] += count[i - 1];
        }
        for class_counts in superblock_counts.chunks_mut(num_superblocks) {
            for i in 1..class_counts.len() {
                class_counts[i] += class_counts[i - 1];
            }
        }

        let mut special_rank_starts = Vec::with_capacity(special_ranges.len());
        let mut total = 0;
        for range in &special_ranges {
            special_rank_starts.push(total);
            total += range.len();
        }

        info!(
            "Built index over {rows} rows ({} exceptions) in {:?}",
            exceptions.len(),
            now.elapsed()
        );

        Ok(BwtIndex {
            options: self.options.clone(),
            read_mode: source.read_mode(),
            alphabet: source.alphabet().clone(),
            num_chars,
            total_length,
            special_characters,
            code_bits,
            bwt,
            count,
            num_blocks,
            num_superblocks,
            block_counts,
            superblock_counts,
            sample_bits,
            samples,
            exceptions,
            special_ranges,
            special_rank_starts,
            longest,
            sequence_starts: source.sequence_starts().to_vec(),
            headers: source.headers().to_vec(),
        })
    }
}
