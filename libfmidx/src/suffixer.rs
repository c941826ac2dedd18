//! Suffix array construction by q-gram bucketing
//!
//! The builder counts the q-gram code of every suffix, turns the
//! counts into bucket borders, and then fills and sorts one part of
//! the code space at a time. Each part is handed out as a page of
//! ranked suffixes. Suffixes that start with a special symbol are
//! emitted afterwards in position order, followed by the end position.
use crate::{
    bcktab::{scan_codes, BucketTable, CodeAtPosition},
    bucket_sort::sort_bucket,
    encseq::EncodedSequence,
    error::{FmIndexError, Result},
    radix_sort::RadixSort,
    suftab_parts::{SuftabPart, SuftabParts},
    types::{
        Code, ReadMode, SuffixPage, SuffixerOptions, Symbol, MAX_CODE_VALUE,
        MAX_PREFIX_LEN,
    },
};
use log::{debug, info};
use rayon::prelude::*;
use std::{borrow::Cow, ops::Range, time::Instant};

/// Longest q-gram chosen when no prefix length is given
const MAX_RECOMMENDED_PREFIX_LEN: usize = 12;

// --------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuffixerState {
    Init,
    CountingPass,
    BucketAssignment,
    Sorting { part: usize },
    SpecialFlush,
    Done,
}

// --------------------------------------------------
/// Longest prefix length whose code space fits the code type
pub fn max_prefix_len(num_chars: usize) -> usize {
    if num_chars < 2 {
        return MAX_PREFIX_LEN;
    }
    let mut len = 0;
    let mut codes: u64 = 1;
    while len < MAX_PREFIX_LEN {
        match codes.checked_mul(num_chars as u64) {
            Some(next) if next - 1 <= MAX_CODE_VALUE => {
                codes = next;
                len += 1;
            }
            _ => break,
        }
    }
    len
}

// --------------------------------------------------
/// Prefix length used when the caller does not choose one:
/// `floor(log_σ(n / 8))`, kept between 1 and 12
pub fn recommended_prefix_len(num_chars: usize, total_length: usize) -> usize {
    if num_chars < 2 {
        return 1;
    }
    let upper = max_prefix_len(num_chars).min(MAX_RECOMMENDED_PREFIX_LEN);
    let target = total_length / 8;
    let mut len = 0;
    let mut power: usize = num_chars;
    while power <= target && len < upper {
        len += 1;
        power = match power.checked_mul(num_chars) {
            Some(p) => p,
            None => break,
        };
    }
    len.clamp(1, upper.max(1))
}

// --------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
enum FlushState {
    Idle,
    CarryingOverhang(Range<usize>),
    Exhausted,
}

// --------------------------------------------------
/// Walks the special runs (in original coordinates) and writes the
/// positions of special suffixes in logical order, then the end
#[derive(Debug)]
struct SpecialFlush {
    ranges: Vec<Range<usize>>,
    next_range: usize,
    read_mode: ReadMode,
    total_length: usize,
    state: FlushState,
}

impl SpecialFlush {
    fn new(ranges: Vec<Range<usize>>, read_mode: ReadMode, total_length: usize) -> Self {
        SpecialFlush {
            ranges,
            next_range: 0,
            read_mode,
            total_length,
            state: FlushState::Idle,
        }
    }

    fn take_range(&mut self) -> Option<Range<usize>> {
        if self.next_range >= self.ranges.len() {
            return None;
        }
        let idx = match self.read_mode {
            ReadMode::Forward => self.next_range,
            ReadMode::Reverse => self.ranges.len() - 1 - self.next_range,
        };
        self.next_range += 1;
        Some(self.ranges[idx].clone())
    }

    /// Split off what fits into `room` slots, keeping the rest as
    /// overhang for the next page
    fn split(&self, range: Range<usize>, room: usize) -> (Range<usize>, Option<Range<usize>>) {
        if range.len() <= room {
            return (range, None);
        }
        match self.read_mode {
            ReadMode::Forward => (
                range.start..range.start + room,
                Some(range.start + room..range.end),
            ),
            ReadMode::Reverse => (
                range.end - room..range.end,
                Some(range.start..range.end - room),
            ),
        }
    }

    /// Fill `page` and return the number of positions written
    fn fill(&mut self, page: &mut [usize]) -> usize {
        let mut written = 0;
        loop {
            let range = match std::mem::replace(&mut self.state, FlushState::Idle) {
                FlushState::Exhausted => {
                    self.state = FlushState::Exhausted;
                    break;
                }
                FlushState::CarryingOverhang(range) => range,
                FlushState::Idle => match self.take_range() {
                    Some(range) => range,
                    None => {
                        if written < page.len() {
                            page[written] = self.total_length;
                            written += 1;
                            self.state = FlushState::Exhausted;
                        }
                        break;
                    }
                },
            };

            let room = page.len() - written;
            if room == 0 {
                self.state = FlushState::CarryingOverhang(range);
                break;
            }

            let (emit, overhang) = self.split(range, room);
            match self.read_mode {
                ReadMode::Forward => {
                    for pos in emit {
                        page[written] = pos;
                        written += 1;
                    }
                }
                ReadMode::Reverse => {
                    for pos in emit.rev() {
                        page[written] = self.total_length - 1 - pos;
                        written += 1;
                    }
                }
            }

            if let Some(rest) = overhang {
                self.state = FlushState::CarryingOverhang(rest);
                break;
            }
        }
        written
    }
}

// --------------------------------------------------
/// Page-wise suffix array builder over one encoded sequence
#[derive(Debug)]
pub struct Suffixer<'a> {
    text: Cow<'a, [Symbol]>,
    read_mode: ReadMode,
    bcktab: BucketTable,
    parts: SuftabParts,
    special_codes: Vec<CodeAtPosition>,
    special_characters: usize,
    total_length: usize,
    buffer: Vec<usize>,
    special_page_size: usize,
    flush: SpecialFlush,
    state: SuffixerState,
}

impl<'a> Suffixer<'a> {
    /// Validate the options, count the q-gram codes, and split the
    /// code space into parts. No suffixes are sorted yet.
    pub fn new(seq: &'a EncodedSequence, opts: &SuffixerOptions) -> Result<Self> {
        let mut state = SuffixerState::Init;
        let num_chars = seq.num_chars();
        let total_length = seq.len();
        let prefix_len = opts
            .prefix_len
            .unwrap_or_else(|| recommended_prefix_len(num_chars, total_length));
        debug!("{state:?}: prefix length {prefix_len}, {num_chars} characters");

        let mut bcktab = BucketTable::new(num_chars, prefix_len)?;
        if opts.num_parts == 0 {
            return Err(FmIndexError::InvalidParameter(
                "number of parts must be at least 1".to_string(),
            ));
        }
        if opts.special_page_size == Some(0) {
            return Err(FmIndexError::InvalidParameter(
                "special page size must be at least 1".to_string(),
            ));
        }
        let max_part_width = match opts.max_memory {
            Some(mem) => {
                let entries = RadixSort::<u64>::entries(true, 1, mem);
                if entries == 0 {
                    return Err(FmIndexError::InvalidParameter(format!(
                        "memory limit of {mem} bytes cannot hold a single suffix"
                    )));
                }
                Some(entries)
            }
            None => None,
        };

        // Counting pass
        state = SuffixerState::CountingPass;
        let now = Instant::now();
        let text = seq.logical_symbols(opts.read_mode);
        let mut special_codes: Vec<CodeAtPosition> = vec![];
        let mut leftborder = std::mem::take(&mut bcktab.leftborder);
        scan_codes(
            &bcktab,
            &text,
            |_, code| leftborder[code as usize] += 1,
            |entry| special_codes.push(entry),
        );
        for entry in &special_codes {
            let max_len = entry.max_prefix_len as usize;
            for prefix_index in 1..=max_len {
                let code = bcktab.code_downscale(entry.code, prefix_index, max_len);
                leftborder[code as usize] += 1;
            }
        }
        bcktab.leftborder = leftborder;
        info!(
            "{state:?}: counted {} codes with {} special entries in {:?}",
            bcktab.num_codes,
            special_codes.len(),
            now.elapsed()
        );

        // Bucket assignment
        state = SuffixerState::BucketAssignment;
        let num_ranked = bcktab.accumulate();
        let special_characters = seq.special_characters();
        if num_ranked + special_characters != total_length {
            return Err(FmIndexError::EntryCountMismatch {
                expected: total_length - special_characters,
                found: num_ranked,
            });
        }
        let parts = match max_part_width {
            Some(width) => {
                SuftabParts::with_max_width(width, &bcktab.leftborder, bcktab.num_codes)?
            }
            None => SuftabParts::new(opts.num_parts, &bcktab.leftborder, bcktab.num_codes),
        };
        let special_page_size = opts.special_page_size.unwrap_or(if parts.is_empty() {
            special_characters + 1
        } else {
            parts.largest_width()
        });
        info!(
            "{state:?}: {num_ranked} ranked suffixes in {} part{}, largest {}",
            parts.len(),
            if parts.len() == 1 { "" } else { "s" },
            parts.largest_width()
        );

        let buffer = vec![0; parts.largest_width().max(special_page_size)];
        let flush = SpecialFlush::new(
            seq.special_ranges().to_vec(),
            opts.read_mode,
            total_length,
        );

        Ok(Suffixer {
            text,
            read_mode: opts.read_mode,
            bcktab,
            parts,
            special_codes,
            special_characters,
            total_length,
            buffer,
            special_page_size,
            flush,
            state,
        })
    }

    pub fn state(&self) -> SuffixerState {
        self.state
    }

    pub fn prefix_len(&self) -> usize {
        self.bcktab.prefix_len
    }

    pub fn parts(&self) -> &SuftabParts {
        &self.parts
    }

    pub fn read_mode(&self) -> ReadMode {
        self.read_mode
    }

    pub fn total_length(&self) -> usize {
        self.total_length
    }

    pub fn special_characters(&self) -> usize {
        self.special_characters
    }

    /// The symbols in the order they are suffix-sorted
    pub fn text(&self) -> &[Symbol] {
        &self.text
    }

    /// Bytes held by the bucket table and the page buffer
    pub fn size_in_bytes(&self) -> usize {
        self.bcktab.size_in_bytes() + self.buffer.len() * std::mem::size_of::<usize>()
    }

    // --------------------------------------------------
    /// The next page of sorted suffixes: first every part of ranked
    /// suffixes, then the special suffixes and the end position.
    /// `None` once everything has been emitted.
    pub fn next_page(&mut self) -> Result<Option<SuffixPage<'_>>> {
        if self.state == SuffixerState::BucketAssignment {
            self.state = if self.parts.is_empty() {
                SuffixerState::SpecialFlush
            } else {
                SuffixerState::Sorting { part: 0 }
            };
        }

        match self.state {
            SuffixerState::Sorting { part } => {
                let width = self.fill_part(part)?;
                self.state = if part + 1 < self.parts.len() {
                    SuffixerState::Sorting { part: part + 1 }
                } else {
                    SuffixerState::SpecialFlush
                };
                Ok(Some(SuffixPage {
                    suffixes: &self.buffer[..width],
                    special: false,
                }))
            }
            SuffixerState::SpecialFlush => {
                let written = self.flush.fill(&mut self.buffer[..self.special_page_size]);
                if written == 0 {
                    self.state = SuffixerState::Done;
                    Ok(None)
                } else {
                    Ok(Some(SuffixPage {
                        suffixes: &self.buffer[..written],
                        special: true,
                    }))
                }
            }
            _ => Ok(None),
        }
    }

    // --------------------------------------------------
    /// Drain every page into one suffix array of `n + 1` entries
    pub fn collect(mut self) -> Result<Vec<usize>> {
        let mut suffixes = Vec::with_capacity(self.total_length + 1);
        while let Some(page) = self.next_page()? {
            suffixes.extend_from_slice(page.suffixes);
        }
        Ok(suffixes)
    }

    // --------------------------------------------------
    fn fill_part(&mut self, part_num: usize) -> Result<usize> {
        let part = *self.parts.get(part_num).ok_or_else(|| {
            FmIndexError::InvalidParameter(format!("no part {part_num}"))
        })?;
        let now = Instant::now();
        let single_part = self.parts.len() == 1;
        let q = self.bcktab.prefix_len;
        let in_part = |code: Code| code >= part.min_code && code <= part.max_code;
        let mut leftborder = std::mem::take(&mut self.bcktab.leftborder);
        let suftab = &mut self.buffer[..part.width];

        // Suffixes cut short by a special symbol, by length of the cut
        // window. Entries whose windows are used up are dropped when no
        // other part needs them.
        for prefix_index in 1..q {
            for entry in &self.special_codes {
                let max_len = entry.max_prefix_len as usize;
                if max_len < prefix_index {
                    continue;
                }
                let code = self.bcktab.code_downscale(entry.code, prefix_index, max_len);
                if in_part(code) {
                    let slot = &mut leftborder[code as usize];
                    *slot -= 1;
                    suftab[*slot - part.offset] = entry.position - prefix_index;
                }
            }
            if single_part {
                self.special_codes
                    .retain(|entry| entry.max_prefix_len as usize > prefix_index);
            }
        }

        // Full windows
        scan_codes(
            &self.bcktab,
            &self.text,
            |pos, code| {
                if in_part(code) {
                    let slot = &mut leftborder[code as usize];
                    *slot -= 1;
                    suftab[*slot - part.offset] = pos;
                }
            },
            |_| {},
        );

        if leftborder[part.min_code as usize] != part.offset {
            return Err(FmIndexError::EntryCountMismatch {
                expected: part.width,
                found: part.width + part.offset - leftborder[part.min_code as usize],
            });
        }

        let sorted = sort_part(&self.text, &self.bcktab, &leftborder, &part, suftab);
        self.bcktab.leftborder = leftborder;
        sorted?;

        info!(
            "Sorted {} suffixes in part {part_num} in {:?}",
            part.width,
            now.elapsed()
        );
        Ok(part.width)
    }
}

// --------------------------------------------------
/// Sort every bucket of the part in parallel. `leftborder` holds the
/// bucket starts once all suffixes of the part are inserted.
fn sort_part(
    text: &[Symbol],
    bcktab: &BucketTable,
    leftborder: &[usize],
    part: &SuftabPart,
    suftab: &mut [usize],
) -> Result<()> {
    let mut buckets: Vec<(&mut [usize], usize)> = vec![];
    let mut rest: &mut [usize] = suftab;
    for code in part.min_code..=part.max_code {
        let start = leftborder[code as usize] - part.offset;
        let end = if code < part.max_code {
            leftborder[code as usize + 1] - part.offset
        } else {
            part.width
        };
        let (bucket, tail) = std::mem::take(&mut rest).split_at_mut(end - start);
        rest = tail;
        if bucket.len() > 1 {
            buckets.push((bucket, bcktab.shared_prefix_len(code)));
        }
    }
    let num_buckets = buckets.len();
    let radix_bytes = buckets
        .into_par_iter()
        .map(|(bucket, depth)| sort_bucket(text, bucket, depth, bcktab.num_chars))
        .try_reduce(|| 0, |a, b| Ok(a.max(b)))?;
    debug!(
        "Sorted {num_buckets} buckets of codes {}..={}, largest radix sort {radix_bytes} bytes",
        part.min_code, part.max_code
    );
    Ok(())
}
