//! Query engine over a built FM-index
//!
//! Rows are ranks in the suffix array of the logical text, including
//! the end position as the last row. Regular symbols are ranked
//! through the block and superblock tables. Wildcard, separator, and
//! undefined BWT entries share one class; the suffix in front of such
//! a row is recovered from the exception list or from the layout of
//! the special runs, which is what lets LF-mapping cross them.
use crate::{
    alphabet::Alphabet,
    bitpack::BitString,
    encseq::{original_position, EncodedSequence},
    error::{FmIndexError, QueryError, Result, VerifyError},
    esa_merge::EsaMerger,
    fm_builder::{code_to_symbol, symbol_to_code, FmIndexBuilder, SuffixTable},
    project::SuffixArrayProject,
    types::{
        is_special, FmIndexOptions, FromUsize, Int, MatchBound, MatchStatistic,
        ReadMode, SuffixerOptions, Symbol, INDEX_VERSION, UNDEF_BWT,
    },
    util::open_file,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    mem,
    ops::Range,
    time::Instant,
};

// --------------------------------------------------
/// Sizes of the parts of a built index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexSummary {
    pub total_length: usize,
    pub num_rows: usize,
    pub num_chars: usize,
    pub special_characters: usize,
    pub num_sequences: usize,
    pub read_mode: ReadMode,
    pub log2_block_size: u32,
    pub log2_superblock_size: u32,
    pub locate_interval: Option<usize>,
    pub bwt_bytes: usize,
    pub rank_bytes: usize,
    pub sample_bytes: usize,
    pub exception_entries: usize,
    pub total_bytes: usize,
    pub bits_per_symbol: f64,
}

// --------------------------------------------------
#[derive(Debug, Serialize, Deserialize)]
pub struct BwtIndex {
    pub(crate) options: FmIndexOptions,
    pub(crate) read_mode: ReadMode,
    pub(crate) alphabet: Alphabet,
    pub(crate) num_chars: usize,
    pub(crate) total_length: usize,
    pub(crate) special_characters: usize,

    /// Packed BWT codes, `code_bits` per row
    pub(crate) code_bits: u32,
    pub(crate) bwt: BitString,

    /// `count[c]` is the first row whose suffix starts with class `c`
    pub(crate) count: Vec<usize>,

    pub(crate) num_blocks: usize,
    pub(crate) num_superblocks: usize,

    /// Per class and block, occurrences within the block
    pub(crate) block_counts: Vec<u16>,

    /// Per class and superblock, occurrences before the superblock
    pub(crate) superblock_counts: Vec<usize>,

    pub(crate) sample_bits: u32,
    pub(crate) samples: Option<BitString>,

    /// `(row, suffix)` for ranked rows with a special BWT symbol
    pub(crate) exceptions: Vec<(usize, usize)>,

    /// Special runs in logical coordinates and the rank of each
    /// run's first position among all special positions
    pub(crate) special_ranges: Vec<Range<usize>>,
    pub(crate) special_rank_starts: Vec<usize>,

    /// Row of suffix 0
    pub(crate) longest: usize,

    pub(crate) sequence_starts: Vec<usize>,
    pub(crate) headers: Vec<String>,
}

impl BwtIndex {
    /// Sort the suffixes of `seq` in memory and index them
    pub fn build(
        seq: &EncodedSequence,
        suffixer_opts: &SuffixerOptions,
        index_opts: &FmIndexOptions,
    ) -> Result<Self> {
        let builder = FmIndexBuilder::new(index_opts.clone())?;
        let mut table = SuffixTable::new(seq, suffixer_opts)?;
        builder.build(&mut table, None)
    }

    /// Index a suffix-array project read from disk
    pub fn from_project<T>(
        filename: &str,
        index_opts: &FmIndexOptions,
        progress: Option<&mut dyn FnMut(usize, usize)>,
    ) -> Result<Self>
    where
        T: Int + FromUsize<T> + Sized + Send + Sync + serde::ser::Serialize,
    {
        let builder = FmIndexBuilder::new(index_opts.clone())?;
        let mut project: SuffixArrayProject<T> = SuffixArrayProject::read(filename)?;
        let mut source = project.source();
        builder.build(&mut source, progress)
    }

    /// Index the concatenation of several projects, separated by
    /// separator symbols, without re-sorting
    pub fn from_merged_projects<T>(
        filenames: &[String],
        index_opts: &FmIndexOptions,
        progress: Option<&mut dyn FnMut(usize, usize)>,
    ) -> Result<Self>
    where
        T: Int + FromUsize<T> + Sized + Send + Sync + serde::ser::Serialize,
    {
        let builder = FmIndexBuilder::new(index_opts.clone())?;
        let projects = filenames
            .iter()
            .map(|filename| SuffixArrayProject::<T>::read(filename))
            .collect::<Result<Vec<_>>>()?;
        let mut merger = EsaMerger::new(projects)?;
        builder.build(&mut merger, progress)
    }

    // --------------------------------------------------
    pub fn write(&self, filename: &str) -> Result<usize> {
        let now = Instant::now();
        let mut file = BufWriter::new(File::create(filename).map_err(|source| {
            FmIndexError::OpenFile {
                filename: filename.to_string(),
                source,
            }
        })?);
        file.write_all(&[INDEX_VERSION])?;
        let payload = bincode::serialize(self)?;
        file.write_all(&payload)?;
        file.flush()?;
        info!("Wrote index to '{filename}' in {:?}", now.elapsed());
        Ok(payload.len() + 1)
    }

    pub fn read(filename: &str) -> Result<Self> {
        let now = Instant::now();
        let mut file = BufReader::new(open_file(filename)?);
        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != INDEX_VERSION {
            return Err(FmIndexError::UnknownVersion {
                filename: filename.to_string(),
                version: version[0],
            });
        }
        let index: BwtIndex = bincode::deserialize_from(file)?;
        info!("Read index from '{filename}' in {:?}", now.elapsed());
        Ok(index)
    }

    // --------------------------------------------------
    pub fn total_length(&self) -> usize {
        self.total_length
    }

    pub fn num_rows(&self) -> usize {
        self.total_length + 1
    }

    pub fn num_chars(&self) -> usize {
        self.num_chars
    }

    pub fn read_mode(&self) -> ReadMode {
        self.read_mode
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn options(&self) -> &FmIndexOptions {
        &self.options
    }

    pub fn count_table(&self) -> &[usize] {
        &self.count
    }

    pub fn longest(&self) -> usize {
        self.longest
    }

    pub fn has_locate(&self) -> bool {
        self.samples.is_some()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn sequence_starts(&self) -> &[usize] {
        &self.sequence_starts
    }

    /// Record number and offset within that record of an original
    /// sequence position
    pub fn sequence_position(&self, pos: usize) -> Option<(usize, usize)> {
        if pos >= self.total_length {
            return None;
        }
        let idx = self.sequence_starts.partition_point(|&start| start <= pos);
        idx.checked_sub(1)
            .map(|i| (i, pos - self.sequence_starts[i]))
    }

    // --------------------------------------------------
    #[inline]
    fn code_at(&self, row: usize) -> u64 {
        self.bwt
            .get_uint(row * self.code_bits as usize, self.code_bits)
    }

    #[inline]
    fn class_at(&self, row: usize) -> usize {
        (self.code_at(row) as usize).min(self.num_chars)
    }

    fn check_row(&self, row: usize) -> Result<()> {
        if row > self.total_length {
            return Err(QueryError::RowOutOfRange {
                row,
                last: self.total_length,
            }
            .into());
        }
        Ok(())
    }


    // --------------------------------------------------
    /// Occurrences of `class` in BWT rows `0..pos`. Classes are the
    /// regular symbols plus `num_chars` for every special entry.
    pub fn rank(&self, class: usize, pos: usize) -> usize {
        debug_assert!(class <= self.num_chars && pos <= self.num_rows());
        let log2_block = self.options.log2_block_size;
        let log2_superblock = self.options.log2_superblock_size;
        let superblock = pos >> log2_superblock;
        let mut rank = self.superblock_counts[class * self.num_superblocks + superblock];

        let first_block = superblock << (log2_superblock - log2_block);
        let block = pos >> log2_block;
        let block_base = class * self.num_blocks;
        rank += self.block_counts[block_base + first_block..block_base + block]
            .iter()
            .map(|&c| c as usize)
            .sum::<usize>();

        rank + ((block << log2_block)..pos)
            .filter(|&row| self.class_at(row) == class)
            .count()
    }

    // --------------------------------------------------
    /// The BWT symbol of `row`, with specials decoded to the
    /// wildcard, separator, or undefined value
    pub fn symbol_at_row(&self, row: usize) -> Result<Symbol> {
        self.check_row(row)?;
        Ok(code_to_symbol(self.code_at(row), self.num_chars))
    }

    // --------------------------------------------------
    /// Suffix position of a row answered without walking: every row
    /// past the ranked region and every exception row
    fn known_suffix(&self, row: usize) -> Option<usize> {
        let first_special = self.count[self.num_chars];
        if row >= first_special {
            Some(self.special_region_suffix(row - first_special))
        } else {
            self.exceptions
                .binary_search_by_key(&row, |&(r, _)| r)
                .ok()
                .map(|i| self.exceptions[i].1)
        }
    }

    /// Special suffixes are ordered by position, then the end
    fn special_region_suffix(&self, rank: usize) -> usize {
        if rank >= self.special_characters {
            return self.total_length;
        }
        let idx = self.special_rank_starts.partition_point(|&start| start <= rank) - 1;
        self.special_ranges[idx].start + rank - self.special_rank_starts[idx]
    }

    fn special_rank(&self, pos: usize) -> Result<usize> {
        let idx = self.special_ranges.partition_point(|r| r.end <= pos);
        match self.special_ranges.get(idx) {
            Some(range) if range.contains(&pos) => {
                Ok(self.special_rank_starts[idx] + pos - range.start)
            }
            _ => Err(FmIndexError::Inconsistent(format!(
                "position {pos} is not special"
            ))),
        }
    }

    // --------------------------------------------------
    /// Row of the suffix one position to the left of the suffix at `row`
    pub fn lf_map(&self, row: usize) -> Result<usize> {
        self.check_row(row)?;
        let class = self.class_at(row);
        if class < self.num_chars {
            return Ok(self.count[class] + self.rank(class, row));
        }

        let suffix = self
            .known_suffix(row)
            .ok_or_else(|| {
                FmIndexError::Inconsistent(format!("row {row} has no exception entry"))
            })?;
        if suffix == 0 {
            Ok(self.total_length)
        } else {
            Ok(self.count[self.num_chars] + self.special_rank(suffix - 1)?)
        }
    }

    // --------------------------------------------------
    /// Logical suffix position of `row`
    pub fn locate(&self, row: usize) -> Result<usize> {
        let (samples, interval) = match (&self.samples, self.options.locate_interval) {
            (Some(samples), Some(interval)) => (samples, interval),
            _ => return Err(QueryError::NoLocateSupport.into()),
        };
        self.check_row(row)?;

        let mut row = row;
        let mut steps = 0;
        loop {
            let found = if row % interval == 0 {
                Some(samples.get_uint((row / interval) * self.sample_bits as usize, self.sample_bits)
                    as usize)
            } else {
                self.known_suffix(row)
            };
            if let Some(suffix) = found {
                return Ok((suffix + steps) % self.num_rows());
            }
            if steps > self.total_length {
                return Err(FmIndexError::Inconsistent(format!(
                    "locate of row {row} does not end"
                )));
            }
            row = self.lf_map(row)?;
            steps += 1;
        }
    }

    // --------------------------------------------------
    /// Rows whose suffixes start with `pattern` (logical symbols)
    pub fn match_bound(&self, pattern: &[Symbol]) -> Result<MatchBound> {
        let last = *pattern.last().ok_or(QueryError::EmptyPattern)?;
        if let Some(&sym) = pattern
            .iter()
            .find(|&&sym| !is_special(sym) && sym as usize >= self.num_chars)
        {
            return Err(QueryError::SymbolNotInAlphabet(sym).into());
        }
        if pattern.iter().any(|&sym| is_special(sym)) {
            return Ok(MatchBound::default());
        }

        let class = last as usize;
        let mut bound = MatchBound {
            lower: self.count[class],
            upper: self.count[class + 1],
        };
        for &sym in pattern.iter().rev().skip(1) {
            if bound.is_empty() {
                break;
            }
            let class = sym as usize;
            bound = MatchBound {
                lower: self.count[class] + self.rank(class, bound.lower),
                upper: self.count[class] + self.rank(class, bound.upper),
            };
        }
        Ok(bound)
    }

    pub fn match_count(&self, pattern: &[Symbol]) -> Result<usize> {
        Ok(self.match_bound(pattern)?.width())
    }

    /// Encode `query` in original orientation and search for it
    fn query_bound(&self, query: &[u8]) -> Result<(MatchBound, usize)> {
        let mut pattern = self.alphabet.encode_query(query)?;
        if self.read_mode == ReadMode::Reverse {
            pattern.reverse();
        }
        Ok((self.match_bound(&pattern)?, pattern.len()))
    }

    /// Number of occurrences of a raw query
    pub fn count(&self, query: &[u8]) -> Result<usize> {
        Ok(self.query_bound(query)?.0.width())
    }

    /// Original positions of every occurrence of a raw query
    pub fn exact_matches(&self, query: &[u8]) -> Result<ExactMatches<'_>> {
        if !self.has_locate() {
            return Err(QueryError::NoLocateSupport.into());
        }
        let (bound, pattern_len) = self.query_bound(query)?;
        debug!("Query {} rows {bound:?}", String::from_utf8_lossy(query));
        Ok(ExactMatches {
            index: self,
            bound,
            next_row: bound.lower,
            pattern_len,
        })
    }

    // --------------------------------------------------
    fn check_reverse(&self) -> Result<()> {
        if self.read_mode != ReadMode::Reverse {
            return Err(QueryError::RequiresReverseIndex.into());
        }
        Ok(())
    }

    fn class_of(&self, sym: Symbol) -> Result<Option<usize>> {
        if is_special(sym) {
            Ok(None)
        } else if (sym as usize) < self.num_chars {
            Ok(Some(sym as usize))
        } else {
            Err(QueryError::SymbolNotInAlphabet(sym).into())
        }
    }

    #[inline]
    fn extend(&self, bound: MatchBound, class: usize) -> MatchBound {
        MatchBound {
            lower: self.count[class] + self.rank(class, bound.lower),
            upper: self.count[class] + self.rank(class, bound.upper),
        }
    }

    // --------------------------------------------------
    /// Length of the shortest prefix of `query` (original orientation)
    /// occurring exactly once, or 0 when there is none or a special
    /// symbol is reached first
    pub fn unique_forward(&self, query: &[Symbol]) -> Result<usize> {
        self.check_reverse()?;
        let first = *query.first().ok_or(QueryError::EmptyPattern)?;
        let class = match self.class_of(first)? {
            Some(class) => class,
            None => return Ok(0),
        };
        let mut bound = MatchBound {
            lower: self.count[class],
            upper: self.count[class + 1],
        };
        let mut consumed = 1;
        while consumed < query.len() && bound.lower + 1 < bound.upper {
            let class = match self.class_of(query[consumed])? {
                Some(class) => class,
                None => return Ok(0),
            };
            bound = self.extend(bound, class);
            consumed += 1;
        }
        Ok(if bound.width() == 1 { consumed } else { 0 })
    }

    // --------------------------------------------------
    /// Longest prefix of `query` (original orientation) occurring in
    /// the sequence, with an original position of one occurrence
    pub fn match_statistics(&self, query: &[Symbol], want_witness: bool) -> Result<MatchStatistic> {
        self.check_reverse()?;
        let none = MatchStatistic {
            length: 0,
            witness: None,
        };
        let first = *query.first().ok_or(QueryError::EmptyPattern)?;
        let class = match self.class_of(first)? {
            Some(class) => class,
            None => return Ok(none),
        };
        let mut bound = MatchBound {
            lower: self.count[class],
            upper: self.count[class + 1],
        };
        if bound.is_empty() {
            return Ok(none);
        }

        let mut prev_lower = bound.lower;
        let mut length = 1;
        while length < query.len() {
            let class = match self.class_of(query[length])? {
                Some(class) => class,
                None => break,
            };
            bound = self.extend(bound, class);
            if bound.is_empty() {
                break;
            }
            prev_lower = bound.lower;
            length += 1;
        }

        let witness = if want_witness {
            let start = self.locate(prev_lower)?;
            Some(original_position(start, length, self.total_length, self.read_mode))
        } else {
            None
        };
        Ok(MatchStatistic { length, witness })
    }

    // --------------------------------------------------
    /// Replay the index against the project it was built from
    pub fn verify_integrity<T>(&self, project: &mut SuffixArrayProject<T>) -> Result<()>
    where
        T: Int + FromUsize<T> + Sized + Send + Sync + serde::ser::Serialize,
    {
        let now = Instant::now();
        if project.total_length != self.total_length {
            return Err(VerifyError::LengthMismatch {
                index: self.total_length,
                reference: project.total_length,
            }
            .into());
        }
        self.verify_bwt(project)?;

        if let Some(interval) = self.options.locate_interval {
            let mut checked = 0;
            for (row, suffix) in project.suffix_stream().enumerate() {
                let suffix = suffix?.to_usize();
                if row % interval == 0 {
                    let found = self.locate(row)?;
                    if found != suffix {
                        return Err(VerifyError::SuffixValueMismatch {
                            row,
                            found,
                            expected: suffix,
                        }
                        .into());
                    }
                    checked += 1;
                }
            }
            debug!("Checked {checked} sampled rows");
        } else {
            warn!("Index has no locate samples, skipping suffix checks");
        }

        // Walk the whole text backwards from the end
        let mut row = self.lf_map(self.longest)?;
        for pos in (0..self.total_length).rev() {
            let found = self.symbol_at_row(row)?;
            let expected = project.symbol(pos);
            if found != expected {
                return Err(VerifyError::SymbolMismatch {
                    position: pos,
                    found,
                    expected,
                }
                .into());
            }
            row = self.lf_map(row)?;
        }
        let found = self.symbol_at_row(row)?;
        if row != self.longest || found != UNDEF_BWT {
            return Err(VerifyError::SymbolMismatch {
                position: 0,
                found,
                expected: UNDEF_BWT,
            }
            .into());
        }

        info!("Verified {} rows in {:?}", self.num_rows(), now.elapsed());
        Ok(())
    }

    // --------------------------------------------------
    /// Pack the project's BWT block by block and compare it with the
    /// stored codes
    fn verify_bwt<T>(&self, project: &mut SuffixArrayProject<T>) -> Result<()>
    where
        T: Int + FromUsize<T> + Sized + Send + Sync + serde::ser::Serialize,
    {
        let rows = self.num_rows();
        let bits = self.code_bits as usize;
        let block_rows = 1usize << self.options.log2_block_size;
        let mut staged = BitString::new(block_rows * bits);
        let filename = project.filename.clone();
        let mut reference = project.bwt_stream();
        for first_row in (0..rows).step_by(block_rows) {
            let len = block_rows.min(rows - first_row);
            for i in 0..len {
                let sym = reference.next().transpose()?.ok_or_else(|| {
                    FmIndexError::Corrupt {
                        filename: filename.clone(),
                        message: format!("BWT table ends at row {}", first_row + i),
                    }
                })?;
                staged.set_uint(i * bits, self.code_bits, symbol_to_code(sym, self.num_chars)?);
            }

            if self
                .bwt
                .compare_range(first_row * bits, &staged, 0, len * bits)
                != Ordering::Equal
            {
                let (row, expected) = (0..len)
                    .map(|i| (first_row + i, staged.get_uint(i * bits, self.code_bits)))
                    .find(|&(row, code)| self.code_at(row) != code)
                    .unwrap_or((first_row, 0));
                return Err(VerifyError::BwtMismatch {
                    row,
                    found: code_to_symbol(self.code_at(row), self.num_chars),
                    expected: code_to_symbol(expected, self.num_chars),
                }
                .into());
            }
        }
        debug!("Checked the BWT of {rows} rows");
        Ok(())
    }

    // --------------------------------------------------
    pub fn summary(&self) -> IndexSummary {
        let bwt_bytes = self.bwt.size_in_bytes();
        let rank_bytes = self.count.len() * mem::size_of::<usize>()
            + self.block_counts.len() * mem::size_of::<u16>()
            + self.superblock_counts.len() * mem::size_of::<usize>();
        let sample_bytes = self.samples.as_ref().map_or(0, |s| s.size_in_bytes())
            + self.exceptions.len() * 2 * mem::size_of::<usize>();
        let total_bytes = bwt_bytes + rank_bytes + sample_bytes;
        IndexSummary {
            total_length: self.total_length,
            num_rows: self.num_rows(),
            num_chars: self.num_chars,
            special_characters: self.special_characters,
            num_sequences: self.sequence_starts.len(),
            read_mode: self.read_mode,
            log2_block_size: self.options.log2_block_size,
            log2_superblock_size: self.options.log2_superblock_size,
            locate_interval: self.options.locate_interval,
            bwt_bytes,
            rank_bytes,
            sample_bytes,
            exception_entries: self.exceptions.len(),
            total_bytes,
            bits_per_symbol: (total_bytes * 8) as f64 / self.num_rows() as f64,
        }
    }
}

// --------------------------------------------------
/// Iterator over the original positions of one query's matches
#[derive(Debug)]
pub struct ExactMatches<'a> {
    index: &'a BwtIndex,
    bound: MatchBound,
    next_row: usize,
    pattern_len: usize,
}

impl ExactMatches<'_> {
    pub fn num_matches_total(&self) -> usize {
        self.bound.width()
    }

    pub fn num_matches_left(&self) -> usize {
        if self.bound.is_empty() {
            0
        } else {
            self.bound.upper - self.next_row
        }
    }
}

impl Iterator for ExactMatches<'_> {
    type Item = Result<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_row >= self.bound.upper {
            return None;
        }
        let row = self.next_row;
        self.next_row += 1;
        Some(self.index.locate(row).map(|pos| {
            original_position(
                pos,
                self.pattern_len,
                self.index.total_length,
                self.index.read_mode,
            )
        }))
    }
}
