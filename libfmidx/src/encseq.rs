//! Encoded symbol sequences and their special-symbol runs
use crate::{
    alphabet::Alphabet,
    error::Result,
    types::{is_special, ReadMode, SequenceFileData, Symbol},
    util::read_sequence_file,
};
use std::{borrow::Cow, ops::Range};

// --------------------------------------------------
/// A sequence of symbols, possibly several records joined by
/// separators, with the positions of all special-symbol runs
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedSequence {
    symbols: Vec<Symbol>,
    alphabet: Alphabet,
    sequence_starts: Vec<usize>,
    headers: Vec<String>,
    special_ranges: Vec<Range<usize>>,
    special_characters: usize,
}

impl EncodedSequence {
    pub fn new(
        symbols: Vec<Symbol>,
        alphabet: Alphabet,
        sequence_starts: Vec<usize>,
        headers: Vec<String>,
    ) -> Self {
        let special_ranges = special_ranges(&symbols);
        let special_characters = special_ranges.iter().map(|r| r.len()).sum();
        EncodedSequence {
            symbols,
            alphabet,
            sequence_starts,
            headers,
            special_ranges,
            special_characters,
        }
    }

    /// A single record from raw bytes
    pub fn from_bytes(bytes: &[u8], alphabet: Alphabet) -> Self {
        let symbols = alphabet.encode_bytes(bytes);
        EncodedSequence::new(symbols, alphabet, vec![0], vec!["1".to_string()])
    }

    pub fn from_file_data(data: SequenceFileData, alphabet: Alphabet) -> Self {
        EncodedSequence::new(data.seq, alphabet, data.start_positions, data.headers)
    }

    pub fn from_file(filename: &str, alphabet: Alphabet) -> Result<Self> {
        let data = read_sequence_file(filename, &alphabet)?;
        Ok(EncodedSequence::from_file_data(data, alphabet))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn num_chars(&self) -> usize {
        self.alphabet.num_chars()
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn sequence_starts(&self) -> &[usize] {
        &self.sequence_starts
    }

    pub fn special_characters(&self) -> usize {
        self.special_characters
    }

    /// Maximal runs of special symbols in original coordinates
    pub fn special_ranges(&self) -> &[Range<usize>] {
        &self.special_ranges
    }

    #[inline(always)]
    pub fn get(&self, pos: usize, mode: ReadMode) -> Symbol {
        match mode {
            ReadMode::Forward => self.symbols[pos],
            ReadMode::Reverse => self.symbols[self.symbols.len() - 1 - pos],
        }
    }

    /// The symbols in the order they are read under `mode`
    pub fn logical_symbols(&self, mode: ReadMode) -> Cow<'_, [Symbol]> {
        match mode {
            ReadMode::Forward => Cow::Borrowed(&self.symbols),
            ReadMode::Reverse => {
                Cow::Owned(self.symbols.iter().rev().copied().collect())
            }
        }
    }

    /// Special runs in the coordinates of `mode`, ascending
    pub fn logical_special_ranges(&self, mode: ReadMode) -> Vec<Range<usize>> {
        match mode {
            ReadMode::Forward => self.special_ranges.clone(),
            ReadMode::Reverse => {
                let n = self.len();
                self.special_ranges
                    .iter()
                    .rev()
                    .map(|r| n - r.end..n - r.start)
                    .collect()
            }
        }
    }

    /// Record number and offset within that record of a position
    pub fn sequence_position(&self, pos: usize) -> Option<(usize, usize)> {
        if pos >= self.len() {
            return None;
        }
        let idx = self.sequence_starts.partition_point(|&start| start <= pos);
        idx.checked_sub(1)
            .map(|i| (i, pos - self.sequence_starts[i]))
    }
}

// --------------------------------------------------
/// Maximal runs of consecutive special symbols
pub fn special_ranges(symbols: &[Symbol]) -> Vec<Range<usize>> {
    let mut ranges = vec![];
    let mut start: Option<usize> = None;
    for (i, &sym) in symbols.iter().enumerate() {
        match (is_special(sym), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                ranges.push(s..i);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        ranges.push(s..symbols.len());
    }
    ranges
}

// --------------------------------------------------
/// Convert a match of length `len` at logical position `pos`
/// back to its start in original coordinates
#[inline]
pub fn original_position(pos: usize, len: usize, total_length: usize, mode: ReadMode) -> usize {
    match mode {
        ReadMode::Forward => pos,
        ReadMode::Reverse => total_length - (pos + len),
    }
}
