//! Shared types, constants, and construction options
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Debug, Display},
    hash::Hash,
    ops::{Add, Div, Sub},
};

// --------------------------------------------------
/// Version byte written at the start of a suffix-array project file
pub const OUTFILE_VERSION: u8 = 1;

/// Version byte written at the start of a serialized index
pub const INDEX_VERSION: u8 = 1;

// --------------------------------------------------
/// An encoded symbol. Regular symbols are `0..num_chars`,
/// everything at or above [UNDEF_BWT] is reserved.
pub type Symbol = u8;

/// Ambiguous or masked position
pub const WILDCARD: Symbol = 254;

/// Boundary between concatenated sequences
pub const SEPARATOR: Symbol = 255;

/// BWT value in front of the suffix starting at position 0
pub const UNDEF_BWT: Symbol = 253;

/// Upper limit on the number of regular symbols in an alphabet
pub const MAX_ALPHABET_SIZE: usize = 64;

// --------------------------------------------------
/// Q-gram code type used for bucketing
pub type Code = u32;

/// Bits reserved for the prefix length in a packed code
pub const PREFIX_LEN_BITS: u32 = 4;

/// Bits left for the code value
pub const CODE_BITS: u32 = Code::BITS - PREFIX_LEN_BITS;

/// Largest q-gram length that can be requested
pub const MAX_PREFIX_LEN: usize = (1 << PREFIX_LEN_BITS) - 1;

/// Largest code value that can be represented
pub const MAX_CODE_VALUE: u64 = (1 << CODE_BITS) - 1;

// --------------------------------------------------
#[inline(always)]
pub fn is_special(sym: Symbol) -> bool {
    sym == WILDCARD || sym == SEPARATOR
}

// --------------------------------------------------
/// Direction in which the sequence is read when indexing.
/// In `Reverse` mode logical position `i` is original position `n - 1 - i`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadMode {
    #[default]
    Forward,
    Reverse,
}

impl ReadMode {
    pub fn to_byte(self) -> u8 {
        match self {
            ReadMode::Forward => 0,
            ReadMode::Reverse => 1,
        }
    }

    pub fn from_byte(val: u8) -> Option<Self> {
        match val {
            0 => Some(ReadMode::Forward),
            1 => Some(ReadMode::Reverse),
            _ => None,
        }
    }
}

impl Display for ReadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadMode::Forward => write!(f, "forward"),
            ReadMode::Reverse => write!(f, "reverse"),
        }
    }
}

// --------------------------------------------------
/// Integer types usable for on-disk suffix tables
pub trait Int:
    Debug
    + Add<Output = Self>
    + Sub<Output = Self>
    + Div<Output = Self>
    + Copy
    + Default
    + Display
    + Ord
    + Hash
    + serde::ser::Serialize
{
    fn to_usize(&self) -> usize;
}

impl Int for u8 {
    fn to_usize(&self) -> usize {
        *self as usize
    }
}

impl Int for u32 {
    fn to_usize(&self) -> usize {
        *self as usize
    }
}

impl Int for u64 {
    fn to_usize(&self) -> usize {
        *self as usize
    }
}

pub trait FromUsize<T> {
    fn from_usize(val: usize) -> T;
}

impl FromUsize<u8> for u8 {
    fn from_usize(val: usize) -> u8 {
        val as u8
    }
}

impl FromUsize<u32> for u32 {
    fn from_usize(val: usize) -> u32 {
        val as u32
    }
}

impl FromUsize<u64> for u64 {
    fn from_usize(val: usize) -> u64 {
        val as u64
    }
}

// --------------------------------------------------
/// Options for suffix array construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuffixerOptions {
    /// Q-gram length used for bucketing. `None` picks a length
    /// from the alphabet size and the sequence length.
    pub prefix_len: Option<usize>,

    /// Number of parts the code space is split into
    pub num_parts: usize,

    /// Memory budget in bytes for one part. Overrides `num_parts`.
    pub max_memory: Option<usize>,

    /// Direction in which to read the sequence
    pub read_mode: ReadMode,

    /// Capacity of the pages used to emit special suffixes
    pub special_page_size: Option<usize>,
}

impl Default for SuffixerOptions {
    fn default() -> Self {
        SuffixerOptions {
            prefix_len: None,
            num_parts: 1,
            max_memory: None,
            read_mode: ReadMode::Forward,
            special_page_size: None,
        }
    }
}

// --------------------------------------------------
/// Options for building the rank and locate tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FmIndexOptions {
    /// Log2 of the number of rows per block
    pub log2_block_size: u32,

    /// Log2 of the number of rows per superblock
    pub log2_superblock_size: u32,

    /// Sample one suffix every this many rows. `None` disables locate.
    pub locate_interval: Option<usize>,
}

impl Default for FmIndexOptions {
    fn default() -> Self {
        FmIndexOptions {
            log2_block_size: 7,
            log2_superblock_size: 12,
            locate_interval: Some(1 << 12),
        }
    }
}

// --------------------------------------------------
/// A half-open range of BWT rows whose suffixes share a prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchBound {
    pub lower: usize,
    pub upper: usize,
}

impl MatchBound {
    pub fn width(&self) -> usize {
        if self.upper > self.lower {
            self.upper - self.lower
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0
    }
}

// --------------------------------------------------
/// Longest prefix of a query occurring in the indexed sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchStatistic {
    pub length: usize,

    /// An original-sequence position where the prefix occurs
    pub witness: Option<usize>,
}

// --------------------------------------------------
/// One batch of sorted suffixes produced by the suffixer
#[derive(Debug, PartialEq)]
pub struct SuffixPage<'a> {
    pub suffixes: &'a [usize],

    /// `true` for suffixes starting with a special symbol
    /// and for the end position
    pub special: bool,
}

// --------------------------------------------------
#[derive(Debug)]
pub struct SequenceFileData {
    pub seq: Vec<u8>,
    pub start_positions: Vec<usize>,
    pub headers: Vec<String>,
}

// --------------------------------------------------
#[cfg(test)]
mod test {
    use super::{
        is_special, MatchBound, ReadMode, CODE_BITS, MAX_CODE_VALUE, MAX_PREFIX_LEN,
        SEPARATOR, UNDEF_BWT, WILDCARD,
    };
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_constants() -> Result<()> {
        assert_eq!(CODE_BITS, 28);
        assert_eq!(MAX_PREFIX_LEN, 15);
        assert_eq!(MAX_CODE_VALUE, 268_435_455);
        assert!(is_special(WILDCARD));
        assert!(is_special(SEPARATOR));
        assert!(!is_special(UNDEF_BWT));
        assert!(!is_special(0));
        Ok(())
    }

    #[test]
    fn test_read_mode_bytes() -> Result<()> {
        for mode in [ReadMode::Forward, ReadMode::Reverse] {
            assert_eq!(ReadMode::from_byte(mode.to_byte()), Some(mode));
        }
        assert_eq!(ReadMode::from_byte(9), None);
        Ok(())
    }

    #[test]
    fn test_match_bound_width() -> Result<()> {
        assert_eq!(MatchBound { lower: 3, upper: 7 }.width(), 4);
        assert_eq!(MatchBound { lower: 7, upper: 7 }.width(), 0);
        assert_eq!(MatchBound { lower: 9, upper: 7 }.width(), 0);
        assert!(MatchBound { lower: 9, upper: 7 }.is_empty());
        Ok(())
    }
}
