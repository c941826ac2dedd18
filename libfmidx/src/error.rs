//! Error taxonomy for index construction and queries
use thiserror::Error;

// --------------------------------------------------
pub type Result<T> = std::result::Result<T, FmIndexError>;

// --------------------------------------------------
/// Broad category of an [FmIndexError]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any work began
    Configuration,
    /// Allocation, I/O, or (de)serialization failed
    Resource,
    /// A construction invariant was violated
    Consistency,
    /// The index disagrees with a reference suffix array
    Verification,
    /// The query cannot be answered by this index
    Query,
}

// --------------------------------------------------
#[derive(Debug, Error)]
pub enum FmIndexError {
    #[error("prefix length {prefix_len} must be between 1 and {max}")]
    InvalidPrefixLength { prefix_len: usize, max: usize },

    #[error(
        "code space {num_chars}^{prefix_len} exceeds the maximum code value {max}"
    )]
    CodeSpaceOverflow {
        num_chars: usize,
        prefix_len: usize,
        max: u64,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{filename}: {source}")]
    OpenFile {
        filename: String,
        source: std::io::Error,
    },

    #[error("serialization: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("sequence input: {0}")]
    SequenceInput(#[from] needletail::errors::ParseError),

    #[error("{filename}: unknown file version {version}")]
    UnknownVersion { filename: String, version: u8 },

    #[error("{filename}: {message}")]
    Corrupt { filename: String, message: String },

    #[error("exception list overflow: capacity {capacity} exhausted")]
    ExceptionListOverflow { capacity: usize },

    #[error("exception list underfilled: used {used} of {capacity}")]
    ExceptionListUnderfilled { capacity: usize, used: usize },

    #[error("smallest rotation found at rows {first} and {second}")]
    LongestDefinedTwice { first: usize, second: usize },

    #[error("smallest rotation was never found")]
    LongestUndefined,

    #[error("expected {expected} suffixes but received {found}")]
    EntryCountMismatch { expected: usize, found: usize },

    #[error("inconsistent index: {0}")]
    Inconsistent(String),

    #[error(transparent)]
    Verification(#[from] VerifyError),

    #[error(transparent)]
    Query(#[from] QueryError),
}

impl FmIndexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FmIndexError::InvalidPrefixLength { .. }
            | FmIndexError::CodeSpaceOverflow { .. }
            | FmIndexError::InvalidParameter(_) => ErrorKind::Configuration,
            FmIndexError::Io(_)
            | FmIndexError::OpenFile { .. }
            | FmIndexError::Serialization(_)
            | FmIndexError::SequenceInput(_)
            | FmIndexError::UnknownVersion { .. }
            | FmIndexError::Corrupt { .. } => ErrorKind::Resource,
            FmIndexError::ExceptionListOverflow { .. }
            | FmIndexError::ExceptionListUnderfilled { .. }
            | FmIndexError::LongestDefinedTwice { .. }
            | FmIndexError::LongestUndefined
            | FmIndexError::EntryCountMismatch { .. }
            | FmIndexError::Inconsistent(_) => ErrorKind::Consistency,
            FmIndexError::Verification(_) => ErrorKind::Verification,
            FmIndexError::Query(_) => ErrorKind::Query,
        }
    }
}

// --------------------------------------------------
/// Disagreement between an index and its reference suffix array
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("index length {index} differs from reference length {reference}")]
    LengthMismatch { index: usize, reference: usize },

    #[error("row {row}: located suffix {found}, reference has {expected}")]
    SuffixValueMismatch {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("row {row}: BWT has symbol {found}, reference has {expected}")]
    BwtMismatch { row: usize, found: u8, expected: u8 },

    #[error("position {position}: BWT has symbol {found}, sequence has {expected}")]
    SymbolMismatch {
        position: usize,
        found: u8,
        expected: u8,
    },
}

// --------------------------------------------------
/// A query the index refuses to answer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("empty pattern")]
    EmptyPattern,

    #[error("index was built without locate support")]
    NoLocateSupport,

    #[error("symbol {0} is not in the alphabet")]
    SymbolNotInAlphabet(u8),

    #[error("character '{0}' is not in the alphabet")]
    CharacterNotInAlphabet(char),

    #[error("operation requires an index of the reversed sequence")]
    RequiresReverseIndex,

    #[error("row {row} is beyond the last row {last}")]
    RowOutOfRange { row: usize, last: usize },
}

// --------------------------------------------------
#[cfg(test)]
mod test {
    use super::{ErrorKind, FmIndexError, QueryError, VerifyError};
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_kind() -> Result<()> {
        let err = FmIndexError::InvalidPrefixLength {
            prefix_len: 0,
            max: 15,
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.to_string(), "prefix length 0 must be between 1 and 15");

        let err: FmIndexError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind(), ErrorKind::Resource);

        let err = FmIndexError::LongestUndefined;
        assert_eq!(err.kind(), ErrorKind::Consistency);

        let err = FmIndexError::Inconsistent("row 3 has no exception entry".to_string());
        assert_eq!(err.kind(), ErrorKind::Consistency);
        assert_eq!(
            err.to_string(),
            "inconsistent index: row 3 has no exception entry"
        );

        let err: FmIndexError = VerifyError::LengthMismatch {
            index: 3,
            reference: 4,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Verification);
        assert_eq!(
            err.to_string(),
            "index length 3 differs from reference length 4"
        );

        let err: FmIndexError = QueryError::NoLocateSupport.into();
        assert_eq!(err.kind(), ErrorKind::Query);
        Ok(())
    }
}
