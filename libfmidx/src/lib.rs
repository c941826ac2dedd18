//! Bounded-memory suffix sorting and compressed full-text indexing of
//! biological sequences.
//!
//! A sequence collection is encoded ([encseq]), its suffixes are sorted
//! bucket by bucket in parts ([suffixer]) and written as a project
//! ([project]). One or more projects are turned into a [bwt_index::BwtIndex]
//! by [fm_builder], which answers counting, locating, and matching
//! statistics queries.
//!
//! ```
//! use libfmidx::{
//!     alphabet::Alphabet,
//!     bwt_index::BwtIndex,
//!     encseq::EncodedSequence,
//!     types::{FmIndexOptions, SuffixerOptions},
//! };
//!
//! let seq = EncodedSequence::from_bytes(b"ACGTACGTNACGT", Alphabet::dna());
//! let index = BwtIndex::build(
//!     &seq,
//!     &SuffixerOptions::default(),
//!     &FmIndexOptions::default(),
//! ).unwrap();
//! assert_eq!(index.count(b"ACGT").unwrap(), 3);
//! ```

pub mod alphabet;
pub mod bcktab;
pub mod bitpack;
pub mod bucket_sort;
pub mod bwt_index;
pub mod encseq;
pub mod error;
pub mod esa_merge;
pub mod file_access;
pub mod fm_builder;
pub mod project;
pub mod radix_sort;
pub mod suffixer;
pub mod suftab_parts;
pub mod types;
pub mod util;
