//! Persisted suffix-array project: encoded text, suffix table, and
//! BWT table of one sequence collection in a single file
use crate::{
    alphabet::Alphabet,
    encseq::{special_ranges, EncodedSequence},
    error::{FmIndexError, Result},
    file_access::{FileAccess, FileAccessIter},
    fm_builder::SuffixBwtSource,
    suffixer::Suffixer,
    types::{
        FromUsize, Int, ReadMode, SuffixerOptions, Symbol, OUTFILE_VERSION, UNDEF_BWT,
    },
    util::{open_file, read_usize, slice_u8_to_vec, vec_to_slice_u8, write_usize},
};
use log::info;
use std::{
    io::{self, BufWriter, Read, Seek, SeekFrom, Write},
    mem,
    ops::Range,
    path::Path,
    time::Instant,
};
use tempfile::NamedTempFile;

// --------------------------------------------------
/// What [write_project] produced
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectSummary {
    pub filename: String,
    pub total_length: usize,
    pub num_suffixes: usize,
    pub special_characters: usize,
    pub longest: usize,
    pub prefix_len: usize,
    pub num_parts: usize,
    pub read_mode: ReadMode,
    pub bytes_written: usize,
}

// --------------------------------------------------
/// Build the suffix array of `seq` page by page and write it,
/// together with the text and the BWT, to `filename`
pub fn write_project<T>(
    seq: &EncodedSequence,
    opts: &SuffixerOptions,
    filename: &str,
) -> Result<ProjectSummary>
where
    T: Int + FromUsize<T> + Sized + Send + Sync + serde::ser::Serialize,
{
    let now = Instant::now();
    let mut suffixer = Suffixer::new(seq, opts)?;
    let read_mode = suffixer.read_mode();
    let prefix_len = suffixer.prefix_len();
    let num_parts = suffixer.parts().len();
    let total_length = seq.len();

    // Written next to the target and moved into place once complete
    let open_error = |source: io::Error| FmIndexError::OpenFile {
        filename: filename.to_string(),
        source,
    };
    let dir = match Path::new(filename).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = BufWriter::new(NamedTempFile::new_in(dir).map_err(open_error)?);
    let mut bytes_out: usize = 0;

    // Meta
    file.write_all(&[OUTFILE_VERSION, read_mode.to_byte(), 0, 0])?;
    bytes_out += 4;

    // Text length
    bytes_out += write_usize(&mut file, total_length)?;

    // Locations of text, suffix table, and BWT
    // Will be corrected at the end
    let locs_pos = file.stream_position()?;
    for _ in 0..3 {
        bytes_out += write_usize(&mut file, 0)?;
    }

    bytes_out += write_usize(&mut file, total_length + 1)?;
    bytes_out += write_usize(&mut file, seq.special_characters())?;

    // Longest is only known once every suffix is seen
    let longest_pos = file.stream_position()?;
    bytes_out += write_usize(&mut file, 0)?;

    bytes_out += write_usize(&mut file, prefix_len)?;
    bytes_out += write_usize(&mut file, seq.sequence_starts().len())?;
    for &start in seq.sequence_starts() {
        bytes_out += write_usize(&mut file, start)?;
    }

    // Text, always in original orientation
    let text_pos = bytes_out;
    file.write_all(seq.symbols())?;
    bytes_out += seq.len();

    // Suffix table goes straight out, BWT is spooled and stitched in
    let sa_pos = bytes_out;
    let mut spool = BufWriter::new(NamedTempFile::new()?);
    let mut num_suffixes = 0;
    let mut longest: Option<usize> = None;
    while let Some(page) = suffixer.next_page()? {
        let vals: Vec<T> = page.suffixes.iter().map(|&p| T::from_usize(p)).collect();
        file.write_all(vec_to_slice_u8(&vals))?;

        let bwt: Vec<Symbol> = page
            .suffixes
            .iter()
            .map(|&p| {
                if p == 0 {
                    UNDEF_BWT
                } else {
                    seq.get(p - 1, read_mode)
                }
            })
            .collect();
        spool.write_all(&bwt)?;

        if let Some(rank) = page.suffixes.iter().position(|&p| p == 0) {
            let row = num_suffixes + rank;
            if let Some(first) = longest {
                return Err(FmIndexError::LongestDefinedTwice { first, second: row });
            }
            longest = Some(row);
        }
        num_suffixes += page.suffixes.len();
    }
    if num_suffixes != total_length + 1 {
        return Err(FmIndexError::EntryCountMismatch {
            expected: total_length + 1,
            found: num_suffixes,
        });
    }
    let longest = longest.ok_or(FmIndexError::LongestUndefined)?;
    bytes_out += num_suffixes * mem::size_of::<T>();

    let bwt_pos = bytes_out;
    let mut spool = spool.into_inner().map_err(|e| e.into_error())?;
    spool.seek(SeekFrom::Start(0))?;
    bytes_out += io::copy(&mut spool, &mut file)? as usize;

    // Alphabet and headers are variable in length so they are at the end
    let meta = bincode::serialize(&(seq.alphabet(), seq.headers()))?;
    file.write_all(&meta)?;
    bytes_out += meta.len();

    // Go back to header and record the locations
    file.seek(SeekFrom::Start(locs_pos))?;
    write_usize(&mut file, text_pos)?;
    write_usize(&mut file, sa_pos)?;
    write_usize(&mut file, bwt_pos)?;
    file.seek(SeekFrom::Start(longest_pos))?;
    write_usize(&mut file, longest)?;
    file.into_inner()
        .map_err(|e| e.into_error())?
        .persist(filename)
        .map_err(|e| open_error(e.error))?;

    info!(
        "Wrote {num_suffixes} suffixes ({bytes_out} bytes) to '{filename}' in {:?}",
        now.elapsed()
    );

    Ok(ProjectSummary {
        filename: filename.to_string(),
        total_length,
        num_suffixes,
        special_characters: seq.special_characters(),
        longest,
        prefix_len,
        num_parts,
        read_mode,
        bytes_written: bytes_out,
    })
}

// --------------------------------------------------
#[derive(Debug)]
pub struct SuffixArrayProject<T>
where
    T: Int + FromUsize<T> + Sized + Send + Sync + serde::ser::Serialize,
{
    pub filename: String,
    pub version: u8,
    pub read_mode: ReadMode,
    pub total_length: usize,
    pub num_suffixes: usize,
    pub special_characters: usize,
    pub longest: usize,
    pub prefix_len: usize,
    pub sequence_starts: Vec<usize>,
    pub headers: Vec<String>,
    pub alphabet: Alphabet,
    pub text: Vec<Symbol>,
    pub suffix_file: FileAccess<T>,
    pub bwt_file: FileAccess<u8>,
}

impl<T> SuffixArrayProject<T>
where
    T: Int + FromUsize<T> + Sized + Send + Sync + serde::ser::Serialize,
{
    pub fn read(filename: &str) -> Result<SuffixArrayProject<T>> {
        let mut file = open_file(filename)?;
        let corrupt = |message: String| FmIndexError::Corrupt {
            filename: filename.to_string(),
            message,
        };

        // Meta
        let mut buffer = [0u8; 4];
        file.read_exact(&mut buffer)?;
        let version = buffer[0];
        if version != OUTFILE_VERSION {
            return Err(FmIndexError::UnknownVersion {
                filename: filename.to_string(),
                version,
            });
        }
        let read_mode = ReadMode::from_byte(buffer[1])
            .ok_or_else(|| corrupt(format!("unknown read mode {}", buffer[1])))?;

        let total_length = read_usize(&mut file)?;
        let text_pos = read_usize(&mut file)?;
        let sa_pos = read_usize(&mut file)?;
        let bwt_pos = read_usize(&mut file)?;
        let num_suffixes = read_usize(&mut file)?;
        if num_suffixes != total_length + 1 {
            return Err(corrupt(format!(
                "{num_suffixes} suffixes for text length {total_length}"
            )));
        }
        let special_characters = read_usize(&mut file)?;
        let longest = read_usize(&mut file)?;
        let prefix_len = read_usize(&mut file)?;

        // Sequence starts
        let num_sequences = read_usize(&mut file)?;
        let mut buffer = vec![0; num_sequences * mem::size_of::<u64>()];
        file.read_exact(&mut buffer)?;
        let sequence_starts: Vec<usize> = slice_u8_to_vec::<u64>(&buffer, num_sequences)
            .into_iter()
            .map(|v| v as usize)
            .collect();

        // Text
        file.seek(SeekFrom::Start(text_pos as u64))?;
        let mut text = vec![0; total_length];
        file.read_exact(&mut text)
            .map_err(|e| corrupt(format!("reading text: {e}")))?;

        // Suffix and BWT tables
        let suffix_file: FileAccess<T> =
            FileAccess::new(filename, sa_pos as u64, num_suffixes)?;
        let bwt_file: FileAccess<u8> =
            FileAccess::new(filename, bwt_pos as u64, num_suffixes)?;

        // Alphabet and headers
        file.seek(SeekFrom::Start((bwt_pos + num_suffixes) as u64))?;
        let mut buffer = vec![];
        file.read_to_end(&mut buffer)?;
        let (alphabet, headers): (Alphabet, Vec<String>) = bincode::deserialize(&buffer)?;

        Ok(SuffixArrayProject {
            filename: filename.to_string(),
            version,
            read_mode,
            total_length,
            num_suffixes,
            special_characters,
            longest,
            prefix_len,
            sequence_starts,
            headers,
            alphabet,
            text,
            suffix_file,
            bwt_file,
        })
    }

    /// The indexed sequence in original orientation
    pub fn encoded_sequence(&self) -> EncodedSequence {
        EncodedSequence::new(
            self.text.clone(),
            self.alphabet.clone(),
            self.sequence_starts.clone(),
            self.headers.clone(),
        )
    }

    /// Stream of suffix positions from rank 0
    pub fn suffix_stream(&mut self) -> FileAccessIter<'_, T> {
        self.suffix_file.reset();
        self.suffix_file.iter()
    }

    /// Stream of BWT symbols from rank 0
    pub fn bwt_stream(&mut self) -> FileAccessIter<'_, u8> {
        self.bwt_file.reset();
        self.bwt_file.iter()
    }

    pub fn get_suffix(&mut self, rank: usize) -> Result<Option<usize>> {
        Ok(self.suffix_file.get(rank)?.map(|v| v.to_usize()))
    }

    /// Symbol at a logical position
    pub fn symbol(&self, pos: usize) -> Symbol {
        match self.read_mode {
            ReadMode::Forward => self.text[pos],
            ReadMode::Reverse => self.text[self.total_length - 1 - pos],
        }
    }

    /// Special runs in logical coordinates
    pub fn special_ranges(&self) -> Vec<Range<usize>> {
        let ranges = special_ranges(&self.text);
        match self.read_mode {
            ReadMode::Forward => ranges,
            ReadMode::Reverse => ranges
                .iter()
                .rev()
                .map(|r| self.total_length - r.end..self.total_length - r.start)
                .collect(),
        }
    }

    /// Start reading suffixes and BWT symbols in lockstep
    pub fn source(&mut self) -> ProjectSource<'_, T> {
        self.suffix_file.reset();
        self.bwt_file.reset();
        let special_ranges = self.special_ranges();
        ProjectSource {
            project: self,
            special_ranges,
        }
    }
}

// --------------------------------------------------
/// A project read back as a stream of `(suffix, bwt symbol)` pairs
#[derive(Debug)]
pub struct ProjectSource<'a, T>
where
    T: Int + FromUsize<T> + Sized + Send + Sync + serde::ser::Serialize,
{
    project: &'a mut SuffixArrayProject<T>,
    special_ranges: Vec<Range<usize>>,
}

impl<T> SuffixBwtSource for ProjectSource<'_, T>
where
    T: Int + FromUsize<T> + Sized + Send + Sync + serde::ser::Serialize,
{
    fn next_entry(&mut self) -> Result<Option<(usize, Symbol)>> {
        let suffix = self.project.suffix_file.read_next()?;
        let bwt = self.project.bwt_file.read_next()?;
        match (suffix, bwt) {
            (Some(suffix), Some(bwt)) => Ok(Some((suffix.to_usize(), bwt))),
            (None, None) => Ok(None),
            _ => Err(FmIndexError::Corrupt {
                filename: self.project.filename.clone(),
                message: "suffix and BWT tables differ in length".to_string(),
            }),
        }
    }

    fn total_length(&self) -> usize {
        self.project.total_length
    }

    fn special_characters(&self) -> usize {
        self.project.special_characters
    }

    fn alphabet(&self) -> &Alphabet {
        &self.project.alphabet
    }

    fn read_mode(&self) -> ReadMode {
        self.project.read_mode
    }

    fn special_ranges(&self) -> Vec<Range<usize>> {
        self.special_ranges.clone()
    }

    fn sequence_starts(&self) -> &[usize] {
        &self.project.sequence_starts
    }

    fn headers(&self) -> &[String] {
        &self.project.headers
    }
}
