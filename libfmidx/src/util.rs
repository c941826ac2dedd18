use crate::{
    alphabet::Alphabet,
    error::{FmIndexError, Result},
    types::{FromUsize, Int, SequenceFileData, OUTFILE_VERSION, SEPARATOR},
};
use needletail::parse_fastx_file;
use std::{
    fs::File,
    io::{Read, Write},
    slice,
};

// --------------------------------------------------
pub fn vec_to_slice_u8<T>(vec: &[T]) -> &[u8]
where
    T: Int + FromUsize<T> + Sized + Send + Sync + serde::ser::Serialize,
{
    unsafe { slice::from_raw_parts(vec.as_ptr() as *const _, std::mem::size_of_val(vec)) }
}

// --------------------------------------------------
pub fn slice_u8_to_vec<T>(buffer: &[u8], len: usize) -> Vec<T>
where
    T: Int + FromUsize<T> + Sized + Send + Sync + serde::ser::Serialize,
{
    assert!(buffer.len() >= len * std::mem::size_of::<T>());
    let mut vals = vec![T::default(); len];
    // The buffer may be unaligned
    unsafe {
        std::ptr::copy_nonoverlapping(
            buffer.as_ptr(),
            vals.as_mut_ptr() as *mut u8,
            len * std::mem::size_of::<T>(),
        );
    }
    vals
}

// --------------------------------------------------
pub fn usize_to_bytes(value: usize) -> Vec<u8> {
    (value as u64).to_ne_bytes().to_vec()
}

// --------------------------------------------------
pub fn read_usize<R: Read>(reader: &mut R) -> Result<usize> {
    let mut buffer = [0; 8];
    reader.read_exact(&mut buffer)?;
    Ok(u64::from_ne_bytes(buffer) as usize)
}

// --------------------------------------------------
pub fn write_usize<W: Write>(writer: &mut W, value: usize) -> Result<usize> {
    writer.write_all(&usize_to_bytes(value))?;
    Ok(8)
}

// --------------------------------------------------
pub fn open_file(filename: &str) -> Result<File> {
    File::open(filename).map_err(|source| FmIndexError::OpenFile {
        filename: filename.to_string(),
        source,
    })
}

// --------------------------------------------------
// Find the length of the text in a project file to
// decide between u32 and u64 suffix tables
pub fn read_text_length(filename: &str) -> Result<usize> {
    let mut file = open_file(filename)?;

    // Meta (version, read mode)
    let mut buffer = [0; 4];
    file.read_exact(&mut buffer)?;

    let version = buffer[0];
    if version == OUTFILE_VERSION {
        read_usize(&mut file)
    } else {
        Err(FmIndexError::UnknownVersion {
            filename: filename.to_string(),
            version,
        })
    }
}

// --------------------------------------------------
// Read a FASTA/Q file, encoding each record and placing a
// separator between consecutive records
pub fn read_sequence_file(filename: &str, alphabet: &Alphabet) -> Result<SequenceFileData> {
    let mut reader = parse_fastx_file(filename)?;
    let mut seq: Vec<u8> = vec![];
    let mut headers: Vec<String> = vec![];
    let mut start_positions: Vec<usize> = vec![];
    while let Some(rec) = reader.next() {
        let rec = rec?;
        if !start_positions.is_empty() {
            seq.push(SEPARATOR);
        }

        start_positions.push(seq.len());
        seq.extend(rec.seq().iter().map(|&b| alphabet.encode(b)));

        // Only take ID value up to first whitespace
        let id = String::from_utf8_lossy(rec.id())
            .split_whitespace()
            .next()
            .map_or((headers.len() + 1).to_string(), |v| v.to_string());
        headers.push(id);
    }

    Ok(SequenceFileData {
        seq,
        start_positions,
        headers,
    })
}

// --------------------------------------------------
#[cfg(test)]
mod tests {
    use super::{
        read_sequence_file, read_text_length, read_usize, slice_u8_to_vec,
        usize_to_bytes, vec_to_slice_u8,
    };
    use crate::{
        alphabet::Alphabet,
        error::FmIndexError,
        types::{SEPARATOR, WILDCARD},
    };
    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_sequence_file() -> Result<()> {
        let data = read_sequence_file("../data/inputs/2.fa", &Alphabet::dna())?;
        assert_eq!(
            data.seq,
            [0, 1, 2, 3, 0, 1, 2, 3, SEPARATOR, 0, 1, 2, 3, 0, 1, 2, 3]
        );
        assert_eq!(data.start_positions, [0, 9]);
        assert_eq!(data.headers, ["ABC", "DEF"]);

        let data = read_sequence_file("../data/inputs/1.fa", &Alphabet::dna())?;
        assert_eq!(data.seq.len(), 13);
        assert_eq!(data.seq[8], WILDCARD);
        assert_eq!(data.headers, ["1"]);
        Ok(())
    }

    #[test]
    fn test_read_sequence_file_missing() -> Result<()> {
        let res = read_sequence_file("../data/inputs/does_not_exist.fa", &Alphabet::dna());
        assert!(matches!(res, Err(FmIndexError::SequenceInput(_))));
        Ok(())
    }

    #[test]
    fn test_read_text_length() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(&[super::OUTFILE_VERSION, 0, 0, 0])?;
        file.write_all(&usize_to_bytes(18))?;
        file.flush()?;
        let filename = file.path().to_string_lossy().to_string();
        assert_eq!(read_text_length(&filename)?, 18);

        let mut file = NamedTempFile::new()?;
        file.write_all(&[99, 0, 0, 0])?;
        file.flush()?;
        let filename = file.path().to_string_lossy().to_string();
        assert!(matches!(
            read_text_length(&filename),
            Err(FmIndexError::UnknownVersion { version: 99, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_usize_to_bytes() -> Result<()> {
        assert_eq!(usize_to_bytes(usize::MIN), [0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(usize_to_bytes(1000), 1000u64.to_ne_bytes());
        assert_eq!(
            usize_to_bytes(usize::MAX),
            [255, 255, 255, 255, 255, 255, 255, 255]
        );
        let mut cursor = Cursor::new(usize_to_bytes(123_456));
        assert_eq!(read_usize(&mut cursor)?, 123_456);
        Ok(())
    }

    #[test]
    fn test_slice_round_trip() -> Result<()> {
        let res: Vec<u32> = slice_u8_to_vec(&[255, 255, 255, 255, 0, 0, 0, 0], 2);
        assert_eq!(res, &[u32::MAX, 0]);

        let vals = [7u64, u64::MAX, 0];
        let bytes = vec_to_slice_u8(&vals);
        assert_eq!(bytes.len(), 24);
        let back: Vec<u64> = slice_u8_to_vec(bytes, 3);
        assert_eq!(back, vals);

        // Unaligned source buffer
        let mut shifted = vec![0u8];
        shifted.extend_from_slice(bytes);
        let back: Vec<u64> = slice_u8_to_vec(&shifted[1..], 3);
        assert_eq!(back, vals);
        Ok(())
    }
}
