//! Buffered typed access to a region of a project file
use crate::{
    error::{FmIndexError, Result},
    types::{FromUsize, Int},
    util::{open_file, slice_u8_to_vec},
};
use std::{
    cmp::min,
    fs::File,
    io::{Read, Seek, SeekFrom},
    mem,
};

/// Elements read into memory per refill
const BUFFER_ELEMENTS: usize = 1 << 20;

// --------------------------------------------------
#[derive(Debug)]
pub struct FileAccess<T>
where
    T: Int + FromUsize<T> + Sized + Send + Sync + serde::ser::Serialize,
{
    file: File,
    filename: String,
    buffer: Vec<T>,
    buffer_size: usize,
    buffer_pos: usize,
    pub size: usize,
    pub num_elements: usize,
    start_position: u64,
    current_position: u64,
    end_position: u64,
    exhausted: bool,
}

impl<T> FileAccess<T>
where
    T: Int + FromUsize<T> + Sized + Send + Sync + serde::ser::Serialize,
{
    pub fn new(filename: &str, start: u64, num_elements: usize) -> Result<Self> {
        let file = open_file(filename)?;
        let size = num_elements * mem::size_of::<T>();
        Ok(FileAccess {
            file,
            filename: filename.to_string(),
            buffer: vec![],
            buffer_size: BUFFER_ELEMENTS,
            buffer_pos: 0,
            size,
            num_elements,
            start_position: start,
            current_position: start,
            end_position: start + size as u64,
            exhausted: false,
        })
    }

    pub fn reset(&mut self) {
        self.buffer = vec![];
        self.buffer_pos = 0;
        self.current_position = self.start_position;
        self.exhausted = false;
    }

    pub fn iter(&mut self) -> FileAccessIter<'_, T> {
        FileAccessIter { file_access: self }
    }

    // --------------------------------------------------
    /// Next element of the sequential stream, refilling the buffer
    /// from disk as needed
    pub fn read_next(&mut self) -> Result<Option<T>> {
        if self.exhausted {
            return Ok(None);
        }

        if self.buffer_pos == self.buffer.len() {
            if self.current_position >= self.end_position {
                self.exhausted = true;
                return Ok(None);
            }

            self.file.seek(SeekFrom::Start(self.current_position))?;
            let bytes_wanted = min(
                self.buffer_size * mem::size_of::<T>(),
                (self.end_position - self.current_position) as usize,
            );
            let mut buffer: Vec<u8> = vec![0; bytes_wanted];
            self.file
                .read_exact(&mut buffer)
                .map_err(|e| self.corrupt(format!("reading stream: {e}")))?;
            self.current_position += bytes_wanted as u64;

            let num_vals = bytes_wanted / mem::size_of::<T>();
            self.buffer = slice_u8_to_vec(&buffer, num_vals);
            self.buffer_pos = 0;
        }

        let val = self.buffer.get(self.buffer_pos).copied();
        self.buffer_pos += 1;
        Ok(val)
    }

    // --------------------------------------------------
    /// Random access to one element. Does not disturb the stream.
    pub fn get(&mut self, pos: usize) -> Result<Option<T>> {
        if pos >= self.num_elements {
            return Ok(None);
        }
        let seek = self.start_position + (pos * mem::size_of::<T>()) as u64;
        self.file.seek(SeekFrom::Start(seek))?;
        let mut buffer: Vec<u8> = vec![0; mem::size_of::<T>()];
        self.file
            .read_exact(&mut buffer)
            .map_err(|e| self.corrupt(format!("reading element {pos}: {e}")))?;
        Ok(slice_u8_to_vec(&buffer, 1).first().copied())
    }

    fn corrupt(&self, message: String) -> FmIndexError {
        FmIndexError::Corrupt {
            filename: self.filename.clone(),
            message,
        }
    }
}

// --------------------------------------------------
#[derive(Debug)]
pub struct FileAccessIter<'a, T>
where
    T: Int + FromUsize<T> + Sized + Send + Sync + serde::ser::Serialize,
{
    file_access: &'a mut FileAccess<T>,
}

impl<T> Iterator for FileAccessIter<'_, T>
where
    T: Int + FromUsize<T> + Sized + Send + Sync + serde::ser::Serialize,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.file_access.read_next().transpose()
    }
}
