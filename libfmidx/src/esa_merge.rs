//! K-way merge of several suffix-array projects into the suffix
//! array of their concatenation, with a separator between inputs
use crate::{
    alphabet::Alphabet,
    error::{FmIndexError, Result},
    fm_builder::SuffixBwtSource,
    project::SuffixArrayProject,
    types::{is_special, FromUsize, Int, ReadMode, Symbol, SEPARATOR, UNDEF_BWT},
};
use log::debug;
use std::{cmp::Ordering, ops::Range};

// --------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Head {
    suffix: usize,
    bwt: Symbol,
}

// --------------------------------------------------
/// Streams the merged `(suffix, bwt symbol)` sequence of its inputs.
/// Only forward projects sharing one alphabet can be merged.
#[derive(Debug)]
pub struct EsaMerger<T>
where
    T: Int + FromUsize<T> + Sized + Send + Sync + serde::ser::Serialize,
{
    projects: Vec<SuffixArrayProject<T>>,
    offsets: Vec<usize>,
    heads: Vec<Option<Head>>,
    total_length: usize,
    special_characters: usize,
    special_ranges: Vec<Range<usize>>,
    sequence_starts: Vec<usize>,
    headers: Vec<String>,
}

impl<T> EsaMerger<T>
where
    T: Int + FromUsize<T> + Sized + Send + Sync + serde::ser::Serialize,
{
    pub fn new(mut projects: Vec<SuffixArrayProject<T>>) -> Result<Self> {
        let first = projects.first().ok_or_else(|| {
            FmIndexError::InvalidParameter("nothing to merge".to_string())
        })?;
        let alphabet = first.alphabet.clone();
        for project in &projects {
            if project.read_mode != ReadMode::Forward {
                return Err(FmIndexError::InvalidParameter(format!(
                    "{}: only forward projects can be merged",
                    project.filename
                )));
            }
            if project.alphabet != alphabet {
                return Err(FmIndexError::InvalidParameter(format!(
                    "{}: alphabet differs from {}",
                    project.filename, first.filename
                )));
            }
        }

        let mut offsets = Vec::with_capacity(projects.len());
        let mut special_ranges: Vec<Range<usize>> = vec![];
        let mut sequence_starts = vec![];
        let mut headers = vec![];
        let mut offset = 0;
        for (i, project) in projects.iter().enumerate() {
            offsets.push(offset);
            let separator = (i + 1 < projects.len())
                .then(|| offset + project.total_length..offset + project.total_length + 1);
            for range in project
                .special_ranges()
                .into_iter()
                .map(|r| r.start + offset..r.end + offset)
                .chain(separator)
            {
                match special_ranges.last_mut() {
                    Some(last) if last.end == range.start => last.end = range.end,
                    _ => special_ranges.push(range),
                }
            }
            sequence_starts.extend(project.sequence_starts.iter().map(|s| s + offset));
            headers.extend(project.headers.iter().cloned());
            offset += project.total_length + 1;
        }
        let total_length = offset - 1;
        let special_characters = projects
            .iter()
            .map(|p| p.special_characters)
            .sum::<usize>()
            + projects.len()
            - 1;

        let mut heads = Vec::with_capacity(projects.len());
        for project in projects.iter_mut() {
            project.suffix_file.reset();
            project.bwt_file.reset();
            heads.push(Self::read_head(project)?);
        }
        debug!(
            "Merging {} projects, total length {total_length}",
            projects.len()
        );

        Ok(EsaMerger {
            projects,
            offsets,
            heads,
            total_length,
            special_characters,
            special_ranges,
            sequence_starts,
            headers,
        })
    }

    fn read_head(project: &mut SuffixArrayProject<T>) -> Result<Option<Head>> {
        let suffix = project.suffix_file.read_next()?;
        let bwt = project.bwt_file.read_next()?;
        match (suffix, bwt) {
            (Some(suffix), Some(bwt)) => Ok(Some(Head {
                suffix: suffix.to_usize(),
                bwt,
            })),
            (None, None) => Ok(None),
            _ => Err(FmIndexError::Corrupt {
                filename: project.filename.clone(),
                message: "suffix and BWT tables differ in length".to_string(),
            }),
        }
    }

    pub fn num_inputs(&self) -> usize {
        self.projects.len()
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    // --------------------------------------------------
    /// Order of two input suffixes within the concatenation. The end
    /// of an input stands for the separator that follows it.
    fn compare(&self, (i, a): (usize, usize), (j, b): (usize, usize)) -> Ordering {
        let text_a = &self.projects[i].text;
        let text_b = &self.projects[j].text;
        let regular = |text: &[Symbol], pos: usize| {
            text.get(pos).copied().filter(|&sym| !is_special(sym))
        };
        let mut depth = 0;
        loop {
            match (regular(text_a, a + depth), regular(text_b, b + depth)) {
                (Some(x), Some(y)) if x != y => return x.cmp(&y),
                (Some(_), Some(_)) => depth += 1,
                (None, None) => {
                    return (self.offsets[i] + a).cmp(&(self.offsets[j] + b))
                }
                (None, Some(_)) => return Ordering::Greater,
                (Some(_), None) => return Ordering::Less,
            }
        }
    }
}

impl<T> SuffixBwtSource for EsaMerger<T>
where
    T: Int + FromUsize<T> + Sized + Send + Sync + serde::ser::Serialize,
{
    fn next_entry(&mut self) -> Result<Option<(usize, Symbol)>> {
        let mut best: Option<(usize, usize)> = None;
        for (i, head) in self.heads.iter().enumerate() {
            if let Some(head) = head {
                best = match best {
                    Some(current)
                        if self.compare(current, (i, head.suffix)) != Ordering::Greater =>
                    {
                        Some(current)
                    }
                    _ => Some((i, head.suffix)),
                };
            }
        }

        let Some((i, suffix)) = best else {
            return Ok(None);
        };
        let bwt = match (suffix, i) {
            (0, 0) => UNDEF_BWT,
            (0, _) => SEPARATOR,
            _ => self.heads[i].map_or(UNDEF_BWT, |h| h.bwt),
        };
        self.heads[i] = Self::read_head(&mut self.projects[i])?;
        Ok(Some((self.offsets[i] + suffix, bwt)))
    }

    fn total_length(&self) -> usize {
        self.total_length
    }

    fn special_characters(&self) -> usize {
        self.special_characters
    }

    fn alphabet(&self) -> &Alphabet {
        &self.projects[0].alphabet
    }

    fn read_mode(&self) -> ReadMode {
        ReadMode::Forward
    }

    fn special_ranges(&self) -> Vec<Range<usize>> {
        self.special_ranges.clone()
    }

    fn sequence_starts(&self) -> &[usize] {
        &self.sequence_starts
    }

    fn headers(&self) -> &[String] {
        &self.headers
    }
}
