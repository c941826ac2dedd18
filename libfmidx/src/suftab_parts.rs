//! Partition of the code space into contiguous parts of similar width
use crate::{
    error::{FmIndexError, Result},
    types::Code,
};

// --------------------------------------------------
/// Codes `min_code..=max_code` whose suffixes occupy ranks
/// `offset..offset + width` of the suffix array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuftabPart {
    pub min_code: Code,
    pub max_code: Code,
    pub offset: usize,
    pub width: usize,
}

// --------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SuftabParts {
    parts: Vec<SuftabPart>,
    largest_width: usize,
}

impl SuftabParts {
    /// Split into at most `num_parts` parts using the inclusive
    /// prefix sums in `leftborder[..num_codes]`. Empty parts are dropped.
    pub fn new(num_parts: usize, leftborder: &[usize], num_codes: usize) -> Self {
        let total = if num_codes == 0 {
            0
        } else {
            leftborder[num_codes - 1]
        };
        if total == 0 {
            return SuftabParts::default();
        }

        let num_parts = num_parts.clamp(1, total);
        let mut parts = vec![];
        let mut min_code = 0usize;
        let mut offset = 0usize;
        for part_num in 0..num_parts {
            if min_code >= num_codes {
                break;
            }
            let bound = if part_num + 1 == num_parts {
                total
            } else {
                total * (part_num + 1) / num_parts
            };
            let max_code = min_code
                + leftborder[min_code..num_codes].partition_point(|&sum| sum < bound);
            let max_code = max_code.min(num_codes - 1);
            let end = leftborder[max_code];
            if end > offset {
                parts.push(SuftabPart {
                    min_code: min_code as Code,
                    max_code: max_code as Code,
                    offset,
                    width: end - offset,
                });
            }
            offset = end;
            min_code = max_code + 1;
        }

        let largest_width = parts.iter().map(|p| p.width).max().unwrap_or(0);
        SuftabParts {
            parts,
            largest_width,
        }
    }

    /// Pack whole buckets into parts holding at most `max_width`
    /// suffixes each. A part is closed before the bucket that would
    /// overflow it. Fails when one bucket alone exceeds `max_width`.
    pub fn with_max_width(
        max_width: usize,
        leftborder: &[usize],
        num_codes: usize,
    ) -> Result<Self> {
        let mut parts = vec![];
        let mut min_code = 0usize;
        let mut offset = 0usize;
        let mut prev_end = 0usize;
        for (code, &end) in leftborder[..num_codes].iter().enumerate() {
            let bucket_width = end - prev_end;
            if bucket_width > max_width {
                return Err(FmIndexError::InvalidParameter(format!(
                    "bucket {code} holds {bucket_width} suffixes but the memory \
                    limit allows {max_width} per part, use a longer prefix"
                )));
            }
            if end - offset > max_width {
                parts.push(SuftabPart {
                    min_code: min_code as Code,
                    max_code: (code - 1) as Code,
                    offset,
                    width: prev_end - offset,
                });
                offset = prev_end;
                min_code = code;
            }
            prev_end = end;
        }
        if prev_end > offset {
            parts.push(SuftabPart {
                min_code: min_code as Code,
                max_code: (num_codes - 1) as Code,
                offset,
                width: prev_end - offset,
            });
        }

        let largest_width = parts.iter().map(|p| p.width).max().unwrap_or(0);
        Ok(SuftabParts {
            parts,
            largest_width,
        })
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&SuftabPart> {
        self.parts.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SuftabPart> {
        self.parts.iter()
    }

    pub fn largest_width(&self) -> usize {
        self.largest_width
    }
}
