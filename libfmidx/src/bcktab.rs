//! Q-gram codes and the bucket table (leftborder)
//!
//! A code is the base-`num_chars` number formed by the first `q`
//! symbols of a suffix. When a special symbol or the end of the
//! sequence cuts the window short after `j` symbols, the remaining
//! `q - j` digits are filled with the largest digit so that such
//! suffixes land at the end of their prefix's code range.
use crate::{
    error::{FmIndexError, Result},
    types::{Code, Symbol, MAX_CODE_VALUE, MAX_PREFIX_LEN},
};

// --------------------------------------------------
/// A deferred window cut short by a special symbol at `position`.
/// `code` covers the `max_prefix_len` regular symbols in front of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeAtPosition {
    pub code: Code,
    pub max_prefix_len: u8,
    pub position: usize,
}

// --------------------------------------------------
#[derive(Debug)]
pub struct BucketTable {
    pub num_chars: usize,
    pub prefix_len: usize,
    pub num_codes: usize,

    /// `basepower[i] = num_chars^i` for `i` in `0..=q`
    pub basepower: Vec<Code>,

    /// `filltable[i] = num_chars^(q - i) - 1`: value of `q - i`
    /// trailing largest digits
    pub filltable: Vec<Code>,

    /// Counts, then inclusive prefix sums, then next free slot
    pub leftborder: Vec<usize>,
}

impl BucketTable {
    /// Validate `prefix_len` and the code space, then allocate
    pub fn new(num_chars: usize, prefix_len: usize) -> Result<Self> {
        if prefix_len == 0 || prefix_len > MAX_PREFIX_LEN {
            return Err(FmIndexError::InvalidPrefixLength {
                prefix_len,
                max: MAX_PREFIX_LEN,
            });
        }

        if num_chars == 0 {
            return Err(FmIndexError::InvalidParameter(
                "alphabet has no regular symbols".to_string(),
            ));
        }

        let overflow = || FmIndexError::CodeSpaceOverflow {
            num_chars,
            prefix_len,
            max: MAX_CODE_VALUE,
        };
        let mut num_codes: u64 = 1;
        for _ in 0..prefix_len {
            num_codes = num_codes
                .checked_mul(num_chars as u64)
                .ok_or_else(overflow)?;
            if num_codes - 1 > MAX_CODE_VALUE {
                return Err(overflow());
            }
        }
        let mut basepower = vec![1 as Code; prefix_len + 1];
        for i in 1..=prefix_len {
            basepower[i] = basepower[i - 1] * num_chars as Code;
        }
        let filltable = (0..=prefix_len)
            .map(|i| basepower[prefix_len - i] - 1)
            .collect();

        Ok(BucketTable {
            num_chars,
            prefix_len,
            num_codes: num_codes as usize,
            basepower,
            filltable,
            leftborder: vec![0; num_codes as usize + 1],
        })
    }

    /// Code of a window holding `len` regular symbols whose value
    /// (base `num_chars`) is `prefix_value`, padded to `q` digits
    #[inline(always)]
    pub fn padded_code(&self, prefix_value: Code, len: usize) -> Code {
        prefix_value * self.basepower[self.prefix_len - len] + self.filltable[len]
    }

    /// Turn the counts into inclusive prefix sums. The sentinel at
    /// `num_codes` receives the total.
    pub fn accumulate(&mut self) -> usize {
        let mut total = 0;
        for slot in self.leftborder.iter_mut().take(self.num_codes) {
            total += *slot;
            *slot = total;
        }
        self.leftborder[self.num_codes] = total;
        total
    }

    /// Length of the prefix shared by every suffix in the bucket of
    /// `code`: trailing largest digits may stand for a cut window.
    pub fn shared_prefix_len(&self, code: Code) -> usize {
        let max_digit = (self.num_chars - 1) as Code;
        let mut code = code;
        let mut trailing = 0;
        while trailing < self.prefix_len && code % self.num_chars as Code == max_digit {
            code /= self.num_chars as Code;
            trailing += 1;
        }
        self.prefix_len - trailing
    }

    pub fn code_downscale(&self, code: Code, prefix_index: usize, max_prefix_len: usize) -> Code {
        code_downscale(
            code,
            prefix_index,
            max_prefix_len,
            &self.filltable,
            &self.basepower,
        )
    }

    pub fn size_in_bytes(&self) -> usize {
        self.leftborder.len() * std::mem::size_of::<usize>()
    }
}

// --------------------------------------------------
/// Project the padded code of a window with `max_prefix_len`
/// symbols onto its last `prefix_index` symbols, padded again
///
/// ```
/// use libfmidx::bcktab::BucketTable;
///
/// // DNA, q = 3: "CG" + cut encodes as C G T = 27
/// let bcktab = BucketTable::new(4, 3).unwrap();
/// let code = bcktab.padded_code(1 * 4 + 2, 2);
/// assert_eq!(code, 27);
/// // "G" + cut is G T T
/// assert_eq!(bcktab.code_downscale(code, 1, 2), 2 * 16 + 15);
/// assert_eq!(bcktab.code_downscale(code, 2, 2), code);
/// ```
#[inline]
pub fn code_downscale(
    code: Code,
    prefix_index: usize,
    max_prefix_len: usize,
    filltable: &[Code],
    basepower: &[Code],
) -> Code {
    let mut code = code - filltable[max_prefix_len];
    let remain = max_prefix_len - prefix_index;
    code %= filltable[remain] + 1;
    code *= basepower[remain];
    code + filltable[prefix_index]
}

// --------------------------------------------------
/// Rolling q-gram codes over a symbol slice. Calls `full(pos, code)`
/// for every window of `q` regular symbols and `cut(entry)` once for
/// every special run (and the end) preceded by a regular symbol.
pub fn scan_codes<F, G>(bcktab: &BucketTable, text: &[Symbol], mut full: F, mut cut: G)
where
    F: FnMut(usize, Code),
    G: FnMut(CodeAtPosition),
{
    let q = bcktab.prefix_len;
    let num_chars = bcktab.num_chars as Code;
    let modulus = bcktab.basepower[q];
    let max_cut = q - 1;
    let mut rolling: Code = 0;
    let mut run = 0usize;

    let mut emit_cut = |position: usize, run: usize, rolling: Code| {
        let len = run.min(max_cut);
        if len > 0 {
            let prefix_value = rolling % bcktab.basepower[len];
            cut(CodeAtPosition {
                code: bcktab.padded_code(prefix_value, len),
                max_prefix_len: len as u8,
                position,
            });
        }
    };

    for (pos, &sym) in text.iter().enumerate() {
        if (sym as usize) < bcktab.num_chars {
            rolling = (rolling % (modulus / num_chars)) * num_chars + sym as Code;
            run += 1;
            if run >= q {
                full(pos + 1 - q, rolling);
            }
        } else {
            emit_cut(pos, run, rolling);
            rolling = 0;
            run = 0;
        }
    }
    emit_cut(text.len(), run, rolling);
}

// --------------------------------------------------
#[cfg(test)]
mod test {
    use super::{code_downscale, scan_codes, BucketTable, CodeAtPosition};
    use crate::{
        error::FmIndexError,
        types::{Code, WILDCARD},
    };
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_rejects_bad_prefix() -> Result<()> {
        assert!(matches!(
            BucketTable::new(4, 0),
            Err(FmIndexError::InvalidPrefixLength { prefix_len: 0, .. })
        ));
        assert!(matches!(
            BucketTable::new(4, 16),
            Err(FmIndexError::InvalidPrefixLength { prefix_len: 16, .. })
        ));
        // 4^15 - 1 is beyond the largest code 2^28 - 1
        assert!(matches!(
            BucketTable::new(4, 15),
            Err(FmIndexError::CodeSpaceOverflow { .. })
        ));
        assert!(matches!(
            BucketTable::new(20, 7),
            Err(FmIndexError::CodeSpaceOverflow { .. })
        ));
        assert!(BucketTable::new(4, 10).is_ok());
        assert!(BucketTable::new(0, 2).is_err());
        assert!(BucketTable::new(1, 15).is_ok());
        Ok(())
    }

    #[test]
    fn test_tables() -> Result<()> {
        let bcktab = BucketTable::new(4, 3)?;
        assert_eq!(bcktab.num_codes, 64);
        assert_eq!(bcktab.basepower, [1, 4, 16, 64]);
        assert_eq!(bcktab.filltable, [63, 15, 3, 0]);
        assert_eq!(bcktab.leftborder.len(), 65);
        Ok(())
    }

    #[test]
    fn test_code_downscale_matches_direct() -> Result<()> {
        // Every prefix of every cut window of length 1..q
        let bcktab = BucketTable::new(3, 4)?;
        let q = bcktab.prefix_len;
        for max_prefix_len in 1..q {
            for value in 0..bcktab.basepower[max_prefix_len] {
                let code = bcktab.padded_code(value, max_prefix_len);
                for prefix_index in 1..=max_prefix_len {
                    let suffix_value = value % bcktab.basepower[prefix_index];
                    assert_eq!(
                        code_downscale(
                            code,
                            prefix_index,
                            max_prefix_len,
                            &bcktab.filltable,
                            &bcktab.basepower
                        ),
                        bcktab.padded_code(suffix_value, prefix_index)
                    );
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_shared_prefix_len() -> Result<()> {
        let bcktab = BucketTable::new(4, 2)?;
        assert_eq!(bcktab.shared_prefix_len(7), 1); // [1, 3]
        assert_eq!(bcktab.shared_prefix_len(13), 2); // [3, 1]
        assert_eq!(bcktab.shared_prefix_len(15), 0); // [3, 3]
        assert_eq!(bcktab.shared_prefix_len(0), 2);
        Ok(())
    }

    #[test]
    fn test_scan_codes() -> Result<()> {
        // $=0 a=1 b=2 n=3, "banana$" with q = 2
        let bcktab = BucketTable::new(4, 2)?;
        let text = [2, 1, 3, 1, 3, 1, 0];
        let mut full: Vec<(usize, Code)> = vec![];
        let mut cut: Vec<CodeAtPosition> = vec![];
        scan_codes(&bcktab, &text, |p, c| full.push((p, c)), |e| cut.push(e));
        assert_eq!(
            full,
            [(0, 9), (1, 7), (2, 13), (3, 7), (4, 13), (5, 4)]
        );
        assert_eq!(
            cut,
            [CodeAtPosition {
                code: 3,
                max_prefix_len: 1,
                position: 7
            }]
        );

        // Special runs cut windows; consecutive specials produce no entry
        let bcktab = BucketTable::new(4, 3)?;
        let text = [0, 1, WILDCARD, WILDCARD, 2, 3, 0, 1];
        let mut full = vec![];
        let mut cut = vec![];
        scan_codes(&bcktab, &text, |p, _| full.push(p), |e| cut.push(e));
        assert_eq!(full, [4, 5]);
        assert_eq!(
            cut,
            [
                CodeAtPosition {
                    code: bcktab.padded_code(1, 2),
                    max_prefix_len: 2,
                    position: 2
                },
                CodeAtPosition {
                    code: bcktab.padded_code(1, 2),
                    max_prefix_len: 2,
                    position: 8
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn test_accumulate() -> Result<()> {
        let mut bcktab = BucketTable::new(2, 2)?;
        bcktab.leftborder[..4].copy_from_slice(&[2, 0, 3, 1]);
        assert_eq!(bcktab.accumulate(), 6);
        assert_eq!(bcktab.leftborder, [2, 2, 5, 6, 6]);
        Ok(())
    }
}
