//! Bit-level access to packed integer buffers
//!
//! Bits are numbered most-significant first: bit offset 0 is the top
//! bit of the first word. Fields may straddle word boundaries.
use serde::{Deserialize, Serialize};
use std::cmp::{min, Ordering};

const WORD_BITS: usize = u64::BITS as usize;

// --------------------------------------------------
#[inline(always)]
fn mask(bits: usize) -> u64 {
    if bits >= WORD_BITS {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

// --------------------------------------------------
/// Number of bits needed to store `value` (at least 1)
pub fn required_bits(value: u64) -> u32 {
    (u64::BITS - value.leading_zeros()).max(1)
}

// --------------------------------------------------
/// Read up to 64 bits starting at `offset` as an unsigned integer
#[inline]
pub fn get_bits(words: &[u64], offset: usize, bits: usize) -> u64 {
    debug_assert!(bits <= WORD_BITS);
    if bits == 0 {
        return 0;
    }
    let word = offset / WORD_BITS;
    let bit = offset % WORD_BITS;
    if bit + bits <= WORD_BITS {
        (words[word] >> (WORD_BITS - bit - bits)) & mask(bits)
    } else {
        let high = WORD_BITS - bit;
        let low = bits - high;
        ((words[word] & mask(high)) << low) | (words[word + 1] >> (WORD_BITS - low))
    }
}

// --------------------------------------------------
/// Write the low `bits` bits of `value` at `offset`, leaving
/// all other bits untouched
#[inline]
pub fn set_bits(words: &mut [u64], offset: usize, bits: usize, value: u64) {
    debug_assert!(bits <= WORD_BITS);
    if bits == 0 {
        return;
    }
    let value = value & mask(bits);
    let word = offset / WORD_BITS;
    let bit = offset % WORD_BITS;
    if bit + bits <= WORD_BITS {
        let shift = WORD_BITS - bit - bits;
        words[word] = (words[word] & !(mask(bits) << shift)) | (value << shift);
    } else {
        let high = WORD_BITS - bit;
        let low = bits - high;
        words[word] = (words[word] & !mask(high)) | (value >> low);
        let shift = WORD_BITS - low;
        words[word + 1] = (words[word + 1] & !(mask(low) << shift)) | (value << shift);
    }
}

// --------------------------------------------------
/// Compare two bit ranges as unsigned numbers, most significant bit
/// first. When the lengths differ the shorter range is padded with
/// leading zeros, so any set bit in the surplus prefix of the longer
/// range makes it greater.
///
/// ```
/// use libfmidx::bitpack::compare;
/// use std::cmp::Ordering;
///
/// let a = [0b1011u64 << 60];
/// let b = [0b0101_1000u64 << 56];
/// // "1011" vs "01011": equal after padding "1011" to "01011"
/// assert_eq!(compare(&a, 0, 4, &b, 0, 5), Ordering::Equal);
/// assert_eq!(compare(&a, 0, 0, &b, 0, 0), Ordering::Equal);
/// ```
pub fn compare(
    a: &[u64],
    offset_a: usize,
    len_a: usize,
    b: &[u64],
    offset_b: usize,
    len_b: usize,
) -> Ordering {
    let (mut offset_a, mut offset_b) = (offset_a, offset_b);
    if len_a > len_b {
        if any_bit_set(a, offset_a, len_a - len_b) {
            return Ordering::Greater;
        }
        offset_a += len_a - len_b;
    } else if len_b > len_a {
        if any_bit_set(b, offset_b, len_b - len_a) {
            return Ordering::Less;
        }
        offset_b += len_b - len_a;
    }

    let mut remaining = min(len_a, len_b);
    while remaining > 0 {
        let chunk = min(remaining, WORD_BITS);
        let val_a = get_bits(a, offset_a, chunk);
        let val_b = get_bits(b, offset_b, chunk);
        match val_a.cmp(&val_b) {
            Ordering::Equal => {}
            other => return other,
        }
        offset_a += chunk;
        offset_b += chunk;
        remaining -= chunk;
    }
    Ordering::Equal
}

// --------------------------------------------------
fn any_bit_set(words: &[u64], offset: usize, len: usize) -> bool {
    let (mut offset, mut remaining) = (offset, len);
    while remaining > 0 {
        let chunk = min(remaining, WORD_BITS);
        if get_bits(words, offset, chunk) != 0 {
            return true;
        }
        offset += chunk;
        remaining -= chunk;
    }
    false
}

// --------------------------------------------------
/// Copy `num_bits` bits from `src` at `offset_src` to `dest` at
/// `offset_dest`. Bits of `dest` outside the target run keep their
/// values. Equal alignment within a word takes a bulk word copy.
pub fn copy(
    src: &[u64],
    offset_src: usize,
    dest: &mut [u64],
    offset_dest: usize,
    num_bits: usize,
) {
    if num_bits == 0 {
        return;
    }

    let (mut src_pos, mut dest_pos, mut remaining) = (offset_src, offset_dest, num_bits);
    if offset_src % WORD_BITS == offset_dest % WORD_BITS {
        // Partial head up to the word boundary
        let head = min((WORD_BITS - dest_pos % WORD_BITS) % WORD_BITS, remaining);
        if head > 0 {
            set_bits(dest, dest_pos, head, get_bits(src, src_pos, head));
            src_pos += head;
            dest_pos += head;
            remaining -= head;
        }

        let whole = remaining / WORD_BITS;
        if whole > 0 {
            let (src_word, dest_word) = (src_pos / WORD_BITS, dest_pos / WORD_BITS);
            dest[dest_word..dest_word + whole]
                .copy_from_slice(&src[src_word..src_word + whole]);
            src_pos += whole * WORD_BITS;
            dest_pos += whole * WORD_BITS;
            remaining -= whole * WORD_BITS;
        }

        if remaining > 0 {
            set_bits(dest, dest_pos, remaining, get_bits(src, src_pos, remaining));
        }
    } else {
        // Fill the destination one word-sized chunk at a time
        while remaining > 0 {
            let room = WORD_BITS - dest_pos % WORD_BITS;
            let chunk = min(room, remaining);
            set_bits(dest, dest_pos, chunk, get_bits(src, src_pos, chunk));
            src_pos += chunk;
            dest_pos += chunk;
            remaining -= chunk;
        }
    }
}

// --------------------------------------------------
/// An owned, growable-once bit buffer for fixed-width fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitString {
    words: Vec<u64>,
    num_bits: usize,
}

impl BitString {
    pub fn new(num_bits: usize) -> Self {
        BitString {
            words: vec![0; num_bits.div_ceil(WORD_BITS)],
            num_bits,
        }
    }

    pub fn len_bits(&self) -> usize {
        self.num_bits
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    pub fn size_in_bytes(&self) -> usize {
        self.words.len() * std::mem::size_of::<u64>()
    }

    #[inline(always)]
    pub fn get_uint(&self, offset: usize, bits: u32) -> u64 {
        get_bits(&self.words, offset, bits as usize)
    }

    #[inline(always)]
    pub fn set_uint(&mut self, offset: usize, bits: u32, value: u64) {
        set_bits(&mut self.words, offset, bits as usize, value)
    }

    /// Overwrite `num_bits` bits at `offset` with the bits of `src`
    /// starting at `src_offset`
    pub fn copy_from(
        &mut self,
        offset: usize,
        src: &BitString,
        src_offset: usize,
        num_bits: usize,
    ) {
        copy(&src.words, src_offset, &mut self.words, offset, num_bits)
    }

    /// Compare `num_bits` bits at `offset` with the same number of
    /// bits of `other` at `other_offset`
    pub fn compare_range(
        &self,
        offset: usize,
        other: &BitString,
        other_offset: usize,
        num_bits: usize,
    ) -> Ordering {
        compare(&self.words, offset, num_bits, &other.words, other_offset, num_bits)
    }
}

// --------------------------------------------------
#[cfg(test)]
mod test {
    use super::{compare, copy, get_bits, required_bits, set_bits, BitString};
    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use rand::Rng;
    use std::cmp::Ordering;

    fn bit(words: &[u64], pos: usize) -> bool {
        get_bits(words, pos, 1) == 1
    }

    #[test]
    fn test_required_bits() -> Result<()> {
        assert_eq!(required_bits(0), 1);
        assert_eq!(required_bits(1), 1);
        assert_eq!(required_bits(2), 2);
        assert_eq!(required_bits(6), 3);
        assert_eq!(required_bits(255), 8);
        assert_eq!(required_bits(256), 9);
        assert_eq!(required_bits(u64::MAX), 64);
        Ok(())
    }

    #[test]
    fn test_get_set_straddling() -> Result<()> {
        let mut words = vec![0u64; 3];
        set_bits(&mut words, 60, 10, 0b10_1100_1101);
        assert_eq!(get_bits(&words, 60, 10), 0b10_1100_1101);
        assert_eq!(words[0], 0b1011);
        assert_eq!(words[1] >> 58, 0b001101);

        set_bits(&mut words, 64, 64, u64::MAX);
        assert_eq!(get_bits(&words, 64, 64), u64::MAX);
        assert_eq!(get_bits(&words, 60, 4), 0b1011);
        assert_eq!(words[2], 0);
        Ok(())
    }

    #[test]
    fn test_bit_string() -> Result<()> {
        let mut bs = BitString::new(3 * 50);
        assert_eq!(bs.len_bits(), 150);
        assert_eq!(bs.words().len(), 3);
        for i in 0..50 {
            bs.set_uint(i * 3, 3, (i % 7) as u64);
        }
        for i in 0..50 {
            assert_eq!(bs.get_uint(i * 3, 3), (i % 7) as u64);
        }
        Ok(())
    }

    #[test]
    fn test_bit_string_ranges() -> Result<()> {
        let mut block = BitString::new(5 * 7);
        for i in 0..7 {
            block.set_uint(i * 5, 5, (i * 3 + 1) as u64);
        }
        let mut whole = BitString::new(5 * 40);
        whole.copy_from(5 * 11, &block, 0, 5 * 7);
        for i in 0..7 {
            assert_eq!(whole.get_uint((11 + i) * 5, 5), (i * 3 + 1) as u64);
        }
        assert_eq!(whole.get_uint(10 * 5, 5), 0);
        assert_eq!(whole.get_uint(18 * 5, 5), 0);

        assert_eq!(whole.compare_range(5 * 11, &block, 0, 5 * 7), Ordering::Equal);
        assert_eq!(whole.compare_range(5 * 12, &block, 5, 5 * 6), Ordering::Equal);
        block.set_uint(5 * 6, 5, 31);
        assert_eq!(whole.compare_range(5 * 11, &block, 0, 5 * 7), Ordering::Less);
        assert_eq!(block.compare_range(0, &whole, 5 * 11, 5 * 7), Ordering::Greater);
        Ok(())
    }

    #[test]
    fn test_compare_equal_lengths() -> Result<()> {
        let a = [0xF0F0_0000_0000_0000u64, 0];
        let b = [0x0F0F_0000_0000_0000u64, 0];
        assert_eq!(compare(&a, 0, 8, &b, 4, 8), Ordering::Equal);
        assert_eq!(compare(&a, 0, 8, &b, 0, 8), Ordering::Greater);
        assert_eq!(compare(&b, 0, 8, &a, 0, 8), Ordering::Less);
        assert_eq!(compare(&a, 0, 0, &b, 3, 0), Ordering::Equal);
        Ok(())
    }

    #[test]
    fn test_compare_unequal_lengths() -> Result<()> {
        // a = "1", b = "0001"
        let a = [1u64 << 63];
        let b = [1u64 << 60];
        assert_eq!(compare(&a, 0, 1, &b, 0, 4), Ordering::Equal);

        // b = "1001" has a set surplus bit
        let b = [0b1001u64 << 60];
        assert_eq!(compare(&a, 0, 1, &b, 0, 4), Ordering::Less);
        assert_eq!(compare(&b, 0, 4, &a, 0, 1), Ordering::Greater);

        // Empty vs zeros is equal, empty vs non-zero is less
        assert_eq!(compare(&a, 0, 0, &[0u64], 0, 5), Ordering::Equal);
        assert_eq!(compare(&a, 0, 0, &a, 0, 5), Ordering::Less);
        Ok(())
    }

    #[test]
    fn test_compare_matches_integers() -> Result<()> {
        let mut rng = rand::thread_rng();
        for _ in 0..500 {
            let len_a = rng.gen_range(0..=40);
            let len_b = rng.gen_range(0..=40);
            let val_a: u64 = rng.gen::<u64>() & ((1u64 << len_a) - 1);
            let val_b: u64 = rng.gen::<u64>() & ((1u64 << len_b) - 1);
            let off_a = rng.gen_range(0..80);
            let off_b = rng.gen_range(0..80);
            let mut a = vec![rng.gen::<u64>(), rng.gen::<u64>()];
            let mut b = vec![rng.gen::<u64>(), rng.gen::<u64>()];
            set_bits(&mut a, off_a, len_a, val_a);
            set_bits(&mut b, off_b, len_b, val_b);
            assert_eq!(
                compare(&a, off_a, len_a, &b, off_b, len_b),
                val_a.cmp(&val_b)
            );
        }
        Ok(())
    }

    #[test]
    fn test_copy_13_bits_misaligned() -> Result<()> {
        let src = vec![0xDEAD_BEEF_CAFE_F00Du64, 0x0123_4567_89AB_CDEF];
        let mut dest = vec![0x5555_5555_5555_5555u64, 0xAAAA_AAAA_AAAA_AAAA];
        let src_before = src.clone();
        let dest_before = dest.clone();

        copy(&src, 3, &mut dest, 7, 13);

        for i in 0..13 {
            assert_eq!(bit(&dest, 7 + i), bit(&src, 3 + i), "bit {i}");
        }
        for pos in (0..7).chain(20..128) {
            assert_eq!(bit(&dest, pos), bit(&dest_before, pos), "bit {pos}");
        }
        assert_eq!(src, src_before);
        Ok(())
    }

    #[test]
    fn test_copy_aligned_and_random() -> Result<()> {
        let mut rng = rand::thread_rng();
        for _ in 0..300 {
            let src: Vec<u64> = (0..6).map(|_| rng.gen()).collect();
            let dest_before: Vec<u64> = (0..6).map(|_| rng.gen()).collect();
            let num_bits = rng.gen_range(0..200);
            let offset_src = rng.gen_range(0..(384 - num_bits));
            let offset_dest = if rng.gen_bool(0.5) {
                // Force the aligned path
                let word = rng.gen_range(0..=(384 - num_bits - offset_src % 64) / 64);
                (word * 64 + offset_src % 64).min(384 - num_bits)
            } else {
                rng.gen_range(0..(384 - num_bits))
            };
            let mut dest = dest_before.clone();
            copy(&src, offset_src, &mut dest, offset_dest, num_bits);
            for pos in 0..384 {
                let expected = if (offset_dest..offset_dest + num_bits).contains(&pos) {
                    bit(&src, offset_src + pos - offset_dest)
                } else {
                    bit(&dest_before, pos)
                };
                assert_eq!(bit(&dest, pos), expected, "pos {pos}");
            }
        }
        Ok(())
    }
}
