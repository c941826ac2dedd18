//! Mapping between raw sequence bytes and symbol codes
use crate::{
    error::{FmIndexError, QueryError, Result},
    types::{Symbol, MAX_ALPHABET_SIZE, SEPARATOR, UNDEF_BWT, WILDCARD},
};
use serde::{Deserialize, Serialize};

const DNA_WILDCARDS: &[u8] = b"NRYKMSWBDHVnrykmswbdhv";

// --------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alphabet {
    /// Display character for each regular code
    characters: Vec<u8>,

    /// Byte to symbol; `None` for bytes outside the alphabet
    map: Vec<Option<Symbol>>,

    /// Character printed for wildcard symbols
    wildcard_char: u8,
}

impl Alphabet {
    /// Nucleotides, case-insensitive, with IUPAC ambiguity codes
    /// mapped to the wildcard
    pub fn dna() -> Self {
        let mut map = vec![None; 256];
        for (code, (&upper, &lower)) in b"ACGT".iter().zip(b"acgt").enumerate() {
            map[upper as usize] = Some(code as Symbol);
            map[lower as usize] = Some(code as Symbol);
        }
        for &b in DNA_WILDCARDS {
            map[b as usize] = Some(WILDCARD);
        }
        Alphabet {
            characters: b"ACGT".to_vec(),
            map,
            wildcard_char: b'N',
        }
    }

    /// Regular symbols numbered in the order of `characters`,
    /// `wildcards` mapped to the wildcard symbol
    ///
    /// ```
    /// use libfmidx::alphabet::Alphabet;
    ///
    /// let alphabet = Alphabet::from_chars(b"$abn", b"").unwrap();
    /// assert_eq!(alphabet.num_chars(), 4);
    /// assert_eq!(alphabet.encode_bytes(b"banana$"), [2, 1, 3, 1, 3, 1, 0]);
    /// ```
    pub fn from_chars(characters: &[u8], wildcards: &[u8]) -> Result<Self> {
        if characters.is_empty() || characters.len() > MAX_ALPHABET_SIZE {
            return Err(FmIndexError::InvalidParameter(format!(
                "alphabet must have between 1 and {MAX_ALPHABET_SIZE} characters"
            )));
        }
        let mut map = vec![None; 256];
        for (code, &b) in characters.iter().enumerate() {
            if map[b as usize].is_some() {
                return Err(FmIndexError::InvalidParameter(format!(
                    "duplicate alphabet character '{}'",
                    b as char
                )));
            }
            map[b as usize] = Some(code as Symbol);
        }
        for &b in wildcards {
            if map[b as usize].is_some() {
                return Err(FmIndexError::InvalidParameter(format!(
                    "wildcard '{}' is also a regular character",
                    b as char
                )));
            }
            map[b as usize] = Some(WILDCARD);
        }
        Ok(Alphabet {
            characters: characters.to_vec(),
            map,
            wildcard_char: wildcards.first().copied().unwrap_or(b'*'),
        })
    }

    pub fn num_chars(&self) -> usize {
        self.characters.len()
    }

    pub fn characters(&self) -> &[u8] {
        &self.characters
    }

    /// Encode a sequence byte; unknown bytes become wildcards
    #[inline]
    pub fn encode(&self, byte: u8) -> Symbol {
        self.map[byte as usize].unwrap_or(WILDCARD)
    }

    pub fn encode_bytes(&self, bytes: &[u8]) -> Vec<Symbol> {
        bytes.iter().map(|&b| self.encode(b)).collect()
    }

    /// Encode a query, refusing bytes the alphabet does not know
    pub fn encode_query(&self, query: &[u8]) -> Result<Vec<Symbol>> {
        query
            .iter()
            .map(|&b| {
                self.map[b as usize].ok_or_else(|| {
                    FmIndexError::from(QueryError::CharacterNotInAlphabet(b as char))
                })
            })
            .collect()
    }

    pub fn decode(&self, sym: Symbol) -> u8 {
        match sym {
            WILDCARD => self.wildcard_char,
            SEPARATOR => b'|',
            UNDEF_BWT => b'$',
            _ => self.characters.get(sym as usize).copied().unwrap_or(b'?'),
        }
    }
}

// --------------------------------------------------
#[cfg(test)]
mod test {
    use super::Alphabet;
    use crate::{
        error::{FmIndexError, QueryError},
        types::{SEPARATOR, UNDEF_BWT, WILDCARD},
    };
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dna() -> Result<()> {
        let alphabet = Alphabet::dna();
        assert_eq!(alphabet.num_chars(), 4);
        assert_eq!(
            alphabet.encode_bytes(b"ACGTacgtNnX"),
            [0, 1, 2, 3, 0, 1, 2, 3, WILDCARD, WILDCARD, WILDCARD]
        );
        assert_eq!(alphabet.decode(2), b'G');
        assert_eq!(alphabet.decode(WILDCARD), b'N');
        assert_eq!(alphabet.decode(SEPARATOR), b'|');
        assert_eq!(alphabet.decode(UNDEF_BWT), b'$');
        Ok(())
    }

    #[test]
    fn test_encode_query() -> Result<()> {
        let alphabet = Alphabet::dna();
        assert_eq!(alphabet.encode_query(b"GATN")?, [2, 0, 3, WILDCARD]);
        let res = alphabet.encode_query(b"GAX");
        assert!(matches!(
            res,
            Err(FmIndexError::Query(QueryError::CharacterNotInAlphabet('X')))
        ));
        Ok(())
    }

    #[test]
    fn test_from_chars() -> Result<()> {
        let alphabet = Alphabet::from_chars(b"$abn", b"*")?;
        assert_eq!(alphabet.encode_bytes(b"ban*"), [2, 1, 3, WILDCARD]);
        assert_eq!(alphabet.decode(WILDCARD), b'*');
        assert!(Alphabet::from_chars(b"", b"").is_err());
        assert!(Alphabet::from_chars(b"aa", b"").is_err());
        assert!(Alphabet::from_chars(b"ab", b"a").is_err());
        Ok(())
    }
}
