//! Byte-to-id mapping with the reserved `<pad>`, `<eos>` and `<bos>` tokens.
//!
//! Encoding never fails: every UTF-8 byte has an id. Decoding rejects ids
//! outside the vocabulary and renders reserved ids as their token text.

use crate::{
    config::TokenizerConfig,
    errors::{Error, Result},
};

/// Id of `<pad>`.
pub const PAD_ID: u32 = 0;
/// Id of `<eos>`.
pub const EOS_ID: u32 = 1;
/// Id of `<bos>`.
pub const BOS_ID: u32 = 2;
/// Number of reserved ids preceding the byte range.
pub const NUM_RESERVED: u32 = 3;

const RESERVED_TOKENS: [&str; NUM_RESERVED as usize] = ["<pad>", "<eos>", "<bos>"];

/// Maps each UTF-8 byte `b` to id `b + NUM_RESERVED`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteTokenizer {
    config: TokenizerConfig,
}

impl ByteTokenizer {
    pub fn new(config: TokenizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    /// 256 byte ids plus the reserved tokens.
    pub fn vocab_size(&self) -> usize {
        256 + NUM_RESERVED as usize
    }

    /// Encodes one string, adding sentinels per the config.
    pub fn encode_one(&self, text: &str) -> Vec<u32> {
        self.with_sentinels(Self::byte_ids(text.as_bytes()))
    }

    /// Encodes several strings into a single flat sequence: all bytes are
    /// concatenated and the sentinels are applied once around the whole.
    pub fn encode_batch<S: AsRef<str>>(&self, texts: &[S]) -> Vec<u32> {
        let ids: Vec<u32> = texts
            .iter()
            .flat_map(|text| Self::byte_ids(text.as_ref().as_bytes()))
            .collect();
        self.with_sentinels(ids.into_iter())
    }

    /// Decodes ids back to text. Reserved ids render as their token text;
    /// invalid UTF-8 is replaced with U+FFFD.
    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        let mut bytes = Vec::with_capacity(ids.len());
        for &id in ids {
            match id {
                id if id < NUM_RESERVED => {
                    bytes.extend_from_slice(RESERVED_TOKENS[id as usize].as_bytes())
                }
                id if (id as usize) < self.vocab_size() => bytes.push((id - NUM_RESERVED) as u8),
                id => {
                    return Err(Error::IdOutOfRange {
                        id,
                        vocab_size: self.vocab_size(),
                    })
                }
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Decodes each sequence independently.
    pub fn decode_batch<I: AsRef<[u32]>>(&self, sequences: &[I]) -> Result<Vec<String>> {
        sequences
            .iter()
            .map(|ids| self.decode(ids.as_ref()))
            .collect()
    }

    fn byte_ids(bytes: &[u8]) -> impl Iterator<Item = u32> + '_ {
        bytes.iter().map(|&b| u32::from(b) + NUM_RESERVED)
    }

    fn with_sentinels(&self, ids: impl Iterator<Item = u32>) -> Vec<u32> {
        let bos = self.config.add_bos.then_some(BOS_ID);
        let eos = self.config.add_eos.then_some(EOS_ID);
        bos.into_iter().chain(ids).chain(eos).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_bytes_past_reserved_ids() {
        let tok = ByteTokenizer::default();
        assert_eq!(tok.encode_one("A"), vec![65 + 3]);
        assert_eq!(tok.encode_one(""), Vec::<u32>::new());
        assert_eq!(tok.vocab_size(), 259);
    }

    #[test]
    fn sentinels_follow_config() {
        let tok = ByteTokenizer::new(TokenizerConfig::new(true, true));
        assert_eq!(tok.encode_one("hi"), vec![BOS_ID, 107, 108, EOS_ID]);
        let bos_only = ByteTokenizer::new(TokenizerConfig::new(true, false));
        assert_eq!(bos_only.encode_one(""), vec![BOS_ID]);
    }

    #[test]
    fn reserved_ids_decode_to_token_text() {
        let tok = ByteTokenizer::default();
        assert_eq!(
            tok.decode(&[BOS_ID, 107, 108, EOS_ID, PAD_ID]).unwrap(),
            "<bos>hi<eos><pad>"
        );
    }

    #[test]
    fn out_of_range_ids_are_rejected() {
        let tok = ByteTokenizer::default();
        match tok.decode(&[5, 259]) {
            Err(Error::IdOutOfRange { id, vocab_size }) => {
                assert_eq!(id, 259);
                assert_eq!(vocab_size, 259);
            }
            other => panic!("expected IdOutOfRange, got {other:?}"),
        }
        assert!(tok.decode(&[258]).is_ok());
    }
}
