//! Byte-level tokenization with reserved special tokens.
//!
//! Every UTF-8 byte maps to its own id, shifted past three reserved ids:
//! `<pad>` = 0, `<eos>` = 1 and `<bos>` = 2, for a vocabulary of 259. No
//! training or artifacts are involved; [`TokenizerConfig`] only controls
//! whether `<bos>`/`<eos>` are added while encoding.
//!
//! # Thread Safety
//!
//! [`ByteTokenizer`] is a small `Copy` value and is `Send + Sync`.

pub mod byte;
pub mod config;
pub mod errors;

pub use byte::{ByteTokenizer, BOS_ID, EOS_ID, NUM_RESERVED, PAD_ID};
pub use config::TokenizerConfig;
pub use errors::{Error, Result};
