//! Byte-level Transformer models on candle.
//!
//! This crate re-exports the workspace crates under one roof and adds the
//! glue between the tokenizer and the models: turning a batch of texts into
//! a padded `(batch, seq)` id tensor.
//!
//! ```no_run
//! use byte_transformer::{batch_ids, ByteTokenizer, TransformerLM, TransformerLMConfig};
//! use byte_transformer::layers::ForwardContext;
//! use candle_core::{DType, Device};
//! use candle_nn::{VarBuilder, VarMap};
//!
//! # fn main() -> candle_core::Result<()> {
//! let device = Device::Cpu;
//! let tokenizer = ByteTokenizer::default();
//! let varmap = VarMap::new();
//! let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
//! let mut config = TransformerLMConfig::new(tokenizer.vocab_size(), 32);
//! config.depth = 2;
//! config.heads = 4;
//! config.pad_idx = Some(byte_transformer::tokenizer::PAD_ID);
//! let model = TransformerLM::new(config, vb)?;
//!
//! let ids = batch_ids(&tokenizer, &["hello", "hi"], &device)?;
//! let logits = model.forward(&ids, None, &mut ForwardContext::eval())?;
//! assert_eq!(logits.dims(), &[2, 5, 259]);
//! # Ok(())
//! # }
//! ```

pub use attention;
pub use embedding;
pub use layers;
pub use model;
pub use tokenizer;

pub use model::{TransformerEncDec, TransformerEncDecConfig, TransformerLM, TransformerLMConfig};
pub use tokenizer::{ByteTokenizer, TokenizerConfig};

use candle_core::{Device, Result, Tensor};

/// Encodes each text separately and right-pads with `<pad>` to the longest
/// sequence, giving a `(batch, seq)` `u32` tensor.
pub fn batch_ids<S: AsRef<str>>(
    tokenizer: &ByteTokenizer,
    texts: &[S],
    device: &Device,
) -> Result<Tensor> {
    if texts.is_empty() {
        candle_core::bail!("batch_ids: at least one text is required");
    }
    let sequences: Vec<Vec<u32>> = texts
        .iter()
        .map(|text| tokenizer.encode_one(text.as_ref()))
        .collect();
    let seq_len = sequences.iter().map(Vec::len).max().unwrap_or(0);
    if seq_len == 0 {
        candle_core::bail!("batch_ids: every text encoded to an empty sequence");
    }
    let mut data = Vec::with_capacity(sequences.len() * seq_len);
    for ids in &sequences {
        data.extend_from_slice(ids);
        data.resize(data.len() + seq_len - ids.len(), tokenizer::PAD_ID);
    }
    Tensor::from_vec(data, (sequences.len(), seq_len), device)
}
