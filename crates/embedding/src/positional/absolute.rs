//! Learned absolute positional embeddings.

use candle_core::{Error, Result, Tensor};
use candle_nn::{Init, VarBuilder};

use crate::errors::EmbeddingError;
use crate::token::EMBEDDING_INIT_STD;

/// Learned `(max_seq_len, dim)` table; position `t` reads row `t`.
#[derive(Debug, Clone)]
pub struct AbsolutePositionalEmbedding {
    max_seq_len: usize,
    weight: Tensor,
}

impl AbsolutePositionalEmbedding {
    pub fn new(
        dim: usize,
        max_seq_len: usize,
        vb: VarBuilder,
    ) -> std::result::Result<Self, EmbeddingError> {
        if dim == 0 || max_seq_len == 0 {
            return Err(EmbeddingError::InvalidConfig {
                reason: format!(
                    "absolute positions need dim > 0 and max_seq_len > 0 (dim={dim}, max_seq_len={max_seq_len})"
                ),
            });
        }
        let weight = vb.get_with_hints(
            (max_seq_len, dim),
            "weight",
            Init::Randn {
                mean: 0.0,
                stdev: EMBEDDING_INIT_STD,
            },
        )?;
        Ok(Self {
            max_seq_len,
            weight,
        })
    }

    pub fn max_seq_len(&self) -> usize {
        self.max_seq_len
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn forward(&self, seq_len: usize) -> Result<Tensor> {
        if seq_len > self.max_seq_len {
            return Err(Error::Msg(format!(
                "sequence length {seq_len} exceeds max_seq_len {}",
                self.max_seq_len
            )));
        }
        self.weight.narrow(0, 0, seq_len)
    }
}
