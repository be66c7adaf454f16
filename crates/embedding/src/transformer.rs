//! Token embedding plus positional encoding, followed by dropout.

use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;
use layers::dropout::{Dropout, ForwardContext};
use serde::{Deserialize, Serialize};

use crate::positional::{PositionalEncoding, PositionalKind};
use crate::token::{TokenEmbedding, TokenEmbeddingConfig};

fn default_max_seq_len() -> usize {
    512
}

/// Configuration for [`TransformerEmbedding`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerEmbeddingConfig {
    pub vocab_size: usize,
    pub dim: usize,
    #[serde(default = "default_max_seq_len")]
    pub max_seq_len: usize,
    /// Dropout applied to the summed embeddings.
    #[serde(default)]
    pub dropout_p: f32,
    #[serde(default)]
    pub positional: PositionalKind,
}

impl TransformerEmbeddingConfig {
    pub fn new(vocab_size: usize, dim: usize) -> Self {
        Self {
            vocab_size,
            dim,
            max_seq_len: default_max_seq_len(),
            dropout_p: 0.0,
            positional: PositionalKind::default(),
        }
    }
}

/// Maps `(batch, seq)` ids to `(batch, seq, dim)` hidden states.
///
/// Parameters live under `token` and `positional` in the supplied
/// [`VarBuilder`].
#[derive(Debug, Clone)]
pub struct TransformerEmbedding {
    config: TransformerEmbeddingConfig,
    token: TokenEmbedding,
    positional: PositionalEncoding,
    dropout: Dropout,
}

impl TransformerEmbedding {
    pub fn new(config: TransformerEmbeddingConfig, vb: VarBuilder) -> Result<Self> {
        let dropout = Dropout::new(config.dropout_p)?;
        let token = TokenEmbedding::new(
            TokenEmbeddingConfig {
                vocab_size: config.vocab_size,
                hidden_dim: config.dim,
            },
            vb.pp("token"),
        )?;
        let positional = PositionalEncoding::new(
            config.positional,
            config.dim,
            config.max_seq_len,
            vb.pp("positional"),
        )?;
        log::debug!(
            "embedding vocab={} dim={} positions={} max_seq_len={}",
            config.vocab_size,
            config.dim,
            config.positional.name(),
            config.max_seq_len
        );
        Ok(Self {
            config,
            token,
            positional,
            dropout,
        })
    }

    pub fn config(&self) -> &TransformerEmbeddingConfig {
        &self.config
    }

    pub fn token(&self) -> &TokenEmbedding {
        &self.token
    }

    pub fn positional(&self) -> &PositionalEncoding {
        &self.positional
    }

    /// The token table, for tying an output projection to it.
    pub fn token_weight(&self) -> &Tensor {
        self.token.weight()
    }

    pub fn forward(&self, token_ids: &Tensor, ctx: &mut ForwardContext) -> Result<Tensor> {
        let tokens = self.token.forward(token_ids)?;
        let (_, seq, _) = tokens.dims3()?;
        let positions = self
            .positional
            .forward(seq)?
            .to_dtype(tokens.dtype())?
            .unsqueeze(0)?;
        let summed = tokens.broadcast_add(&positions)?;
        self.dropout.forward(&summed, ctx)
    }
}
