//! Token embedding table.

use candle_core::{bail, DType, Error, Result, Tensor};
use candle_nn::{Init, VarBuilder};
use serde::{Deserialize, Serialize};

/// Standard deviation of the normal initialiser shared by embedding tables.
pub const EMBEDDING_INIT_STD: f64 = 0.02;

/// Configuration for building a token embedding table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEmbeddingConfig {
    /// Size of the vocabulary (number of distinct tokens).
    pub vocab_size: usize,
    /// Dimensionality of each embedding vector.
    pub hidden_dim: usize,
}

/// Learnable token embedding table of shape `(vocab_size, hidden_dim)`.
#[derive(Debug, Clone)]
pub struct TokenEmbedding {
    config: TokenEmbeddingConfig,
    weight: Tensor,
}

impl TokenEmbedding {
    /// Allocates the table under `vb` and samples it from `N(0, 0.02)`.
    pub fn new(config: TokenEmbeddingConfig, vb: VarBuilder) -> Result<Self> {
        if config.vocab_size == 0 {
            bail!("token embedding requires vocab_size > 0");
        }
        if config.hidden_dim == 0 {
            bail!("token embedding requires hidden_dim > 0");
        }
        let weight = vb.get_with_hints(
            (config.vocab_size, config.hidden_dim),
            "weight",
            Init::Randn {
                mean: 0.0,
                stdev: EMBEDDING_INIT_STD,
            },
        )?;
        Ok(Self { config, weight })
    }

    /// Returns the embedding configuration.
    pub fn config(&self) -> &TokenEmbeddingConfig {
        &self.config
    }

    /// Returns the table itself. The handle shares storage with the
    /// registered variable, so a projection built from it stays tied.
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Looks up embeddings for the provided token ids.
    ///
    /// Inputs must be shaped `(batch, seq)` with an integer dtype. Outputs follow the
    /// `(batch, seq, hidden)` layout.
    pub fn forward(&self, token_ids: &Tensor) -> Result<Tensor> {
        validate_token_ids(token_ids)?;
        let (batch, seq) = token_ids.dims2()?;

        let flat = token_ids.to_dtype(DType::I64)?.flatten_all()?;
        self.ensure_id_range(&flat)?;

        let gathered = self.weight.index_select(&flat.to_dtype(DType::U32)?, 0)?;
        gathered.reshape((batch, seq, self.config.hidden_dim))
    }

    fn ensure_id_range(&self, flat_ids: &Tensor) -> Result<()> {
        let min_id = flat_ids.min_all()?.to_scalar::<i64>()?;
        if min_id < 0 {
            return Err(Error::Msg(format!(
                "encountered negative token id {min_id} (minimum)"
            )));
        }

        let max_id = flat_ids.max_all()?.to_scalar::<i64>()?;
        let vocab = self.config.vocab_size as i64;
        if max_id >= vocab {
            return Err(Error::Msg(format!(
                "token id {max_id} exceeds vocab size {vocab}"
            )));
        }
        Ok(())
    }
}

/// Checks the `(batch, seq)` integer-id convention.
pub fn validate_token_ids(token_ids: &Tensor) -> Result<()> {
    match token_ids.dims() {
        [batch, seq] => {
            if *batch == 0 || *seq == 0 {
                return Err(Error::Msg(
                    "token_ids must have non-zero batch and seq dimensions".into(),
                ));
            }
        }
        dims => {
            return Err(Error::Msg(format!(
                "token_ids must be shaped [batch, seq], got {dims:?}"
            )))
        }
    }

    if token_ids.dtype().is_int() {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "token_ids expected integer dtype but received {:?}",
            token_ids.dtype()
        )))
    }
}
