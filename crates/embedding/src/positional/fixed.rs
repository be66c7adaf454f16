//! Sinusoidal positional encodings.
//!
//! For position `t` and frequency `f_i = 10000^(-2i/dim)` the encoding is
//! `[sin(t * f_0), .., sin(t * f_{dim/2-1}), cos(t * f_0), .., cos(t * f_{dim/2-1})]`.

use candle_core::{DType, Device, Result, Tensor};

use crate::errors::EmbeddingError;

const BASE: f64 = 10_000.0;

/// Parameter-free sinusoidal table.
#[derive(Debug, Clone)]
pub struct FixedPositionalEmbedding {
    dim: usize,
    inv_freq: Tensor,
}

impl FixedPositionalEmbedding {
    pub fn new(dim: usize, device: &Device) -> std::result::Result<Self, EmbeddingError> {
        if dim == 0 || dim % 2 != 0 {
            return Err(EmbeddingError::InvalidConfig {
                reason: format!("fixed positions need an even, non-zero dim, got {dim}"),
            });
        }
        let half_dim = dim / 2;
        let inv_freqs: Vec<f32> = (0..half_dim)
            .map(|idx| {
                let exponent = (2 * idx) as f64 / dim as f64;
                BASE.powf(-exponent) as f32
            })
            .collect();
        let inv_freq = Tensor::from_vec(inv_freqs, (1, half_dim), device)?;
        Ok(Self { dim, inv_freq })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn forward(&self, seq_len: usize) -> Result<Tensor> {
        let positions = Tensor::arange(0u32, seq_len as u32, self.inv_freq.device())?
            .to_dtype(DType::F32)?
            .reshape((seq_len, 1))?;
        let angles = positions.broadcast_mul(&self.inv_freq)?;
        Tensor::cat(&[&angles.sin()?, &angles.cos()?], 1)
    }
}
