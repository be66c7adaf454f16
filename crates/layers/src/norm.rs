//! Layer normalisation over the feature axis.
//!
//! Inputs follow the `(batch, seq, hidden)` convention. Normalisation happens
//! along the last axis while preserving the original layout. Statistics are
//! accumulated in `f32` and the result is cast back to the input dtype.

use candle_core::{DType, Result, Tensor, D};
use candle_nn::{Init, VarBuilder};
use serde::{Deserialize, Serialize};

use crate::checks;

fn default_epsilon() -> f64 {
    1e-5
}

/// Configuration for [`LayerNorm`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormConfig {
    /// Size of the hidden dimension being normalised.
    pub hidden_size: usize,
    /// Numeric stabiliser added to the variance.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

impl NormConfig {
    pub fn new(hidden_size: usize) -> Self {
        Self {
            hidden_size,
            epsilon: default_epsilon(),
        }
    }
}

/// Standard LayerNorm with learnable scale (initialised to one) and bias
/// (initialised to zero).
#[derive(Debug, Clone)]
pub struct LayerNorm {
    config: NormConfig,
    weight: Tensor,
    bias: Tensor,
}

impl LayerNorm {
    /// Allocates scale and bias under `vb`.
    pub fn new(config: NormConfig, vb: VarBuilder) -> Result<Self> {
        let weight = vb.get_with_hints(config.hidden_size, "weight", Init::Const(1.0))?;
        let bias = vb.get_with_hints(config.hidden_size, "bias", Init::Const(0.0))?;
        Self::from_parts(config, weight, bias)
    }

    /// Constructs a LayerNorm from existing scale and bias tensors.
    pub fn from_parts(config: NormConfig, weight: Tensor, bias: Tensor) -> Result<Self> {
        checks::expect_shape("norm.weight", &weight, &[config.hidden_size])?;
        checks::expect_shape("norm.bias", &bias, &[config.hidden_size])?;
        Ok(Self {
            config,
            weight,
            bias,
        })
    }

    pub fn config(&self) -> &NormConfig {
        &self.config
    }

    /// Normalises `hidden` over its last axis.
    pub fn forward(&self, hidden: &Tensor) -> Result<Tensor> {
        checks::expect_batch_seq_hidden("norm.input", hidden, self.config.hidden_size)?;

        let dtype = hidden.dtype();
        let hidden_size = self.config.hidden_size as f64;
        let compute = hidden.to_dtype(DType::F32)?;

        let mean = (compute.sum_keepdim(D::Minus1)? / hidden_size)?;
        let centered = compute.broadcast_sub(&mean)?;
        let variance = (centered.sqr()?.sum_keepdim(D::Minus1)? / hidden_size)?;
        let denom = (variance + self.config.epsilon)?.sqrt()?;
        let normalized = centered.broadcast_div(&denom)?.to_dtype(dtype)?;

        normalized
            .broadcast_mul(&self.weight.to_dtype(dtype)?)?
            .broadcast_add(&self.bias.to_dtype(dtype)?)
    }
}
