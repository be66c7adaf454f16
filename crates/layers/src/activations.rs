//! Activation catalogue for transformer feed-forward stacks.
//!
//! Activations consume tensors of any layout and return tensors with identical
//! shape.
//!
//! # Built-in formulas
//!
//! * **GELU** uses the erf form `0.5 * x * (1 + erf(x / sqrt(2)))`.
//! * **SiLU / Swish** computes `x * sigmoid(x)` via the fused kernel exposed by
//!   Candle.
//! * **ReLU** zeroes negative values.

use candle_core::{Result, Tensor};
use serde::{Deserialize, Serialize};

/// Non-linearity applied between the two feed-forward projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationKind {
    /// Identity function, useful for debugging or wiring custom stacks.
    Identity,
    /// Exact (erf based) GELU.
    #[default]
    Gelu,
    /// Standard SiLU (a.k.a. swish) activation.
    Silu,
    /// Rectified linear unit.
    Relu,
}

impl ActivationKind {
    /// Applies the activation element-wise.
    pub fn forward(&self, input: &Tensor) -> Result<Tensor> {
        match self {
            ActivationKind::Identity => Ok(input.clone()),
            ActivationKind::Gelu => input.gelu_erf(),
            ActivationKind::Silu => input.silu(),
            ActivationKind::Relu => input.relu(),
        }
    }
}
