//! Position-wise feed-forward blocks built on top of projections and activations.
//!
//! MLPs operate on hidden states shaped `(batch, seq, hidden)` and return the
//! same layout. The first projection expands the hidden dimension by
//! `config.mult`, applies the activation and dropout, then the second
//! projection contracts back to the model hidden size followed by dropout.

use candle_core::Result;
use candle_core::Tensor;
use candle_nn::VarBuilder;
use serde::{Deserialize, Serialize};

use crate::{
    activations::ActivationKind,
    checks,
    dropout::{Dropout, ForwardContext},
    linear::{Linear, LinearConfig},
};

fn default_mult() -> usize {
    4
}

/// Configuration for [`FeedForward`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedForwardConfig {
    /// Model hidden size.
    pub hidden_size: usize,
    /// Expansion factor of the inner layer.
    #[serde(default = "default_mult")]
    pub mult: usize,
    /// Activation applied between projections.
    #[serde(default)]
    pub activation: ActivationKind,
    /// Dropout applied after the activation and after the output projection.
    #[serde(default)]
    pub dropout_p: f32,
}

impl FeedForwardConfig {
    /// Standard `dim -> 4*dim -> dim` GELU block.
    pub fn new(hidden_size: usize, dropout_p: f32) -> Self {
        Self {
            hidden_size,
            mult: default_mult(),
            activation: ActivationKind::Gelu,
            dropout_p,
        }
    }

    pub fn intermediate_size(&self) -> usize {
        self.hidden_size * self.mult
    }
}

/// Two-layer feed-forward network applied independently at every position.
#[derive(Debug, Clone)]
pub struct FeedForward {
    config: FeedForwardConfig,
    fc_in: Linear,
    fc_out: Linear,
    dropout: Dropout,
}

impl FeedForward {
    pub fn new(config: FeedForwardConfig, vb: VarBuilder) -> Result<Self> {
        if config.hidden_size == 0 || config.mult == 0 {
            candle_core::bail!("feed-forward requires non-zero hidden_size and mult");
        }
        let dropout = Dropout::new(config.dropout_p)?;
        let inner = config.intermediate_size();
        let fc_in = Linear::new(LinearConfig::new(config.hidden_size, inner), vb.pp("fc_in"))?;
        let fc_out = Linear::new(LinearConfig::new(inner, config.hidden_size), vb.pp("fc_out"))?;
        Ok(Self {
            config,
            fc_in,
            fc_out,
            dropout,
        })
    }

    pub fn config(&self) -> &FeedForwardConfig {
        &self.config
    }

    pub fn forward(&self, hidden: &Tensor, ctx: &mut ForwardContext) -> Result<Tensor> {
        checks::expect_batch_seq_hidden("feed_forward.input", hidden, self.config.hidden_size)?;
        let expanded = self.fc_in.forward(hidden)?;
        let activated = self.config.activation.forward(&expanded)?;
        let activated = self.dropout.forward(&activated, ctx)?;
        let contracted = self.fc_out.forward(&activated)?;
        self.dropout.forward(&contracted, ctx)
    }
}
