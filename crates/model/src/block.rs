//! Encoder and decoder blocks.
//!
//! A block owns its attention and feed-forward sub-layers and runs them in a
//! fixed order, each wrapped in a residual connection with LayerNorm placed
//! according to [`NormPlacement`](layers::residual::NormPlacement).

use attention::MultiHeadAttention;
use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;
use layers::{dropout::ForwardContext, mlp::FeedForward, residual::Sublayer};

use crate::config::StackConfig;

/// Self-attention followed by a feed-forward network.
#[derive(Debug)]
pub struct EncoderBlock {
    attn: MultiHeadAttention,
    attn_sublayer: Sublayer,
    ff: FeedForward,
    ff_sublayer: Sublayer,
}

impl EncoderBlock {
    /// Builds a block whose self-attention is causal when `config.causal` is set.
    pub fn new(config: &StackConfig, vb: VarBuilder) -> Result<Self> {
        let attn_vb = vb.pp("attn");
        let ff_vb = vb.pp("ff");
        Ok(Self {
            attn: MultiHeadAttention::new(config.attention(config.causal), attn_vb.clone())?,
            attn_sublayer: Sublayer::new(config.norm_placement, config.dim, attn_vb)?,
            ff: FeedForward::new(config.feed_forward(), ff_vb.clone())?,
            ff_sublayer: Sublayer::new(config.norm_placement, config.dim, ff_vb)?,
        })
    }

    pub fn attention(&self) -> &MultiHeadAttention {
        &self.attn
    }

    pub fn forward(
        &self,
        x: &Tensor,
        mask: Option<&Tensor>,
        ctx: &mut ForwardContext,
    ) -> Result<Tensor> {
        let x = self.attn_sublayer.forward(x, |h| {
            self.attn
                .forward(h, None, mask, None, ctx)
                .map_err(Into::into)
        })?;
        self.ff_sublayer.forward(&x, |h| self.ff.forward(h, ctx))
    }
}

/// Causal self-attention, cross-attention over the encoder output, then a
/// feed-forward network.
#[derive(Debug)]
pub struct DecoderBlock {
    self_attn: MultiHeadAttention,
    self_attn_sublayer: Sublayer,
    cross_attn: MultiHeadAttention,
    cross_attn_sublayer: Sublayer,
    ff: FeedForward,
    ff_sublayer: Sublayer,
}

impl DecoderBlock {
    pub fn new(config: &StackConfig, vb: VarBuilder) -> Result<Self> {
        let self_vb = vb.pp("self_attn");
        let cross_vb = vb.pp("cross_attn");
        let ff_vb = vb.pp("ff");
        Ok(Self {
            self_attn: MultiHeadAttention::new(config.attention(true), self_vb.clone())?,
            self_attn_sublayer: Sublayer::new(config.norm_placement, config.dim, self_vb)?,
            cross_attn: MultiHeadAttention::new(config.attention(false), cross_vb.clone())?,
            cross_attn_sublayer: Sublayer::new(config.norm_placement, config.dim, cross_vb)?,
            ff: FeedForward::new(config.feed_forward(), ff_vb.clone())?,
            ff_sublayer: Sublayer::new(config.norm_placement, config.dim, ff_vb)?,
        })
    }

    pub fn self_attention(&self) -> &MultiHeadAttention {
        &self.self_attn
    }

    pub fn cross_attention(&self) -> &MultiHeadAttention {
        &self.cross_attn
    }

    /// `mask` covers the decoder positions, `context_mask` the encoder
    /// positions in `context`.
    pub fn forward(
        &self,
        x: &Tensor,
        context: &Tensor,
        mask: Option<&Tensor>,
        context_mask: Option<&Tensor>,
        ctx: &mut ForwardContext,
    ) -> Result<Tensor> {
        let x = self.self_attn_sublayer.forward(x, |h| {
            self.self_attn
                .forward(h, None, mask, None, ctx)
                .map_err(Into::into)
        })?;
        let x = self.cross_attn_sublayer.forward(&x, |h| {
            self.cross_attn
                .forward(h, Some(context), mask, context_mask, ctx)
                .map_err(Into::into)
        })?;
        self.ff_sublayer.forward(&x, |h| self.ff.forward(h, ctx))
    }
}
