//! Multi-head attention module with learned projections.
//!
//! Hidden states are `[batch, seq, dim]`. Queries come from `x`; keys and
//! values come from `context` when given (cross-attention) and from `x`
//! otherwise (self-attention). The score computation is delegated to an
//! [`AttentionKernel`], [`ExactAttention`] by default.

use candle_core::{Tensor, D};
use candle_nn::VarBuilder;
use layers::{
    dropout::{Dropout, ForwardContext},
    linear::{Linear, LinearConfig},
};

use crate::core::{AttentionConfig, AttentionError, AttentionKernel, AttentionOutput};
use crate::masks::combine_masks;
use crate::reference::ExactAttention;

/// Multi-head scaled dot-product attention.
///
/// Parameters live under `to_q`, `to_kv` and `to_out` in the supplied
/// [`VarBuilder`]. `to_q` and `to_kv` carry no bias; `to_out` does.
#[derive(Debug)]
pub struct MultiHeadAttention<K = ExactAttention> {
    config: AttentionConfig,
    to_q: Linear,
    to_kv: Linear,
    to_out: Linear,
    kernel: K,
}

impl MultiHeadAttention<ExactAttention> {
    pub fn new(config: AttentionConfig, vb: VarBuilder) -> Result<Self, AttentionError> {
        config.validate()?;
        let kernel = ExactAttention::with_dropout(Dropout::new(config.dropout_p)?);
        Self::with_kernel(config, kernel, vb)
    }
}

impl<K: AttentionKernel> MultiHeadAttention<K> {
    /// Builds the projections around a caller-supplied kernel.
    pub fn with_kernel(
        config: AttentionConfig,
        kernel: K,
        vb: VarBuilder,
    ) -> Result<Self, AttentionError> {
        config.validate()?;
        let dim = config.dim;
        let to_q = Linear::new(LinearConfig::no_bias(dim, dim), vb.pp("to_q"))?;
        let to_kv = Linear::new(LinearConfig::no_bias(dim, 2 * dim), vb.pp("to_kv"))?;
        let to_out = Linear::new(LinearConfig::new(dim, dim), vb.pp("to_out"))?;
        log::debug!(
            "multi-head attention dim={} heads={} causal={} dropout={}",
            config.dim,
            config.heads,
            config.causal,
            config.dropout_p
        );
        Ok(Self {
            config,
            to_q,
            to_kv,
            to_out,
            kernel,
        })
    }

    pub fn config(&self) -> &AttentionConfig {
        &self.config
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Attends from `x` over `context` (or `x` itself) and returns
    /// `[batch, seq_i, dim]`.
    ///
    /// `mask` is the `[batch, seq_i]` query mask. `context_mask` is the
    /// `[batch, seq_j]` key mask and is only consulted for cross-attention;
    /// self-attention reuses `mask` for the keys.
    pub fn forward(
        &self,
        x: &Tensor,
        context: Option<&Tensor>,
        mask: Option<&Tensor>,
        context_mask: Option<&Tensor>,
        ctx: &mut ForwardContext,
    ) -> Result<Tensor, AttentionError> {
        self.forward_with_weights(x, context, mask, context_mask, ctx)
            .map(|out| out.output)
    }

    /// Like [`forward`](Self::forward) but also returns the attention
    /// probabilities `[batch, heads, seq_i, seq_j]` taken before dropout.
    pub fn forward_with_weights(
        &self,
        x: &Tensor,
        context: Option<&Tensor>,
        mask: Option<&Tensor>,
        context_mask: Option<&Tensor>,
        ctx: &mut ForwardContext,
    ) -> Result<AttentionOutput, AttentionError> {
        let (batch, q_len) = self.expect_hidden("attention.input", x)?;
        let source = match context {
            Some(context) => {
                let (context_batch, _) = self.expect_hidden("attention.context", context)?;
                if context_batch != batch {
                    return Err(AttentionError::shape(format!(
                        "attention.context batch {context_batch} does not match input batch {batch}"
                    )));
                }
                context
            }
            None => x,
        };
        let k_len = source.dim(1)?;

        let key_mask = if context.is_some() { context_mask } else { mask };
        let mask = combine_masks(mask, key_mask, batch, q_len, k_len, x.device())?;

        let q = self.split_heads(&self.to_q.forward(x)?)?;
        let kv = self.to_kv.forward(source)?.chunk(2, D::Minus1)?;
        let k = self.split_heads(&kv[0])?;
        let v = self.split_heads(&kv[1])?;

        let attended = self
            .kernel
            .attend(&q, &k, &v, mask.as_ref(), self.config.causal, ctx)?;
        let merged = self.merge_heads(&attended.output)?;
        Ok(AttentionOutput {
            output: self.to_out.forward(&merged)?,
            weights: attended.weights,
        })
    }

    fn expect_hidden(&self, name: &str, tensor: &Tensor) -> Result<(usize, usize), AttentionError> {
        match tensor.dims() {
            [batch, seq, dim] if *dim == self.config.dim => Ok((*batch, *seq)),
            dims => Err(AttentionError::shape(format!(
                "{name} expected [batch, seq, {}] got {dims:?}",
                self.config.dim
            ))),
        }
    }

    /// `[batch, seq, dim]` -> `[batch, heads, seq, head_dim]`.
    fn split_heads(&self, tensor: &Tensor) -> candle_core::Result<Tensor> {
        let (batch, seq, _) = tensor.dims3()?;
        tensor
            .reshape((batch, seq, self.config.heads, self.config.head_dim()))?
            .permute((0, 2, 1, 3))?
            .contiguous()
    }

    /// `[batch, heads, seq, head_dim]` -> `[batch, seq, dim]`.
    fn merge_heads(&self, tensor: &Tensor) -> candle_core::Result<Tensor> {
        let (batch, _, seq, _) = tensor.dims4()?;
        tensor
            .permute((0, 2, 1, 3))?
            .reshape((batch, seq, self.config.dim))
    }
}
