//! Reference CPU attention kernel.
//!
//! The exact path prioritises numerical fidelity and mirrors the semantics
//! described by the [`AttentionKernel`](crate::core::AttentionKernel) trait.

use std::sync::OnceLock;

use candle_core::{DType, Tensor};
use candle_nn::ops::softmax_last_dim;
use layers::dropout::{Dropout, ForwardContext};

use crate::core::{AttentionError, AttentionKernel, AttentionOutput};
use crate::masks::{apply_mask, build_causal_mask};

/// Numerically stable, portable attention kernel.
#[derive(Debug)]
pub struct ExactAttention {
    dropout: Dropout,
    first_call: OnceLock<()>,
}

impl ExactAttention {
    /// Construct a kernel without attention dropout.
    pub fn new() -> Self {
        Self::with_dropout(Dropout::disabled())
    }

    /// Construct a kernel that drops attention weights with `dropout` while
    /// training.
    pub fn with_dropout(dropout: Dropout) -> Self {
        Self {
            dropout,
            first_call: OnceLock::new(),
        }
    }

    pub fn dropout(&self) -> &Dropout {
        &self.dropout
    }

    fn validate(q: &Tensor, k: &Tensor, v: &Tensor) -> Result<(), AttentionError> {
        let device = q.device();
        if !device.same_device(k.device()) || !device.same_device(v.device()) {
            return Err(AttentionError::shape(
                "q, k, v must reside on the same device",
            ));
        }

        let dtype = q.dtype();
        if dtype != k.dtype() || dtype != v.dtype() {
            return Err(AttentionError::shape("q, k, v must share the same dtype"));
        }
        if !matches!(dtype, DType::F32 | DType::F16 | DType::BF16) {
            return Err(AttentionError::UnsupportedDType {
                requested: format!("{dtype:?}"),
            });
        }

        let (batch, heads, _, head_dim) = q.dims4().map_err(|_| {
            AttentionError::shape("q must have shape [batch, heads, seq_len, head_dim]")
        })?;
        let (kb, kh, k_len, kd) = k.dims4().map_err(|_| {
            AttentionError::shape("k must have shape [batch, heads, seq_len, head_dim]")
        })?;
        let (vb, vh, vk, vd) = v.dims4().map_err(|_| {
            AttentionError::shape("v must have shape [batch, heads, seq_len, head_dim]")
        })?;

        if kb != batch || kh != heads || kd != head_dim {
            return Err(AttentionError::shape(format!(
                "k shape mismatch: expected [{batch}, {heads}, ?, {head_dim}] got [{kb}, {kh}, {k_len}, {kd}]"
            )));
        }
        if vb != batch || vh != heads || vk != k_len || vd != head_dim {
            return Err(AttentionError::shape(format!(
                "v shape mismatch: expected [{batch}, {heads}, {k_len}, {head_dim}] got [{vb}, {vh}, {vk}, {vd}]"
            )));
        }
        Ok(())
    }

    fn validate_mask(
        mask: &Tensor,
        q: &Tensor,
        dims: (usize, usize, usize, usize),
    ) -> Result<(), AttentionError> {
        let (batch, heads, q_len, k_len) = dims;
        if !q.device().same_device(mask.device()) {
            return Err(AttentionError::shape(
                "mask must reside on the same device as q",
            ));
        }
        if mask.dtype() != crate::masks::MASK_DTYPE {
            return Err(AttentionError::UnsupportedDType {
                requested: format!(
                    "mask expects dtype {:?}, got {:?}",
                    crate::masks::MASK_DTYPE,
                    mask.dtype()
                ),
            });
        }
        let (mb, mh, mq, mk) = mask.dims4().map_err(|_| {
            AttentionError::shape("mask must have shape [batch, heads|1, q_len, k_len]")
        })?;
        if mb != batch || mq != q_len || mk != k_len || (mh != 1 && mh != heads) {
            return Err(AttentionError::shape(format!(
                "mask shape mismatch: expected [{batch}, 1|{heads}, {q_len}, {k_len}] got [{mb}, {mh}, {mq}, {mk}]"
            )));
        }
        Ok(())
    }
}

impl Default for ExactAttention {
    fn default() -> Self {
        Self::new()
    }
}

impl AttentionKernel for ExactAttention {
    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
        causal: bool,
        ctx: &mut ForwardContext,
    ) -> Result<AttentionOutput, AttentionError> {
        Self::validate(q, k, v)?;
        let (batch, heads, q_len, head_dim) = q.dims4()?;
        let k_len = k.dim(2)?;

        if self.first_call.set(()).is_ok() {
            log::info!(
                "attention::reference init heads={} head_dim={} causal={} dropout={} training={}",
                heads,
                head_dim,
                causal,
                self.dropout.probability(),
                ctx.is_training()
            );
        }

        let dtype = q.dtype();
        let merged = batch * heads;
        let q_work = q.to_dtype(DType::F32)?.reshape((merged, q_len, head_dim))?;
        let k_work = k.to_dtype(DType::F32)?.reshape((merged, k_len, head_dim))?;
        let v_work = v.to_dtype(DType::F32)?.reshape((merged, k_len, head_dim))?;

        let scale = (head_dim as f64).powf(-0.5);
        let scores = q_work
            .matmul(&k_work.t()?.contiguous()?)?
            .affine(scale, 0.0)?
            .reshape((batch, heads, q_len, k_len))?;

        if let Some(mask) = mask {
            Self::validate_mask(mask, q, (batch, heads, q_len, k_len))?;
        }
        let causal_mask = if causal {
            Some(build_causal_mask(q.device(), q_len, k_len)?)
        } else {
            None
        };
        let allowed = match (mask, causal_mask) {
            (Some(mask), Some(causal_mask)) => Some(mask.broadcast_mul(&causal_mask)?),
            (Some(mask), None) => Some(mask.clone()),
            (None, causal_mask) => causal_mask,
        };

        let weights = match &allowed {
            Some(allowed) => {
                let scores = apply_mask(&scores, allowed)?;
                // Blocked entries are exactly zero, so a row with no visible
                // key has zero weights and a zero output.
                softmax_last_dim(&scores.contiguous()?)?
                    .broadcast_mul(&allowed.to_dtype(DType::F32)?)?
            }
            None => softmax_last_dim(&scores.contiguous()?)?,
        };
        let dropped = self.dropout.forward(&weights, ctx)?;

        let output = dropped
            .reshape((merged, q_len, k_len))?
            .matmul(&v_work)?
            .reshape((batch, heads, q_len, head_dim))?
            .to_dtype(dtype)?;

        Ok(AttentionOutput { output, weights })
    }
}

/// Straight-line attention used as ground truth in tests.
#[cfg(test)]
pub(crate) fn naive_attention(
    q: &Tensor,
    k: &Tensor,
    v: &Tensor,
    allowed: impl Fn(usize, usize, usize) -> bool,
) -> candle_core::Result<Tensor> {
    let (batch, heads, q_len, head_dim) = q.dims4()?;
    let (_, _, k_len, _) = k.dims4()?;
    let mut output = vec![0f32; batch * heads * q_len * head_dim];

    let q_vec = q.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
    let k_vec = k.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
    let v_vec = v.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
    let scale = 1.0 / (head_dim as f32).sqrt();

    for b in 0..batch {
        for h in 0..heads {
            for q_idx in 0..q_len {
                let mut row = vec![f32::NEG_INFINITY; k_len];
                let mut max_val = f32::NEG_INFINITY;
                for (k_idx, slot) in row.iter_mut().enumerate() {
                    if !allowed(b, q_idx, k_idx) {
                        continue;
                    }
                    let mut dot = 0f32;
                    for d in 0..head_dim {
                        let qi = ((b * heads + h) * q_len + q_idx) * head_dim + d;
                        let ki = ((b * heads + h) * k_len + k_idx) * head_dim + d;
                        dot += q_vec[qi] * k_vec[ki];
                    }
                    *slot = dot * scale;
                    max_val = max_val.max(*slot);
                }
                let mut denom = 0f32;
                for val in row.iter_mut() {
                    *val = if val.is_finite() {
                        (*val - max_val).exp()
                    } else {
                        0.0
                    };
                    denom += *val;
                }
                if denom == 0.0 {
                    continue;
                }
                for d in 0..head_dim {
                    let mut acc = 0f32;
                    for (k_idx, weight) in row.iter().enumerate() {
                        let vi = ((b * heads + h) * k_len + k_idx) * head_dim + d;
                        acc += weight / denom * v_vec[vi];
                    }
                    let oi = ((b * heads + h) * q_len + q_idx) * head_dim + d;
                    output[oi] = acc;
                }
            }
        }
    }

    Tensor::from_vec(output, (batch, heads, q_len, head_dim), q.device())
}
