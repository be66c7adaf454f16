//! Mask utilities shared by attention implementations.
//!
//! Masks are boolean tensors with dtype [`MASK_DTYPE`]: `1` where attention is
//! permitted and `0` where it is blocked. Sequence masks are `[batch, seq]`;
//! pairwise masks are `[batch, 1, q_len, k_len]` and broadcast over heads.
//! Kernels replace blocked scores with [`MASK_VALUE`] before the softmax and
//! zero the blocked probabilities after it.

pub mod causal;
pub mod padding;

use candle_core::{DType, Device, Tensor};

use crate::core::AttentionError;

/// Dtype shared by all boolean masks.
pub const MASK_DTYPE: DType = DType::U8;

/// Score assigned to blocked positions. Large and negative but finite, so a
/// fully blocked row never produces NaN in the softmax.
pub const MASK_VALUE: f32 = -1e4;

pub use causal::build_causal_mask;
pub use padding::{padding_mask_from_ids, padding_mask_from_lengths};

/// Checks that `mask` is a `[batch, seq]` boolean mask on `device`.
pub fn expect_sequence_mask(
    name: &str,
    mask: &Tensor,
    batch: usize,
    seq: usize,
    device: &Device,
) -> Result<(), AttentionError> {
    if !mask.device().same_device(device) {
        return Err(AttentionError::shape(format!(
            "{name} must reside on the same device as the input"
        )));
    }
    if mask.dtype() != MASK_DTYPE {
        return Err(AttentionError::UnsupportedDType {
            requested: format!("{name} expects dtype {MASK_DTYPE:?}, got {:?}", mask.dtype()),
        });
    }
    if mask.dims() != [batch, seq] {
        return Err(AttentionError::shape(format!(
            "{name} expected [{batch}, {seq}], got {:?}",
            mask.dims()
        )));
    }
    Ok(())
}

/// Outer product of a query mask and a key mask.
///
/// Returns `None` when neither mask is supplied. A missing query mask is
/// treated as all-true, as is a missing key mask. The result is
/// `[batch, 1, q_len, k_len]`.
pub fn combine_masks(
    query_mask: Option<&Tensor>,
    key_mask: Option<&Tensor>,
    batch: usize,
    q_len: usize,
    k_len: usize,
    device: &Device,
) -> Result<Option<Tensor>, AttentionError> {
    if query_mask.is_none() && key_mask.is_none() {
        return Ok(None);
    }
    let query = match query_mask {
        Some(mask) => {
            expect_sequence_mask("query mask", mask, batch, q_len, device)?;
            mask.clone()
        }
        None => Tensor::ones((batch, q_len), MASK_DTYPE, device)?,
    };
    let key = match key_mask {
        Some(mask) => {
            expect_sequence_mask("key mask", mask, batch, k_len, device)?;
            mask.clone()
        }
        None => Tensor::ones((batch, k_len), MASK_DTYPE, device)?,
    };
    let query = query.reshape((batch, 1, q_len, 1))?;
    let key = key.reshape((batch, 1, 1, k_len))?;
    Ok(Some(query.broadcast_mul(&key)?))
}

/// Replaces scores where `mask == 0` with [`MASK_VALUE`].
///
/// `mask` must broadcast to the shape of `scores`.
pub fn apply_mask(scores: &Tensor, mask: &Tensor) -> Result<Tensor, AttentionError> {
    let shape = scores.shape();
    let mask = mask
        .broadcast_as(shape)
        .map_err(|_| {
            AttentionError::shape(format!(
                "mask {:?} does not broadcast to scores {:?}",
                mask.dims(),
                scores.dims()
            ))
        })?
        .contiguous()?;
    let fill = Tensor::new(MASK_VALUE, scores.device())?
        .to_dtype(scores.dtype())?
        .broadcast_as(shape)?
        .contiguous()?;
    Ok(mask.where_cond(scores, &fill)?)
}

#[cfg(test)]
mod tests;
