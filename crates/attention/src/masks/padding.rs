//! Builders for padding masks used to drop padded positions.
//!
//! All padding masks are `[batch, seq]` with dtype
//! [`MASK_DTYPE`](super::MASK_DTYPE): `1` for real tokens, `0` for padding.

use candle_core::{DType, Device, Error, Result, Tensor};

/// Marks every position whose id differs from `pad_idx`.
pub fn padding_mask_from_ids(ids: &Tensor, pad_idx: u32) -> Result<Tensor> {
    if !matches!(ids.dtype(), DType::U8 | DType::U32 | DType::I64) {
        return Err(Error::Msg(format!(
            "padding mask expects integer ids, got {:?}",
            ids.dtype()
        )));
    }
    if ids.dtype() == DType::U8 && pad_idx > u32::from(u8::MAX) {
        return Err(Error::Msg(format!(
            "pad_idx {pad_idx} does not fit the U8 ids it should mask"
        )));
    }
    let pad = Tensor::new(pad_idx, ids.device())?
        .to_dtype(ids.dtype())?
        .broadcast_as(ids.shape())?;
    ids.ne(&pad)
}

/// Marks the first `lengths[b]` positions of each row (clamped to `seq`).
pub fn padding_mask_from_lengths(device: &Device, lengths: &[usize], seq: usize) -> Result<Tensor> {
    let data: Vec<u8> = lengths
        .iter()
        .flat_map(|&valid| {
            let valid = valid.min(seq);
            (0..seq).map(move |pos| u8::from(pos < valid))
        })
        .collect();
    Tensor::from_vec(data, (lengths.len(), seq), device)
}
