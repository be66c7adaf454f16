//! Builders for causal attention masks.
//!
//! The resulting tensors have dtype [`MASK_DTYPE`](super::MASK_DTYPE) and shape
//! `[q_len, k_len]`. Entries are `1` where attention is permitted and `0`
//! otherwise.

use candle_core::{Device, Result, Tensor};

/// Construct a causal mask for the supplied sequence dimensions.
///
/// Queries align with the most recent `q_len` keys: key `k` is visible to
/// query `q` iff `k <= q + (k_len - q_len)`. The offset is signed, so when
/// `q_len > k_len` the leading query rows are blocked entirely.
pub fn build_causal_mask(device: &Device, q_len: usize, k_len: usize) -> Result<Tensor> {
    let offset = k_len as i64 - q_len as i64;
    let data: Vec<u8> = (0..q_len as i64)
        .flat_map(|q| (0..k_len as i64).map(move |k| u8::from(k <= q + offset)))
        .collect();
    Tensor::from_vec(data, (q_len, k_len), device)
}
