//! Core traits and types shared across attention implementations.
//!
//! Kernels operate on tensors with layout `[batch, n_heads, seq_len, head_dim]`.
//! The output tensor mirrors the query layout, and scores are accumulated in
//! `f32` regardless of the incoming dtype (`bf16`, `f16`, or `f32`).

pub mod config;
pub mod errors;

use candle_core::Tensor;
use layers::dropout::ForwardContext;

pub use config::AttentionConfig;
pub use errors::AttentionError;

/// Attended values together with the attention probabilities that produced
/// them.
#[derive(Debug, Clone)]
pub struct AttentionOutput {
    /// `[batch, n_heads, q_len, head_dim]`, same dtype as the queries.
    pub output: Tensor,
    /// Softmax probabilities `[batch, n_heads, q_len, k_len]` in `f32`, taken
    /// before dropout.
    pub weights: Tensor,
}

/// Unified interface for attention kernels.
///
/// * `q` is `[batch, n_heads, q_len, head_dim]`; `k` and `v` are
///   `[batch, n_heads, k_len, head_dim]`.
/// * `mask`, when present, is a boolean (`u8`, `1` = attend) tensor shaped
///   `[batch, 1 or n_heads, q_len, k_len]`.
/// * `causal` additionally blocks keys after each query's aligned position.
/// * Dropout on the attention weights draws from `ctx`.
pub trait AttentionKernel: Send + Sync {
    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
        causal: bool,
        ctx: &mut ForwardContext,
    ) -> Result<AttentionOutput, AttentionError>;
}
