//! Multi-head scaled dot-product attention for the transformer project.
//!
//! The crate is split into three layers:
//!
//! * [`masks`] builds boolean causal and padding masks and combines query and
//!   key masks into pairwise `[batch, 1, q_len, k_len]` masks.
//! * [`core::AttentionKernel`] is the seam for the score/mask/softmax/value
//!   computation over `[batch, n_heads, seq_len, head_dim]` tensors;
//!   [`reference::ExactAttention`] is the portable implementation.
//! * [`MultiHeadAttention`] owns the query, key/value and output projections
//!   and handles self- and cross-attention over `[batch, seq, dim]` hidden
//!   states.
//!
//! Dropout on attention weights is a train-only concern: it draws from the
//! [`ForwardContext`](layers::dropout::ForwardContext) passed to each call and
//! is the identity in evaluation mode.

pub mod core;
pub mod masks;
pub mod multihead;
pub mod reference;

pub use core::{AttentionConfig, AttentionError, AttentionKernel, AttentionOutput};
pub use masks::{MASK_DTYPE, MASK_VALUE};
pub use multihead::MultiHeadAttention;
pub use reference::ExactAttention;
