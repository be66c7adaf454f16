//! Transformer encoder/decoder stacks and the full models built on them.
//!
//! * [`TransformerLM`]: token ids in, next-token logits out, with causal
//!   self-attention.
//! * [`TransformerEncDec`]: source and target ids in, target-vocabulary
//!   logits out.
//!
//! Parameters are registered through a [`candle_nn::VarBuilder`], so the
//! caller's `VarMap` owns them. Every forward pass takes a
//! [`ForwardContext`](layers::dropout::ForwardContext) selecting evaluation or
//! seeded training mode.

pub mod block;
pub mod config;
pub mod model;
pub mod stack;

pub use block::{DecoderBlock, EncoderBlock};
pub use config::{ModelConfigError, StackConfig, TransformerEncDecConfig, TransformerLMConfig};
pub use model::{padding_mask, TransformerEncDec, TransformerLM};
pub use stack::{Decoder, Encoder};
