//! Positional information added to token embeddings.
//!
//! Every scheme produces a `(seq_len, dim)` table that the caller broadcasts
//! over the batch axis.

pub mod absolute;
pub mod fixed;

use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;
use serde::{Deserialize, Serialize};

use crate::errors::EmbeddingError;

pub use absolute::AbsolutePositionalEmbedding;
pub use fixed::FixedPositionalEmbedding;

/// Selects how positions are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionalKind {
    /// Learned table with one row per position.
    #[default]
    Absolute,
    /// Parameter-free sinusoids.
    Fixed,
    /// Axial factorisation; recognised but not implemented.
    Axial,
}

impl PositionalKind {
    pub fn name(&self) -> &'static str {
        match self {
            PositionalKind::Absolute => "absolute",
            PositionalKind::Fixed => "fixed",
            PositionalKind::Axial => "axial",
        }
    }
}

/// A constructed positional scheme.
#[derive(Debug, Clone)]
pub enum PositionalEncoding {
    Absolute(AbsolutePositionalEmbedding),
    Fixed(FixedPositionalEmbedding),
}

impl PositionalEncoding {
    /// Builds the scheme selected by `kind`. Learned tables live under `vb`.
    pub fn new(
        kind: PositionalKind,
        dim: usize,
        max_seq_len: usize,
        vb: VarBuilder,
    ) -> std::result::Result<Self, EmbeddingError> {
        match kind {
            PositionalKind::Absolute => Ok(Self::Absolute(AbsolutePositionalEmbedding::new(
                dim,
                max_seq_len,
                vb,
            )?)),
            PositionalKind::Fixed => Ok(Self::Fixed(FixedPositionalEmbedding::new(
                dim,
                vb.device(),
            )?)),
            PositionalKind::Axial => Err(EmbeddingError::Unimplemented {
                scheme: kind.name(),
            }),
        }
    }

    pub fn kind(&self) -> PositionalKind {
        match self {
            PositionalEncoding::Absolute(_) => PositionalKind::Absolute,
            PositionalEncoding::Fixed(_) => PositionalKind::Fixed,
        }
    }

    /// Returns the `(seq_len, dim)` encoding of positions `0..seq_len`.
    pub fn forward(&self, seq_len: usize) -> Result<Tensor> {
        match self {
            PositionalEncoding::Absolute(inner) => inner.forward(seq_len),
            PositionalEncoding::Fixed(inner) => inner.forward(seq_len),
        }
    }
}
