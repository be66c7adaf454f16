//! Building blocks for transformer layers.
//!
//! Dense projections, layer normalisation, activations, dropout with an
//! explicit [`ForwardContext`], the position-wise feed-forward block and the
//! residual/normalisation wrappers that encoder and decoder blocks are
//! assembled from.

pub mod activations;
pub mod checks;
pub mod dropout;
pub mod linear;
pub mod mlp;
pub mod norm;
pub mod residual;

pub use activations::ActivationKind;
pub use dropout::{Dropout, ForwardContext};
pub use linear::{Linear, LinearConfig};
pub use mlp::{FeedForward, FeedForwardConfig};
pub use norm::{LayerNorm, NormConfig};
pub use residual::{NormPlacement, PostNorm, PreNorm, Residual, Sublayer};
