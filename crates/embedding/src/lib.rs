//! Token and positional embeddings.
//!
//! [`TransformerEmbedding`] is the entry point used by the models: it looks up
//! token vectors, adds a positional encoding chosen by [`PositionalKind`] and
//! applies dropout.

pub mod errors;
pub mod positional;
pub mod token;
pub mod transformer;

pub use errors::EmbeddingError;
pub use positional::{
    AbsolutePositionalEmbedding, FixedPositionalEmbedding, PositionalEncoding, PositionalKind,
};
pub use token::{TokenEmbedding, TokenEmbeddingConfig};
pub use transformer::{TransformerEmbedding, TransformerEmbeddingConfig};
