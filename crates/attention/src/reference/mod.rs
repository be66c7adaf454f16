//! Portable, exact implementations of scaled dot-product attention.
//!
//! These paths favour clarity over absolute performance and serve as the
//! baseline every other kernel is validated against.

pub mod exact;

pub use exact::ExactAttention;
