//! Dropout and the per-call forward context that owns its randomness.
//!
//! Every forward pass receives a [`ForwardContext`]. In evaluation mode dropout
//! is the identity. In training mode the context carries a seeded
//! [`StdRng`], so two passes started from the same seed draw the same masks.

use candle_core::{DType, Result, Tensor};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::checks;

/// Mode and random state for one forward pass.
#[derive(Debug)]
pub struct ForwardContext {
    rng: Option<StdRng>,
}

impl ForwardContext {
    /// Inference mode: dropout disabled, fully deterministic.
    pub fn eval() -> Self {
        Self { rng: None }
    }

    /// Training mode with dropout masks drawn from a generator seeded by `seed`.
    pub fn train(seed: u64) -> Self {
        Self {
            rng: Some(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn is_training(&self) -> bool {
        self.rng.is_some()
    }

    /// Inverted-dropout mask: `1 / keep_prob` where kept, `0` where dropped.
    /// Returns `None` in evaluation mode.
    fn keep_mask(&mut self, tensor: &Tensor, keep_prob: f32) -> Result<Option<Tensor>> {
        let Some(rng) = self.rng.as_mut() else {
            return Ok(None);
        };
        let scale = 1.0 / keep_prob;
        let data: Vec<f32> = (0..tensor.elem_count())
            .map(|_| if rng.gen::<f32>() < keep_prob { scale } else { 0.0 })
            .collect();
        let mask = Tensor::from_vec(data, tensor.dims(), tensor.device())?;
        if tensor.dtype() == DType::F32 {
            Ok(Some(mask))
        } else {
            Ok(Some(mask.to_dtype(tensor.dtype())?))
        }
    }
}

impl Default for ForwardContext {
    fn default() -> Self {
        Self::eval()
    }
}

/// Stochastic zeroing with rescaling of the survivors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dropout {
    p: f32,
}

impl Dropout {
    /// Creates a dropout layer; `p` must lie in `[0, 1)`.
    pub fn new(p: f32) -> Result<Self> {
        checks::expect_probability("dropout probability", p)?;
        Ok(Self { p })
    }

    /// A dropout layer that never drops.
    pub fn disabled() -> Self {
        Self { p: 0.0 }
    }

    pub fn probability(&self) -> f32 {
        self.p
    }

    pub fn forward(&self, input: &Tensor, ctx: &mut ForwardContext) -> Result<Tensor> {
        if self.p == 0.0 {
            return Ok(input.clone());
        }
        match ctx.keep_mask(input, 1.0 - self.p)? {
            Some(mask) => input.mul(&mask),
            None => Ok(input.clone()),
        }
    }
}

impl Default for Dropout {
    fn default() -> Self {
        Self::disabled()
    }
}
