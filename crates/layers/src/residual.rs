//! Residual connections and normalisation placement wrappers.
//!
//! Wrappers take the wrapped computation as a closure so a block can route
//! extra arguments (masks, encoder context, the forward context) into its
//! sub-layer without the wrapper knowing about them:
//!
//! * [`Residual`] computes `f(x) + x`.
//! * [`PreNorm`] computes `f(norm(x))`.
//! * [`PostNorm`] computes `norm(f(x))`.
//!
//! [`Sublayer`] wraps a computation in the norm wrapper selected by
//! [`NormPlacement`] and adds the residual around it, which is how encoder
//! and decoder blocks are assembled.

use candle_core::{Error, Result, Tensor};
use candle_nn::VarBuilder;
use serde::{Deserialize, Serialize};

use crate::norm::{LayerNorm, NormConfig};

/// Adds the wrapped computation's output back onto its input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Residual;

impl Residual {
    /// Sums two tensors of identical shape.
    pub fn add(&self, branch: &Tensor, residual: &Tensor) -> Result<Tensor> {
        if branch.dims() != residual.dims() {
            return Err(Error::Msg(format!(
                "residual: branch shape {:?} does not match input shape {:?}",
                branch.dims(),
                residual.dims()
            )));
        }
        branch.add(residual)
    }

    pub fn apply<F>(&self, x: &Tensor, f: F) -> Result<Tensor>
    where
        F: FnOnce(&Tensor) -> Result<Tensor>,
    {
        let branch = f(x)?;
        self.add(&branch, x)
    }
}

/// Normalises the input before handing it to the wrapped computation.
#[derive(Debug, Clone)]
pub struct PreNorm {
    norm: LayerNorm,
}

impl PreNorm {
    pub fn new(hidden_size: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            norm: LayerNorm::new(NormConfig::new(hidden_size), vb.pp("norm"))?,
        })
    }

    pub fn norm(&self) -> &LayerNorm {
        &self.norm
    }

    pub fn apply<F>(&self, x: &Tensor, f: F) -> Result<Tensor>
    where
        F: FnOnce(&Tensor) -> Result<Tensor>,
    {
        f(&self.norm.forward(x)?)
    }
}

/// Normalises the wrapped computation's output.
#[derive(Debug, Clone)]
pub struct PostNorm {
    norm: LayerNorm,
}

impl PostNorm {
    pub fn new(hidden_size: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            norm: LayerNorm::new(NormConfig::new(hidden_size), vb.pp("norm"))?,
        })
    }

    pub fn norm(&self) -> &LayerNorm {
        &self.norm
    }

    pub fn apply<F>(&self, x: &Tensor, f: F) -> Result<Tensor>
    where
        F: FnOnce(&Tensor) -> Result<Tensor>,
    {
        self.norm.forward(&f(x)?)
    }
}

/// Where LayerNorm sits relative to a residual branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormPlacement {
    /// `x + f(norm(x))`
    #[default]
    Pre,
    /// `x + norm(f(x))`
    Post,
}

#[derive(Debug, Clone)]
enum NormWrap {
    Pre(PreNorm),
    Post(PostNorm),
}

/// A residual branch with its normalisation, in either placement.
#[derive(Debug, Clone)]
pub struct Sublayer {
    wrap: NormWrap,
    residual: Residual,
}

impl Sublayer {
    pub fn new(placement: NormPlacement, hidden_size: usize, vb: VarBuilder) -> Result<Self> {
        let wrap = match placement {
            NormPlacement::Pre => NormWrap::Pre(PreNorm::new(hidden_size, vb)?),
            NormPlacement::Post => NormWrap::Post(PostNorm::new(hidden_size, vb)?),
        };
        Ok(Self {
            wrap,
            residual: Residual,
        })
    }

    pub fn placement(&self) -> NormPlacement {
        match self.wrap {
            NormWrap::Pre(_) => NormPlacement::Pre,
            NormWrap::Post(_) => NormPlacement::Post,
        }
    }

    /// `x + wrap(f)(x)`: pre placement yields `x + f(norm(x))`, post
    /// placement yields `x + norm(f(x))`.
    pub fn forward<F>(&self, x: &Tensor, f: F) -> Result<Tensor>
    where
        F: FnOnce(&Tensor) -> Result<Tensor>,
    {
        match &self.wrap {
            NormWrap::Pre(pre) => self.residual.apply(x, |h| pre.apply(h, f)),
            NormWrap::Post(post) => self.residual.apply(x, |h| post.apply(h, f)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn max_diff(a: &Tensor, b: &Tensor) -> Result<f32> {
        a.sub(b)?.abs()?.max_all()?.to_vec0::<f32>()
    }

    #[test]
    fn residual_adds_branch_to_input() -> Result<()> {
        let device = Device::Cpu;
        let x = Tensor::randn(0f32, 1.0, (2, 3, 4), &device)?;
        let out = Residual.apply(&x, |h| h.affine(2.0, 1.0))?;
        let expected = x.affine(3.0, 1.0)?;
        assert!(max_diff(&out, &expected)? < 1e-6);
        Ok(())
    }

    #[test]
    fn residual_rejects_shape_changes() -> Result<()> {
        let device = Device::Cpu;
        let x = Tensor::zeros((1, 2, 4), DType::F32, &device)?;
        assert!(Residual.apply(&x, |h| h.narrow(1, 0, 1)).is_err());
        Ok(())
    }

    #[test]
    fn prenorm_normalises_before_the_branch() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let pre = PreNorm::new(4, VarBuilder::from_varmap(&varmap, DType::F32, &device))?;
        let x = Tensor::randn(5f32, 3.0, (1, 2, 4), &device)?;
        let out = pre.apply(&x, |h| Ok(h.clone()))?;
        assert!(max_diff(&out, &pre.norm().forward(&x)?)? < 1e-6);
        assert!(varmap.data().lock().unwrap().contains_key("norm.weight"));
        Ok(())
    }

    #[test]
    fn postnorm_normalises_after_the_branch() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let post = PostNorm::new(4, VarBuilder::from_varmap(&varmap, DType::F32, &device))?;
        let x = Tensor::randn(0f32, 1.0, (1, 2, 4), &device)?;
        let out = post.apply(&x, |h| h.affine(4.0, 2.0))?;
        let expected = post.norm().forward(&x.affine(4.0, 2.0)?)?;
        assert!(max_diff(&out, &expected)? < 1e-6);
        Ok(())
    }

    #[test]
    fn sublayer_placements_compose_in_order() -> Result<()> {
        let device = Device::Cpu;
        let x = Tensor::randn(1f32, 2.0, (2, 3, 8), &device)?;
        let branch = |h: &Tensor| h.affine(0.5, 0.0);

        let varmap = VarMap::new();
        let pre = Sublayer::new(
            NormPlacement::Pre,
            8,
            VarBuilder::from_varmap(&varmap, DType::F32, &device),
        )?;
        assert_eq!(pre.placement(), NormPlacement::Pre);
        let norm = LayerNorm::new(
            NormConfig::new(8),
            VarBuilder::from_varmap(&varmap, DType::F32, &device).pp("norm"),
        )?;
        let expected_pre = x.add(&norm.forward(&x)?.affine(0.5, 0.0)?)?;
        assert!(max_diff(&pre.forward(&x, branch)?, &expected_pre)? < 1e-5);

        let varmap = VarMap::new();
        let post = Sublayer::new(
            NormPlacement::Post,
            8,
            VarBuilder::from_varmap(&varmap, DType::F32, &device),
        )?;
        assert_eq!(post.placement(), NormPlacement::Post);
        let expected_post = x.add(&norm.forward(&x.affine(0.5, 0.0)?)?)?;
        assert!(max_diff(&post.forward(&x, branch)?, &expected_post)? < 1e-5);

        // Same result as composing the wrappers by hand.
        let post_norm = PostNorm::new(8, VarBuilder::from_varmap(&varmap, DType::F32, &device))?;
        let by_hand = Residual.apply(&x, |h| post_norm.apply(h, branch))?;
        assert!(max_diff(&post.forward(&x, branch)?, &by_hand)? < 1e-6);
        Ok(())
    }
}
