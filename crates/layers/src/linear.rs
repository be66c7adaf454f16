//! Linear and affine projection helpers.
//!
//! Linear layers expect inputs shaped `(batch, seq, in_dim)` or `(rows, in_dim)`
//! and return the same leading layout with `out_dim` features. Parameters are
//! allocated through a [`VarBuilder`] so they land in the caller's `VarMap`
//! and stay trainable. Initialisation follows the `fan_in` uniform scheme
//! used by PyTorch's `nn.Linear`.

use candle_core::{DType, Error, Result, Tensor};
use candle_nn::{Init, VarBuilder};
use serde::{Deserialize, Serialize};

use crate::checks;

/// Configuration shared by dense projection layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearConfig {
    /// Incoming feature dimension.
    pub input_dim: usize,
    /// Output feature dimension.
    pub output_dim: usize,
    /// Whether a learnable bias vector should be applied.
    pub bias: bool,
}

impl LinearConfig {
    /// Creates a configuration for a projection with bias.
    pub fn new(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
            bias: true,
        }
    }

    /// Creates a configuration for a projection without bias.
    pub fn no_bias(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
            bias: false,
        }
    }
}

/// Uniform in `±1/sqrt(fan_in)`, the `nn.Linear` default for both weight
/// and bias.
fn fan_in_uniform(fan_in: usize) -> Init {
    let bound = 1.0 / (fan_in as f64).sqrt();
    Init::Uniform {
        lo: -bound,
        up: bound,
    }
}

/// Dense affine projection `y = x W^T + b`.
///
/// The weight tensor is a handle onto variable storage; cloning a `Linear` or
/// building one with [`Linear::tied`] shares that storage rather than copying.
#[derive(Debug, Clone)]
pub struct Linear {
    config: LinearConfig,
    weight: Tensor,
    bias: Option<Tensor>,
}

impl Linear {
    /// Allocates a projection under `vb`.
    pub fn new(config: LinearConfig, vb: VarBuilder) -> Result<Self> {
        let weight = vb.get_with_hints(
            (config.output_dim, config.input_dim),
            "weight",
            fan_in_uniform(config.input_dim),
        )?;
        let bias = if config.bias {
            Some(vb.get_with_hints(config.output_dim, "bias", fan_in_uniform(config.input_dim))?)
        } else {
            None
        };
        Self::from_parts(config, weight, bias)
    }

    /// Builds a projection whose weight is `weight` itself (no copy), allocating
    /// only the bias under `vb`. Used for tying an output head to an embedding
    /// table of shape `(output_dim, input_dim)`.
    pub fn tied(config: LinearConfig, weight: &Tensor, vb: VarBuilder) -> Result<Self> {
        let bias = if config.bias {
            Some(vb.get_with_hints(
                config.output_dim,
                "bias",
                fan_in_uniform(config.input_dim),
            )?)
        } else {
            None
        };
        Self::from_parts(config, weight.clone(), bias)
    }

    /// Constructs a linear layer from pre-existing parameters.
    pub fn from_parts(config: LinearConfig, weight: Tensor, bias: Option<Tensor>) -> Result<Self> {
        Self::validate_weight(&config, &weight)?;
        Self::validate_bias(&config, bias.as_ref())?;
        Ok(Self {
            config,
            weight,
            bias,
        })
    }

    /// Returns the static configuration.
    pub fn config(&self) -> &LinearConfig {
        &self.config
    }

    /// Returns the weight handle, shaped `(output_dim, input_dim)`.
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Returns the bias handle if present.
    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    fn validate_weight(config: &LinearConfig, weight: &Tensor) -> Result<()> {
        checks::expect_rank("linear.weight", weight, 2)?;
        checks::expect_shape(
            "linear.weight",
            weight,
            &[config.output_dim, config.input_dim],
        )?;
        checks::expect_dtype_in(
            "linear.weight",
            weight,
            &[DType::F16, DType::BF16, DType::F32, DType::F64],
        )
    }

    fn validate_bias(config: &LinearConfig, bias: Option<&Tensor>) -> Result<()> {
        match (config.bias, bias) {
            (true, Some(tensor)) => {
                checks::expect_shape("linear.bias", tensor, &[config.output_dim])
            }
            (false, Some(_)) => Err(Error::Msg("bias provided but config disables bias".into())),
            (true, None) => Err(Error::Msg("config expects bias but none supplied".into())),
            (false, None) => Ok(()),
        }
    }

    /// Applies the projection over the last axis.
    pub fn forward(&self, hidden: &Tensor) -> Result<Tensor> {
        let weight_t = self.weight.t()?;
        let mut output = match hidden.dims() {
            [batch, seq, hidden_dim] => {
                if *hidden_dim != self.config.input_dim {
                    return Err(Error::Msg(format!(
                        "linear: expected last dim {} but received {}",
                        self.config.input_dim, hidden_dim
                    )));
                }
                let flat = hidden.reshape((*batch * *seq, *hidden_dim))?;
                flat.matmul(&weight_t)?
                    .reshape((*batch, *seq, self.config.output_dim))?
            }
            [_, hidden_dim] => {
                if *hidden_dim != self.config.input_dim {
                    return Err(Error::Msg(format!(
                        "linear: expected last dim {} but received {}",
                        self.config.input_dim, hidden_dim
                    )));
                }
                hidden.matmul(&weight_t)?
            }
            dims => {
                return Err(Error::Msg(format!(
                    "linear expects input shaped [B, T, H_in] or [T, H_in], got {dims:?}"
                )))
            }
        };

        if let Some(bias) = &self.bias {
            output = output.broadcast_add(bias)?;
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device, Var};
    use candle_nn::VarMap;

    fn reference_linear(input: &Tensor, weight: &Tensor, bias: Option<&Tensor>) -> Result<Tensor> {
        let (batch, seq, hidden) = input.dims3()?;
        let out = input
            .reshape((batch * seq, hidden))?
            .matmul(&weight.t()?)?
            .reshape((batch, seq, weight.dims()[0]))?;
        match bias {
            Some(bias) => out.broadcast_add(bias),
            None => Ok(out),
        }
    }

    fn tensor_stats(tensor: &Tensor) -> Result<(f64, f64)> {
        let values = tensor.flatten_all()?.to_vec1::<f32>()?;
        let mean = values.iter().copied().map(f64::from).sum::<f64>() / values.len() as f64;
        let var = values
            .iter()
            .map(|v| {
                let diff = f64::from(*v) - mean;
                diff * diff
            })
            .sum::<f64>()
            / values.len() as f64;
        Ok((mean, var.sqrt()))
    }

    #[test]
    fn forward_matches_reference() -> Result<()> {
        let device = Device::Cpu;
        let weight = Tensor::randn(0f32, 0.05, (4, 8), &device)?;
        let bias = Tensor::randn(0f32, 0.02, 4, &device)?;
        let linear =
            Linear::from_parts(LinearConfig::new(8, 4), weight.clone(), Some(bias.clone()))?;
        let input = Tensor::randn(0f32, 1.0, (2, 5, 8), &device)?;

        let output = linear.forward(&input)?;
        assert_eq!(output.dims(), &[2, 5, 4]);

        let reference = reference_linear(&input, &weight, Some(&bias))?;
        let max = output.sub(&reference)?.abs()?.max_all()?.to_vec0::<f32>()?;
        assert!(max <= 1e-5, "max diff {max}");
        Ok(())
    }

    #[test]
    fn rejects_wrong_feature_dim() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let linear = Linear::new(LinearConfig::no_bias(8, 4), vb)?;
        let input = Tensor::zeros((1, 2, 7), DType::F32, &device)?;
        assert!(linear.forward(&input).is_err());
        Ok(())
    }

    #[test]
    fn no_bias_config_registers_only_weight() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let linear = Linear::new(LinearConfig::no_bias(6, 3), vb)?;
        assert!(linear.bias().is_none());
        assert_eq!(varmap.all_vars().len(), 1);
        Ok(())
    }

    #[test]
    fn init_stays_within_fan_in_bound() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let linear = Linear::new(LinearConfig::new(64, 32), vb)?;
        let bound = 1.0 / 8.0;
        for tensor in [linear.weight(), linear.bias().expect("bias")] {
            let max = tensor.abs()?.max_all()?.to_vec0::<f32>()?;
            assert!(max <= bound + 1e-6, "max {max}");
        }
        let (mean, std) = tensor_stats(linear.weight())?;
        let expected = f64::from(bound) / 3f64.sqrt();
        assert!(mean.abs() < 5e-3);
        assert!((std - expected).abs() < expected * 0.25);
        Ok(())
    }

    #[test]
    fn tied_projection_sees_updates_to_source() -> Result<()> {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let source = Var::from_tensor(&Tensor::randn(0f32, 1.0, (16, 8), &device)?)?;
        let tied = Linear::tied(LinearConfig::no_bias(8, 16), source.as_tensor(), vb)?;

        let input = Tensor::randn(0f32, 1.0, (1, 3, 8), &device)?;
        source.set(&Tensor::full(0.25f32, (16, 8), &device)?)?;
        let out = tied.forward(&input)?;
        let expected = reference_linear(&input, &Tensor::full(0.25f32, (16, 8), &device)?, None)?;
        let diff = out.sub(&expected)?.abs()?.max_all()?.to_vec0::<f32>()?;
        assert!(diff <= 1e-5);
        Ok(())
    }
}
