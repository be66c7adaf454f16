//! Stacks of encoder and decoder blocks.

use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;
use layers::dropout::ForwardContext;

use crate::{
    block::{DecoderBlock, EncoderBlock},
    config::StackConfig,
};

/// `depth` encoder blocks applied in sequence; the same mask reaches every
/// block. Blocks live under `layers.{i}`.
#[derive(Debug)]
pub struct Encoder {
    layers: Vec<EncoderBlock>,
}

impl Encoder {
    pub fn new(config: &StackConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let layers = (0..config.depth)
            .map(|i| EncoderBlock::new(config, vb.pp(format!("layers.{i}"))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[EncoderBlock] {
        &self.layers
    }

    pub fn forward(
        &self,
        x: &Tensor,
        mask: Option<&Tensor>,
        ctx: &mut ForwardContext,
    ) -> Result<Tensor> {
        let mut hidden = x.clone();
        for layer in &self.layers {
            hidden = layer.forward(&hidden, mask, ctx)?;
        }
        Ok(hidden)
    }
}

/// `depth` decoder blocks; every block attends to the same encoder context
/// under the same context mask.
#[derive(Debug)]
pub struct Decoder {
    layers: Vec<DecoderBlock>,
}

impl Decoder {
    pub fn new(config: &StackConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let layers = (0..config.depth)
            .map(|i| DecoderBlock::new(config, vb.pp(format!("layers.{i}"))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[DecoderBlock] {
        &self.layers
    }

    pub fn forward(
        &self,
        x: &Tensor,
        context: &Tensor,
        mask: Option<&Tensor>,
        context_mask: Option<&Tensor>,
        ctx: &mut ForwardContext,
    ) -> Result<Tensor> {
        let mut hidden = x.clone();
        for layer in &self.layers {
            hidden = layer.forward(&hidden, context, mask, context_mask, ctx)?;
        }
        Ok(hidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn stacks_build_depth_layers() -> Result<()> {
        let device = Device::Cpu;
        let mut config = StackConfig::new(8);
        config.depth = 3;
        config.heads = 2;

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let encoder = Encoder::new(&config, vb.pp("encoder"))?;
        let decoder = Decoder::new(&config, vb.pp("decoder"))?;
        assert_eq!(encoder.layers().len(), 3);
        assert_eq!(decoder.layers().len(), 3);
        assert!(varmap
            .data()
            .lock()
            .unwrap()
            .contains_key("decoder.layers.2.cross_attn.to_kv.weight"));

        let src = Tensor::randn(0f32, 1.0, (2, 5, 8), &device)?;
        let tgt = Tensor::randn(0f32, 1.0, (2, 3, 8), &device)?;
        let memory = encoder.forward(&src, None, &mut ForwardContext::eval())?;
        let out = decoder.forward(&tgt, &memory, None, None, &mut ForwardContext::eval())?;
        assert_eq!(memory.dims(), &[2, 5, 8]);
        assert_eq!(out.dims(), &[2, 3, 8]);
        Ok(())
    }

    #[test]
    fn rejects_invalid_stack() {
        let device = Device::Cpu;
        let mut config = StackConfig::new(10);
        config.heads = 3;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        assert!(Encoder::new(&config, vb).is_err());
    }
}
