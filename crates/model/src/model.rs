//! Full models: encoder-decoder and decoder-only language model.

use attention::masks::padding_mask_from_ids;
use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;
use embedding::TransformerEmbedding;
use layers::{
    dropout::ForwardContext,
    linear::{Linear, LinearConfig},
};

use crate::{
    config::{TransformerEncDecConfig, TransformerLMConfig},
    stack::{Decoder, Encoder},
};

/// `ids != pad_idx` when a pad index is configured, `None` otherwise.
pub fn padding_mask(ids: &Tensor, pad_idx: Option<u32>) -> Result<Option<Tensor>> {
    pad_idx
        .map(|pad| padding_mask_from_ids(ids, pad))
        .transpose()
}

fn output_projection(
    dim: usize,
    vocab_size: usize,
    tied_to: Option<&Tensor>,
    vb: VarBuilder,
) -> Result<Linear> {
    let config = LinearConfig::new(dim, vocab_size);
    match tied_to {
        Some(weight) => Linear::tied(config, weight, vb),
        None => Linear::new(config, vb),
    }
}

/// Encoder-decoder Transformer producing target-vocabulary logits.
///
/// Parameters live under `src_emb`, `tgt_emb`, `encoder`, `decoder` and
/// `proj`. With `tie_weights` the projection reuses `tgt_emb.token.weight`
/// and only registers its bias.
#[derive(Debug)]
pub struct TransformerEncDec {
    config: TransformerEncDecConfig,
    src_emb: TransformerEmbedding,
    tgt_emb: TransformerEmbedding,
    encoder: Encoder,
    decoder: Decoder,
    proj: Linear,
}

impl TransformerEncDec {
    pub fn new(config: TransformerEncDecConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let stack = config.stack();
        let src_emb = TransformerEmbedding::new(config.src_embedding(), vb.pp("src_emb"))?;
        let tgt_emb = TransformerEmbedding::new(config.tgt_embedding(), vb.pp("tgt_emb"))?;
        let encoder = Encoder::new(&stack, vb.pp("encoder"))?;
        let decoder = Decoder::new(&stack, vb.pp("decoder"))?;
        let proj = output_projection(
            config.dim,
            config.tgt_vocab_size,
            config.tie_weights.then(|| tgt_emb.token_weight()),
            vb.pp("proj"),
        )?;
        log::debug!(
            "encoder-decoder src_vocab={} tgt_vocab={} dim={} depth={} heads={} tied={} pad_idx={:?}",
            config.src_vocab_size,
            config.tgt_vocab_size,
            config.dim,
            config.depth,
            config.heads,
            config.tie_weights,
            config.pad_idx
        );
        Ok(Self {
            config,
            src_emb,
            tgt_emb,
            encoder,
            decoder,
            proj,
        })
    }

    pub fn config(&self) -> &TransformerEncDecConfig {
        &self.config
    }

    pub fn projection(&self) -> &Linear {
        &self.proj
    }

    pub fn target_embedding(&self) -> &TransformerEmbedding {
        &self.tgt_emb
    }

    pub fn padding_mask(&self, ids: &Tensor) -> Result<Option<Tensor>> {
        padding_mask(ids, self.config.pad_idx)
    }

    /// Encodes `src` `(batch, src_seq)` into `(batch, src_seq, dim)`.
    pub fn encode(
        &self,
        src: &Tensor,
        src_mask: Option<&Tensor>,
        ctx: &mut ForwardContext,
    ) -> Result<Tensor> {
        let hidden = self.src_emb.forward(src, ctx)?;
        self.encoder.forward(&hidden, src_mask, ctx)
    }

    /// Decodes `tgt` against encoder output `memory` into target logits.
    pub fn decode(
        &self,
        tgt: &Tensor,
        memory: &Tensor,
        tgt_mask: Option<&Tensor>,
        src_mask: Option<&Tensor>,
        ctx: &mut ForwardContext,
    ) -> Result<Tensor> {
        let hidden = self.tgt_emb.forward(tgt, ctx)?;
        let hidden = self
            .decoder
            .forward(&hidden, memory, tgt_mask, src_mask, ctx)?;
        self.proj.forward(&hidden)
    }

    /// Maps `src` `(batch, src_seq)` and `tgt` `(batch, tgt_seq)` ids to
    /// logits `(batch, tgt_seq, tgt_vocab_size)`. Masks not supplied are
    /// derived from `pad_idx`.
    pub fn forward(
        &self,
        src: &Tensor,
        tgt: &Tensor,
        src_mask: Option<&Tensor>,
        tgt_mask: Option<&Tensor>,
        ctx: &mut ForwardContext,
    ) -> Result<Tensor> {
        let src_mask = match src_mask {
            Some(mask) => Some(mask.clone()),
            None => self.padding_mask(src)?,
        };
        let tgt_mask = match tgt_mask {
            Some(mask) => Some(mask.clone()),
            None => self.padding_mask(tgt)?,
        };
        let memory = self.encode(src, src_mask.as_ref(), ctx)?;
        self.decode(tgt, &memory, tgt_mask.as_ref(), src_mask.as_ref(), ctx)
    }
}

/// Language model: embedding, encoder stack with causal self-attention,
/// projection to vocabulary logits.
///
/// Parameters live under `emb`, `encoder` and `proj`. With `tie_weights` the
/// projection reuses `emb.token.weight`.
#[derive(Debug)]
pub struct TransformerLM {
    config: TransformerLMConfig,
    emb: TransformerEmbedding,
    encoder: Encoder,
    proj: Linear,
}

impl TransformerLM {
    pub fn new(config: TransformerLMConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let emb = TransformerEmbedding::new(config.embedding(), vb.pp("emb"))?;
        let encoder = Encoder::new(&config.stack(), vb.pp("encoder"))?;
        let proj = output_projection(
            config.dim,
            config.vocab_size,
            config.tie_weights.then(|| emb.token_weight()),
            vb.pp("proj"),
        )?;
        log::debug!(
            "language model vocab={} dim={} depth={} heads={} causal={} tied={}",
            config.vocab_size,
            config.dim,
            config.depth,
            config.heads,
            config.causal,
            config.tie_weights
        );
        Ok(Self {
            config,
            emb,
            encoder,
            proj,
        })
    }

    pub fn config(&self) -> &TransformerLMConfig {
        &self.config
    }

    pub fn projection(&self) -> &Linear {
        &self.proj
    }

    pub fn embedding(&self) -> &TransformerEmbedding {
        &self.emb
    }

    pub fn padding_mask(&self, ids: &Tensor) -> Result<Option<Tensor>> {
        padding_mask(ids, self.config.pad_idx)
    }

    /// Maps ids `(batch, seq)` to logits `(batch, seq, vocab_size)`.
    pub fn forward(
        &self,
        ids: &Tensor,
        mask: Option<&Tensor>,
        ctx: &mut ForwardContext,
    ) -> Result<Tensor> {
        let mask = match mask {
            Some(mask) => Some(mask.clone()),
            None => self.padding_mask(ids)?,
        };
        let hidden = self.emb.forward(ids, ctx)?;
        let hidden = self.encoder.forward(&hidden, mask.as_ref(), ctx)?;
        self.proj.forward(&hidden)
    }
}
