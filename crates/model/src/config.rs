//! Model hyperparameters, validation and file loading.
//!
//! Configs deserialize from JSON or TOML with the defaults of the reference
//! architecture filled in for omitted fields. Validation collects every
//! problem and reports them together.

use std::{fs, path::Path};

use attention::AttentionConfig;
use embedding::{PositionalKind, TransformerEmbeddingConfig};
use layers::{mlp::FeedForwardConfig, residual::NormPlacement, ActivationKind};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Failures raised while loading or validating a model config.
#[derive(Debug, Error)]
pub enum ModelConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Format(String),
    #[error("invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),
}

impl From<toml::de::Error> for ModelConfigError {
    fn from(err: toml::de::Error) -> Self {
        Self::Format(err.to_string())
    }
}

impl From<serde_json::Error> for ModelConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(err.to_string())
    }
}

impl From<ModelConfigError> for candle_core::Error {
    fn from(err: ModelConfigError) -> Self {
        candle_core::Error::wrap(err)
    }
}

fn default_depth() -> usize {
    6
}

fn default_heads() -> usize {
    8
}

fn default_max_seq_len() -> usize {
    512
}

fn default_dropout() -> f32 {
    0.1
}

fn default_ff_mult() -> usize {
    4
}

fn default_true() -> bool {
    true
}

/// Shape of an encoder or decoder stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackConfig {
    pub dim: usize,
    #[serde(default = "default_depth")]
    pub depth: usize,
    #[serde(default = "default_heads")]
    pub heads: usize,
    /// Causal self-attention in encoder blocks. Decoder self-attention is
    /// always causal.
    #[serde(default)]
    pub causal: bool,
    #[serde(default = "default_dropout")]
    pub attn_dropout_p: f32,
    #[serde(default = "default_dropout")]
    pub ff_dropout_p: f32,
    #[serde(default = "default_ff_mult")]
    pub ff_mult: usize,
    /// Non-linearity between the feed-forward projections.
    #[serde(default)]
    pub ff_activation: ActivationKind,
    #[serde(default)]
    pub norm_placement: NormPlacement,
}

impl StackConfig {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            depth: default_depth(),
            heads: default_heads(),
            causal: false,
            attn_dropout_p: default_dropout(),
            ff_dropout_p: default_dropout(),
            ff_mult: default_ff_mult(),
            ff_activation: ActivationKind::default(),
            norm_placement: NormPlacement::default(),
        }
    }

    pub fn attention(&self, causal: bool) -> AttentionConfig {
        AttentionConfig::new(self.dim, self.heads)
            .with_causal(causal)
            .with_dropout(self.attn_dropout_p)
    }

    pub fn feed_forward(&self) -> FeedForwardConfig {
        FeedForwardConfig {
            hidden_size: self.dim,
            mult: self.ff_mult,
            activation: self.ff_activation,
            dropout_p: self.ff_dropout_p,
        }
    }

    pub fn validate(&self) -> Result<(), ModelConfigError> {
        finish(self.collect_errors())
    }

    fn collect_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.dim == 0 {
            errors.push("dim must be greater than 0".to_string());
        }
        if self.depth == 0 {
            errors.push("depth must be greater than 0".to_string());
        }
        if self.heads == 0 {
            errors.push("heads must be greater than 0".to_string());
        } else if self.dim % self.heads != 0 {
            errors.push(format!(
                "dim ({}) must be divisible by heads ({})",
                self.dim, self.heads
            ));
        }
        if self.ff_mult == 0 {
            errors.push("ff_mult must be greater than 0".to_string());
        }
        check_probability("attn_dropout_p", self.attn_dropout_p, &mut errors);
        check_probability("ff_dropout_p", self.ff_dropout_p, &mut errors);
        errors
    }
}

/// Decoder-only language model built from an encoder stack with causal
/// self-attention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerLMConfig {
    pub vocab_size: usize,
    pub dim: usize,
    #[serde(default = "default_depth")]
    pub depth: usize,
    #[serde(default = "default_heads")]
    pub heads: usize,
    #[serde(default = "default_true")]
    pub causal: bool,
    #[serde(default = "default_max_seq_len")]
    pub max_seq_len: usize,
    /// Share the output projection weight with the token embedding table.
    #[serde(default)]
    pub tie_weights: bool,
    #[serde(default = "default_dropout")]
    pub attn_dropout_p: f32,
    #[serde(default = "default_dropout")]
    pub ff_dropout_p: f32,
    #[serde(default = "default_dropout")]
    pub emb_dropout_p: f32,
    #[serde(default = "default_ff_mult")]
    pub ff_mult: usize,
    #[serde(default)]
    pub ff_activation: ActivationKind,
    #[serde(default)]
    pub positional: PositionalKind,
    #[serde(default)]
    pub norm_placement: NormPlacement,
    /// When set, masks default to `ids != pad_idx`.
    #[serde(default)]
    pub pad_idx: Option<u32>,
}

impl TransformerLMConfig {
    pub fn new(vocab_size: usize, dim: usize) -> Self {
        Self {
            vocab_size,
            dim,
            depth: default_depth(),
            heads: default_heads(),
            causal: true,
            max_seq_len: default_max_seq_len(),
            tie_weights: false,
            attn_dropout_p: default_dropout(),
            ff_dropout_p: default_dropout(),
            emb_dropout_p: default_dropout(),
            ff_mult: default_ff_mult(),
            ff_activation: ActivationKind::default(),
            positional: PositionalKind::default(),
            norm_placement: NormPlacement::default(),
            pad_idx: None,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ModelConfigError> {
        let config: Self = read_config(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn stack(&self) -> StackConfig {
        StackConfig {
            dim: self.dim,
            depth: self.depth,
            heads: self.heads,
            causal: self.causal,
            attn_dropout_p: self.attn_dropout_p,
            ff_dropout_p: self.ff_dropout_p,
            ff_mult: self.ff_mult,
            ff_activation: self.ff_activation,
            norm_placement: self.norm_placement,
        }
    }

    pub fn embedding(&self) -> TransformerEmbeddingConfig {
        TransformerEmbeddingConfig {
            vocab_size: self.vocab_size,
            dim: self.dim,
            max_seq_len: self.max_seq_len,
            dropout_p: self.emb_dropout_p,
            positional: self.positional,
        }
    }

    pub fn validate(&self) -> Result<(), ModelConfigError> {
        let mut errors = self.stack().collect_errors();
        check_vocab("vocab_size", self.vocab_size, self.pad_idx, &mut errors);
        check_probability("emb_dropout_p", self.emb_dropout_p, &mut errors);
        check_positions(self.positional, self.dim, self.max_seq_len, &mut errors);
        finish(errors)
    }
}

/// Encoder-decoder model with separate source and target embeddings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerEncDecConfig {
    pub src_vocab_size: usize,
    pub tgt_vocab_size: usize,
    pub dim: usize,
    #[serde(default = "default_depth")]
    pub depth: usize,
    #[serde(default = "default_heads")]
    pub heads: usize,
    #[serde(default = "default_max_seq_len")]
    pub max_seq_len: usize,
    /// When set, source and target masks default to `ids != pad_idx`.
    #[serde(default)]
    pub pad_idx: Option<u32>,
    /// Share the output projection weight with the target embedding table.
    #[serde(default)]
    pub tie_weights: bool,
    #[serde(default = "default_dropout")]
    pub attn_dropout_p: f32,
    #[serde(default = "default_dropout")]
    pub ff_dropout_p: f32,
    #[serde(default)]
    pub emb_dropout_p: f32,
    #[serde(default = "default_ff_mult")]
    pub ff_mult: usize,
    #[serde(default)]
    pub ff_activation: ActivationKind,
    #[serde(default)]
    pub positional: PositionalKind,
    #[serde(default)]
    pub norm_placement: NormPlacement,
}

impl TransformerEncDecConfig {
    pub fn new(src_vocab_size: usize, tgt_vocab_size: usize, dim: usize) -> Self {
        Self {
            src_vocab_size,
            tgt_vocab_size,
            dim,
            depth: default_depth(),
            heads: default_heads(),
            max_seq_len: default_max_seq_len(),
            pad_idx: None,
            tie_weights: false,
            attn_dropout_p: default_dropout(),
            ff_dropout_p: default_dropout(),
            emb_dropout_p: 0.0,
            ff_mult: default_ff_mult(),
            ff_activation: ActivationKind::default(),
            positional: PositionalKind::default(),
            norm_placement: NormPlacement::default(),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ModelConfigError> {
        let config: Self = read_config(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn stack(&self) -> StackConfig {
        StackConfig {
            dim: self.dim,
            depth: self.depth,
            heads: self.heads,
            causal: false,
            attn_dropout_p: self.attn_dropout_p,
            ff_dropout_p: self.ff_dropout_p,
            ff_mult: self.ff_mult,
            ff_activation: self.ff_activation,
            norm_placement: self.norm_placement,
        }
    }

    pub fn src_embedding(&self) -> TransformerEmbeddingConfig {
        self.embedding(self.src_vocab_size)
    }

    pub fn tgt_embedding(&self) -> TransformerEmbeddingConfig {
        self.embedding(self.tgt_vocab_size)
    }

    fn embedding(&self, vocab_size: usize) -> TransformerEmbeddingConfig {
        TransformerEmbeddingConfig {
            vocab_size,
            dim: self.dim,
            max_seq_len: self.max_seq_len,
            dropout_p: self.emb_dropout_p,
            positional: self.positional,
        }
    }

    pub fn validate(&self) -> Result<(), ModelConfigError> {
        let mut errors = self.stack().collect_errors();
        check_vocab("src_vocab_size", self.src_vocab_size, self.pad_idx, &mut errors);
        check_vocab("tgt_vocab_size", self.tgt_vocab_size, self.pad_idx, &mut errors);
        check_probability("emb_dropout_p", self.emb_dropout_p, &mut errors);
        check_positions(self.positional, self.dim, self.max_seq_len, &mut errors);
        finish(errors)
    }
}

fn read_config<T: DeserializeOwned>(path: &Path) -> Result<T, ModelConfigError> {
    let contents = fs::read_to_string(path)?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(serde_json::from_str(&contents)?),
        Some("toml") | Some("tml") | None => Ok(toml::from_str(&contents)?),
        Some(other) => Err(ModelConfigError::Format(format!(
            "unsupported configuration extension '{other}'"
        ))),
    }
}

fn finish(errors: Vec<String>) -> Result<(), ModelConfigError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ModelConfigError::Validation(errors))
    }
}

fn check_probability(name: &str, p: f32, errors: &mut Vec<String>) {
    if !(0.0..1.0).contains(&p) {
        errors.push(format!("{name} must be in [0, 1), got {p}"));
    }
}

fn check_vocab(name: &str, vocab_size: usize, pad_idx: Option<u32>, errors: &mut Vec<String>) {
    if vocab_size == 0 {
        errors.push(format!("{name} must be greater than 0"));
    }
    if let Some(pad) = pad_idx {
        if pad as usize >= vocab_size {
            errors.push(format!("pad_idx ({pad}) must be below {name} ({vocab_size})"));
        }
    }
}

fn check_positions(kind: PositionalKind, dim: usize, max_seq_len: usize, errors: &mut Vec<String>) {
    match kind {
        PositionalKind::Absolute if max_seq_len == 0 => {
            errors.push("max_seq_len must be greater than 0".to_string());
        }
        PositionalKind::Fixed if dim % 2 != 0 => {
            errors.push(format!("fixed positional encoding requires an even dim, got {dim}"));
        }
        PositionalKind::Axial => {
            errors.push("axial positional encoding is not implemented".to_string());
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_reference_architecture() {
        let lm: TransformerLMConfig =
            serde_json::from_str(r#"{ "vocab_size": 259, "dim": 64 }"#).unwrap();
        assert_eq!(lm.depth, 6);
        assert_eq!(lm.heads, 8);
        assert!(lm.causal);
        assert_eq!(lm.max_seq_len, 512);
        assert_eq!(lm.emb_dropout_p, 0.1);
        assert_eq!(lm.pad_idx, None);
        assert_eq!(lm, TransformerLMConfig::new(259, 64));

        let encdec: TransformerEncDecConfig = toml::from_str(
            "src_vocab_size = 100\ntgt_vocab_size = 120\ndim = 32\npad_idx = 0\n",
        )
        .unwrap();
        assert_eq!(encdec.emb_dropout_p, 0.0);
        assert_eq!(encdec.attn_dropout_p, 0.1);
        assert_eq!(encdec.pad_idx, Some(0));
        assert!(!encdec.tie_weights);
        assert_eq!(encdec.norm_placement, NormPlacement::Pre);
    }

    #[test]
    fn validation_collects_every_problem() {
        let mut config = TransformerLMConfig::new(10, 30);
        config.heads = 4;
        config.ff_dropout_p = 1.5;
        config.pad_idx = Some(10);
        config.positional = PositionalKind::Axial;
        match config.validate() {
            Err(ModelConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 4, "{errors:?}");
                assert!(errors.iter().any(|e| e.contains("divisible")));
                assert!(errors.iter().any(|e| e.contains("ff_dropout_p")));
                assert!(errors.iter().any(|e| e.contains("pad_idx")));
                assert!(errors.iter().any(|e| e.contains("axial")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn fixed_positions_need_even_dim() {
        let mut config = TransformerEncDecConfig::new(10, 10, 9);
        config.heads = 3;
        config.positional = PositionalKind::Fixed;
        assert!(config.validate().is_err());
        config.dim = 12;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn stack_views_carry_shared_fields() {
        let mut config = TransformerEncDecConfig::new(10, 20, 16);
        config.heads = 2;
        config.ff_mult = 3;
        let stack = config.stack();
        assert_eq!(stack.heads, 2);
        assert!(!stack.causal);
        assert_eq!(stack.feed_forward().intermediate_size(), 48);
        assert!(stack.attention(true).causal);
        assert_eq!(config.tgt_embedding().vocab_size, 20);
    }
}
