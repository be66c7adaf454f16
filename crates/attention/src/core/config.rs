//! Configuration options shared by all attention implementations.
//!
//! [`AttentionConfig`] captures the static shape of a multi-head attention
//! module together with run-time knobs such as dropout and causality.

use serde::{Deserialize, Serialize};

use super::AttentionError;

/// Configuration driving attention behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionConfig {
    /// Model width; queries, keys and values are projected to this size.
    pub dim: usize,
    /// Number of heads; must divide `dim`.
    pub heads: usize,
    /// Restrict every query to keys at or before its own position.
    #[serde(default)]
    pub causal: bool,
    /// Probability for dropout applied to attention weights during training.
    #[serde(default)]
    pub dropout_p: f32,
}

impl AttentionConfig {
    /// Non-causal attention without dropout.
    pub fn new(dim: usize, heads: usize) -> Self {
        Self {
            dim,
            heads,
            causal: false,
            dropout_p: 0.0,
        }
    }

    pub fn with_causal(mut self, causal: bool) -> Self {
        self.causal = causal;
        self
    }

    pub fn with_dropout(mut self, dropout_p: f32) -> Self {
        self.dropout_p = dropout_p;
        self
    }

    /// Width of a single head.
    pub fn head_dim(&self) -> usize {
        self.dim / self.heads.max(1)
    }

    /// Softmax temperature `head_dim^-0.5`.
    pub fn scale(&self) -> f64 {
        (self.head_dim() as f64).powf(-0.5)
    }

    pub fn validate(&self) -> Result<(), AttentionError> {
        let reason = if self.dim == 0 || self.heads == 0 {
            format!(
                "dim and heads must be non-zero (dim={}, heads={})",
                self.dim, self.heads
            )
        } else if self.dim % self.heads != 0 {
            format!(
                "dim {} is not divisible by heads {}",
                self.dim, self.heads
            )
        } else if !(0.0..1.0).contains(&self.dropout_p) {
            format!("dropout_p must lie in [0, 1), got {}", self.dropout_p)
        } else {
            return Ok(());
        };
        Err(AttentionError::InvalidConfig { reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_head_dim_and_scale() {
        let config = AttentionConfig::new(32, 4);
        assert_eq!(config.head_dim(), 8);
        assert!((config.scale() - 8f64.powf(-0.5)).abs() < 1e-12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_indivisible_heads() {
        let err = AttentionConfig::new(30, 4).validate().unwrap_err();
        assert!(matches!(err, AttentionError::InvalidConfig { .. }));
        assert!(err.to_string().contains("divisible"));
    }

    #[test]
    fn rejects_bad_dropout() {
        assert!(AttentionConfig::new(8, 2)
            .with_dropout(1.0)
            .validate()
            .is_err());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: AttentionConfig =
            serde_json::from_str(r#"{ "dim": 16, "heads": 2 }"#).unwrap();
        assert!(!config.causal);
        assert_eq!(config.dropout_p, 0.0);
    }
}
