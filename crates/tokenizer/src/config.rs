use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::errors::Result;

/// Sentinel handling for [`ByteTokenizer`](crate::ByteTokenizer).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizerConfig {
    /// Prefix every encoded sequence with `<bos>`.
    #[serde(default)]
    pub add_bos: bool,
    /// Suffix every encoded sequence with `<eos>`.
    #[serde(default)]
    pub add_eos: bool,
}

impl TokenizerConfig {
    pub fn new(add_bos: bool, add_eos: bool) -> Self {
        Self { add_bos, add_eos }
    }

    /// Loads a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}
