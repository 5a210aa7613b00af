//! Token counting.
//!
//! Every budget decision in this crate goes through the [`TokenCounter`]
//! contract. The default implementation wraps tiktoken's `o200k_base`
//! encoding; counts are approximate for non-OpenAI tokenizers, which is
//! why budgets carry slack instead of being exact ceilings.

use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tiktoken_rs::{CoreBPE, o200k_base};

#[derive(Debug, Error)]
pub enum TokenCounterError {
    #[error("Failed to initialize tokenizer encoder: {0}")]
    EncoderInit(String),

    #[error("Unknown tokenizer '{name}' (expected 'o200k' or 'approx')")]
    UnknownTokenizer { name: String },
}

/// Pure `text -> token count` capability.
///
/// Counting must be available before any budget check; construction of a
/// counter is the fallible step, counting itself is not.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// The encoder loads vocabulary data on first use, so it is created once
/// and shared across all counter instances.
static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn shared_encoder() -> Option<&'static CoreBPE> {
    ENCODER.get_or_init(|| o200k_base().ok()).as_ref()
}

/// Token counter backed by tiktoken's `o200k_base` encoding.
pub struct TiktokenCounter {
    encoder: &'static CoreBPE,
}

impl TiktokenCounter {
    /// Fails hard when the encoder cannot be initialized: without a
    /// counter no budget can be established, so the subsystem refuses to
    /// proceed rather than silently skip budgeting.
    pub fn new() -> Result<Self, TokenCounterError> {
        let encoder = shared_encoder().ok_or_else(|| {
            TokenCounterError::EncoderInit("o200k_base vocabulary unavailable".to_string())
        })?;
        Ok(Self { encoder })
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.encoder.encode_ordinary(text).len()
    }
}

/// Bytes/4 heuristic counter. Deterministic and dependency-free, used in
/// tests and available as an explicit opt-in.
#[derive(Debug, Default, Clone, Copy)]
pub struct ApproxCounter;

impl TokenCounter for ApproxCounter {
    fn count(&self, text: &str) -> usize {
        text.len().div_ceil(4)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizerConfig {
    #[serde(default = "default_tokenizer_name")]
    pub name: String,
}

fn default_tokenizer_name() -> String {
    "o200k".to_string()
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            name: default_tokenizer_name(),
        }
    }
}

/// Build the configured counter. An unknown tokenizer name is a fatal
/// configuration error, not a fallback.
pub fn build_token_counter(
    config: &TokenizerConfig,
) -> Result<Arc<dyn TokenCounter>, TokenCounterError> {
    match config.name.as_str() {
        "o200k" => Ok(Arc::new(TiktokenCounter::new()?)),
        "approx" => Ok(Arc::new(ApproxCounter)),
        other => Err(TokenCounterError::UnknownTokenizer {
            name: other.to_string(),
        }),
    }
}
