//! Tokenizer-backed token counter.
//!
//! Wraps a HuggingFace `tokenizers` vocabulary file for exact counts.
//! Falls back to the character estimator on encode errors so capacity
//! math always gets a deterministic answer.

use mnemo_core::counter::{EstimateCounter, TokenCounter};
use tokenizers::Tokenizer;
use tracing::debug;

/// Counts tokens with a real tokenizer vocabulary.
pub struct TokenizerCounter {
    tokenizer: Tokenizer,
    fallback: EstimateCounter,
}

impl TokenizerCounter {
    /// Load a tokenizer from a `tokenizer.json` file.
    pub fn from_file(path: &str) -> Result<Self, mnemo_core::error::MemoryError> {
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            mnemo_core::error::MemoryError::Storage(format!("load tokenizer {path}: {e}"))
        })?;
        Ok(Self {
            tokenizer,
            fallback: EstimateCounter::new(),
        })
    }

    /// Wrap an already-loaded tokenizer.
    pub fn from_tokenizer(tokenizer: Tokenizer) -> Self {
        Self {
            tokenizer,
            fallback: EstimateCounter::new(),
        }
    }
}

impl TokenCounter for TokenizerCounter {
    fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding.get_ids().len().max(1),
            Err(e) => {
                debug!(error = %e, "tokenizer encode failed, using estimator");
                self.fallback.count(text)
            }
        }
    }
}
