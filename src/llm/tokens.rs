use crate::error::LlmError;
use tiktoken_rs::CoreBPE;

/// Exact, model-specific token counting.
pub trait Tokenizer: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

pub struct BpeTokenizer {
    bpe: CoreBPE,
}

impl BpeTokenizer {
    pub fn cl100k() -> Result<Self, LlmError> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| LlmError::Configuration(format!("failed to load tokenizer: {}", e)))?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for BpeTokenizer {
    fn count(&self, text: &str) -> usize {
        // Special-token text inside diffs is counted as ordinary text.
        self.bpe.encode_ordinary(text).len()
    }
}
