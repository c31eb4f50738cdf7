//! Token counting boundary

use anyhow::{Context, Result};
use tiktoken_rs::{CoreBPE, cl100k_base};

/// Pure, total text → token count function.
pub trait TokenCounter {
    fn count(&self, text: &str) -> usize;

    /// Encoding name, reported in run summaries
    fn name(&self) -> &'static str;
}

impl<T: TokenCounter + ?Sized> TokenCounter for &T {
    fn count(&self, text: &str) -> usize {
        (**self).count(text)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Exact counter for the `cl100k_base` BPE encoding.
pub struct Cl100kCounter {
    bpe: CoreBPE,
}

impl Cl100kCounter {
    pub fn new() -> Result<Self> {
        let bpe = cl100k_base().context("load cl100k_base encoding")?;
        Ok(Self { bpe })
    }
}

impl TokenCounter for Cl100kCounter {
    fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        // Special-token markers in article text are ordinary text here
        self.bpe.encode_ordinary(text).len()
    }

    fn name(&self) -> &'static str {
        "cl100k_base"
    }
}

/// Whitespace-delimited word count; cheap stand-in when no BPE is wanted.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhitespaceCounter;

impl TokenCounter for WhitespaceCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn name(&self) -> &'static str {
        "whitespace"
    }
}
