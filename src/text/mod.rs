//! Script text processing
//!
//! Turns script text into the acoustic-token sequence the matcher aligns
//! against, with per-token character offsets for cursor reporting.

pub mod g2p;
pub mod tokenizer;

// Re-export commonly used types
pub use g2p::{DictLexicon, Lexicon, SpellingLexicon};
pub use tokenizer::ScriptTokenizer;

use crate::align::TokenId;

/// Capability of mapping script text to acoustic tokens.
pub trait Tokenizer: Send + Sync {
    /// Tokenize `text` into acoustic tokens plus a parallel list of character
    /// offsets, one per token, monotonically non-decreasing.
    fn tokenize(&self, text: &str) -> crate::Result<(Vec<TokenId>, Vec<usize>)>;

    /// The CTC blank of the underlying vocabulary.
    fn blank_token(&self) -> TokenId;

    /// The word-boundary token inserted between words, when the vocabulary
    /// has one.
    fn space_token(&self) -> Option<TokenId>;

    /// Human-readable form of a token, for logging.
    fn lookup(&self, token: TokenId) -> Option<&str>;
}
