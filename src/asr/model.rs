//! Acoustic Model Trait
//!
//! Abstract interface for emission-producing acoustic backends.

use crate::align::emission::EmissionBuffer;
use crate::align::TokenId;
use std::collections::HashMap;

/// Acoustic model capability: raw mono f32 samples in, one log-probability
/// vector per frame out.
///
/// Implementations are shared by reference across sessions and must be safe
/// for concurrent invocation.
pub trait AcousticModel: Send + Sync {
    /// Run the model over `samples` and return the emission matrix, one
    /// column of log-probabilities per `frame_stride()` input samples.
    fn infer(&self, samples: &[f32]) -> crate::Result<EmissionBuffer>;

    /// The sample rate the model was trained for.
    fn sample_rate(&self) -> u32;

    /// Input samples per emission frame.
    fn frame_stride(&self) -> usize;

    /// The acoustic vocabulary the emission rows are indexed by.
    fn vocab(&self) -> &Vocabulary;
}

/// Acoustic vocabulary: token strings indexed by emission row, with the
/// designated CTC blank and the optional word-delimiter token.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    tokens: Vec<String>,
    index: HashMap<String, TokenId>,
    blank: TokenId,
    word_delimiter: Option<TokenId>,
}

impl Vocabulary {
    /// Build from an ordered token list. The blank is `<pad>` or `<blank>`
    /// when present, otherwise the last entry; `|` is the word delimiter.
    pub fn from_tokens(tokens: Vec<String>) -> crate::Result<Self> {
        if tokens.is_empty() {
            return Err(crate::Error::Model("Vocabulary is empty".to_string()));
        }

        let mut index = HashMap::with_capacity(tokens.len());
        for (id, token) in tokens.iter().enumerate() {
            index.insert(token.clone(), id as TokenId);
        }

        let blank = index
            .get("<pad>")
            .or_else(|| index.get("<blank>"))
            .copied()
            .unwrap_or(tokens.len() as TokenId - 1);
        let word_delimiter = index.get("|").copied();

        Ok(Self {
            tokens,
            index,
            blank,
            word_delimiter,
        })
    }

    /// Parse a `vocab.json` object mapping token string to id.
    pub fn from_json(content: &str) -> crate::Result<Self> {
        let forward: HashMap<String, usize> = serde_json::from_str(content)
            .map_err(|e| crate::Error::Model(format!("Failed to parse vocab.json: {e}")))?;

        let size = forward.len();
        let mut tokens = vec![String::new(); size];
        for (token, id) in forward {
            if id >= size {
                return Err(crate::Error::Model(format!(
                    "Vocabulary id {id} out of range for {size} tokens"
                )));
            }
            tokens[id] = token;
        }
        Self::from_tokens(tokens)
    }

    /// Parse a `vocab.txt` file, one token per line (`token` or
    /// `token index`).
    pub fn from_lines(content: &str) -> crate::Result<Self> {
        let tokens: Vec<String> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.split_whitespace().next().unwrap_or("").to_string())
            .collect();
        Self::from_tokens(tokens)
    }

    pub fn size(&self) -> usize {
        self.tokens.len()
    }

    pub fn blank(&self) -> TokenId {
        self.blank
    }

    pub fn word_delimiter(&self) -> Option<TokenId> {
        self.word_delimiter
    }

    pub fn id(&self, token: &str) -> Option<TokenId> {
        self.index.get(token).copied()
    }

    pub fn name(&self, id: TokenId) -> Option<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|id| self.tokens.get(id))
            .map(String::as_str)
    }
}
