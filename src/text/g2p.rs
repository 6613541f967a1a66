//! Grapheme-to-phoneme lexicon
//!
//! The tokenizer treats pronunciation as an opaque callable. Two
//! implementations: a dictionary loaded from a lexicon file, and a spelling
//! fallback that maps letters straight to the character vocabulary of
//! wav2vec2-style models.

use crate::align::TokenId;
use crate::asr::model::Vocabulary;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Opaque word-to-acoustic-tokens callable.
pub trait Lexicon: Send + Sync {
    /// Pronounce one word. An empty result means the word has no acoustic
    /// realization and contributes no tokens.
    fn pronounce(&self, word: &str) -> Vec<TokenId>;
}

/// Letter-by-letter pronunciation against a character vocabulary.
pub struct SpellingLexicon {
    by_char: HashMap<char, TokenId>,
}

impl SpellingLexicon {
    pub fn new(vocab: &Vocabulary) -> Self {
        let mut by_char = HashMap::new();
        for id in 0..vocab.size() as TokenId {
            let Some(name) = vocab.name(id) else { continue };
            let mut chars = name.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                for upper in c.to_uppercase() {
                    by_char.insert(upper, id);
                }
            }
        }
        Self { by_char }
    }
}

impl Lexicon for SpellingLexicon {
    fn pronounce(&self, word: &str) -> Vec<TokenId> {
        word.chars()
            .flat_map(char::to_uppercase)
            .filter_map(|c| self.by_char.get(&c).copied())
            .collect()
    }
}

/// Dictionary-backed pronunciation with spelling fallback for words the
/// dictionary does not know.
pub struct DictLexicon {
    entries: HashMap<String, Vec<TokenId>>,
    fallback: SpellingLexicon,
}

impl DictLexicon {
    /// Load a lexicon file: one `word phone phone ...` entry per line, phones
    /// resolved against the vocabulary. Lines with unknown phones are
    /// skipped.
    pub fn from_file(path: &Path, vocab: &Vocabulary) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut entries = HashMap::new();
        let mut skipped = 0usize;

        for line in content.lines() {
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else { continue };
            let phones: Option<Vec<TokenId>> = fields.map(|phone| vocab.id(phone)).collect();
            match phones {
                Some(phones) if !phones.is_empty() => {
                    entries.insert(word.to_lowercase(), phones);
                }
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!(skipped, "lexicon entries with unknown phones were skipped");
        }
        debug!(entries = entries.len(), "lexicon loaded");

        Ok(Self {
            entries,
            fallback: SpellingLexicon::new(vocab),
        })
    }
}

impl Lexicon for DictLexicon {
    fn pronounce(&self, word: &str) -> Vec<TokenId> {
        if let Some(phones) = self.entries.get(&word.to_lowercase()) {
            return phones.clone();
        }
        self.fallback.pronounce(word)
    }
}
