//! Script Tokenizer
//!
//! Splits script text into words, pronounces each word through the lexicon
//! and spreads the word's character span proportionally across its tokens so
//! the cursor advances through a long word instead of jumping over it.

use super::g2p::Lexicon;
use super::Tokenizer;
use crate::align::TokenId;
use crate::asr::model::Vocabulary;
use std::sync::Arc;

/// Word-oriented tokenizer over an acoustic vocabulary.
pub struct ScriptTokenizer {
    vocab: Arc<Vocabulary>,
    lexicon: Arc<dyn Lexicon>,
}

struct Word {
    /// Character offset of the first codepoint
    start: usize,
    /// Length in codepoints
    len: usize,
    text: String,
}

impl ScriptTokenizer {
    pub fn new(vocab: Arc<Vocabulary>, lexicon: Arc<dyn Lexicon>) -> Self {
        Self { vocab, lexicon }
    }

    /// Maximal runs of non-whitespace codepoints, with their character spans.
    fn split_words(text: &str) -> Vec<Word> {
        let mut words = Vec::new();
        let mut current = String::new();
        let mut start = 0;
        let mut pos = 0;
        for c in text.chars() {
            if c.is_whitespace() {
                if !current.is_empty() {
                    words.push(Word {
                        start,
                        len: pos - start,
                        text: std::mem::take(&mut current),
                    });
                }
            } else {
                if current.is_empty() {
                    start = pos;
                }
                current.push(c);
            }
            pos += 1;
        }
        if !current.is_empty() {
            words.push(Word {
                start,
                len: pos - start,
                text: current,
            });
        }
        words
    }
}

impl Tokenizer for ScriptTokenizer {
    fn tokenize(&self, text: &str) -> crate::Result<(Vec<TokenId>, Vec<usize>)> {
        let mut tokens = Vec::new();
        let mut offsets = Vec::new();
        let mut prev_end: Option<usize> = None;

        for word in Self::split_words(text) {
            let phones = self.lexicon.pronounce(&word.text);
            if phones.is_empty() {
                continue;
            }

            // word boundary between adjacent pronounced words, anchored at
            // the separator
            if let (Some(end), Some(space)) = (prev_end, self.space_token()) {
                tokens.push(space);
                offsets.push(end);
            }

            // spread the word's span proportionally across its tokens
            for (j, &phone) in phones.iter().enumerate() {
                tokens.push(phone);
                offsets.push(word.start + (word.len - 1).min(word.len * j / phones.len()));
            }
            prev_end = Some(word.start + word.len);
        }

        Ok((tokens, offsets))
    }

    fn blank_token(&self) -> TokenId {
        self.vocab.blank()
    }

    fn space_token(&self) -> Option<TokenId> {
        self.vocab.word_delimiter()
    }

    fn lookup(&self, token: TokenId) -> Option<&str> {
        self.vocab.name(token)
    }
}
