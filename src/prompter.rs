//! Prompter
//!
//! Owns the script, its tokenization and the cursor. Audio flows through the
//! windowed recognizer; the unmatched token suffix is cut into small
//! sub-targets that are matched one by one, so each trellis stays cheap and
//! the matcher cannot lock onto a word far ahead of the reader.

use crate::align::emission::Emissions;
use crate::align::online::OnlineMatcher;
use crate::align::viterbi::ViterbiMatcher;
use crate::align::TokenId;
use crate::asr::windowed::WindowedRecognizer;
use crate::text::Tokenizer;
use std::sync::Arc;
use tracing::debug;

/// Script follower for one client session.
pub struct Prompter {
    tokenizer: Arc<dyn Tokenizer>,
    recognizer: WindowedRecognizer,
    matcher: OnlineMatcher<ViterbiMatcher>,
    text: String,
    text_chars: usize,
    tokens: Vec<TokenId>,
    offsets: Vec<usize>,
    /// Count of tokens considered already matched
    cursor: usize,
    min_chunk_tokens: usize,
    lookahead_tokens: usize,
}

impl Prompter {
    pub fn new(
        tokenizer: Arc<dyn Tokenizer>,
        recognizer: WindowedRecognizer,
        matcher: OnlineMatcher<ViterbiMatcher>,
        min_chunk_tokens: usize,
        lookahead_tokens: usize,
    ) -> Self {
        Self {
            tokenizer,
            recognizer,
            matcher,
            text: String::new(),
            text_chars: 0,
            tokens: Vec::new(),
            offsets: Vec::new(),
            cursor: 0,
            min_chunk_tokens: min_chunk_tokens.max(1),
            lookahead_tokens,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the script and position the cursor at `char_pos`.
    pub fn set_text(&mut self, text: &str, char_pos: usize) -> crate::Result<()> {
        let (tokens, offsets) = self.tokenizer.tokenize(text)?;
        debug!(tokens = tokens.len(), "script tokenized");
        self.text = text.to_string();
        self.text_chars = text.chars().count();
        self.tokens = tokens;
        self.offsets = offsets;
        self.set_cursor(char_pos);
        Ok(())
    }

    /// Reposition the cursor: the token cursor becomes the greatest `i` with
    /// `offsets[i] <= char_offset`. Clears all recognition state so stale
    /// audio cannot produce matches for the old position.
    pub fn set_cursor(&mut self, char_offset: usize) {
        let i = self.offsets.partition_point(|&offset| offset <= char_offset);
        self.cursor = i.saturating_sub(1);
        self.recognizer.reset();
        self.matcher.reset();
    }

    /// The current position as a character offset into the script.
    pub fn cursor_offset(&self) -> usize {
        match self.offsets.get(self.cursor) {
            Some(&offset) => offset.min(self.text_chars),
            None => self.text_chars,
        }
    }

    /// The current position as a token index.
    pub fn token_cursor(&self) -> usize {
        self.cursor
    }

    /// Lookahead override, in tokens past the cursor.
    pub fn set_lookahead(&mut self, tokens: usize) {
        self.lookahead_tokens = tokens;
    }

    pub fn set_min_chunk_tokens(&mut self, tokens: usize) {
        self.min_chunk_tokens = tokens.max(1);
    }

    pub fn set_min_match_weight(&mut self, weight: f32) {
        self.matcher.inner_mut().set_min_mean_weight(weight);
    }

    /// Feed raw audio and advance the cursor over whatever the matcher
    /// accepts. The cursor never moves backward here.
    pub fn update(&mut self, samples: &[f32]) -> crate::Result<()> {
        let batch = self.recognizer.update(samples)?;
        if batch.is_empty() {
            return Ok(());
        }

        let n = self.tokens.len();
        let vocab = batch.vocab();
        let mut fed = false;
        let mut current = self.cursor;

        while current + self.min_chunk_tokens <= (self.cursor + self.lookahead_tokens).min(n) {
            // cut the next sub-target, preferring to end at a word boundary
            let mut next = current;
            while next < n
                && (next - current < self.min_chunk_tokens || !self.is_boundary(next))
            {
                next += 1;
            }

            // the emission batch enters the matcher context once; later
            // sub-targets are matched against the retained context
            let emissions = if fed {
                Emissions::empty(vocab)
            } else {
                batch.view()
            };
            fed = true;

            let matched = self.matcher.feed(emissions, &self.tokens[current..next])?;

            // the boundary token itself needs no acoustic evidence
            let skip_boundary = next < n && self.is_boundary(next);
            let advanced = (next + usize::from(skip_boundary)).min(n);
            if let Some(range) = matched {
                debug!(
                    fragment = %self.fragment(current + range.start, current + range.end),
                    cursor = advanced,
                    "match accepted"
                );
                self.cursor = advanced;
            }
            current = advanced;
        }

        Ok(())
    }

    fn is_boundary(&self, index: usize) -> bool {
        match self.tokenizer.space_token() {
            Some(space) => self.tokens[index] == space,
            // without a boundary token every index may end a sub-target
            None => true,
        }
    }

    fn fragment(&self, from: usize, to: usize) -> String {
        self.tokens[from..to]
            .iter()
            .filter_map(|&token| self.tokenizer.lookup(token))
            .collect()
    }
}
