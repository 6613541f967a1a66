//! Viterbi trellis matcher
//!
//! Builds a CTC-style dynamic-programming trellis over (token, frame) and
//! backtracks the best alignment path. Adapted from the forced-alignment
//! trellis of <https://pytorch.org/audio/stable/tutorials/forced_alignment_tutorial.html>,
//! extended with a bounded-length path search over candidate tails so a match
//! can start and end anywhere inside the emission window.

use super::emission::Emissions;
use super::{Matcher, TokenId};
use ndarray::Array2;
use std::collections::HashSet;
use std::ops::Range;

/// A successful alignment: the (token row, frame) track and the matched
/// sub-range of the token slice handed to the matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMatch {
    /// Time-ordered path points; rows non-decreasing, frames strictly
    /// increasing.
    pub path: Vec<(usize, usize)>,
    /// Matched token indices, relative to the input slice.
    pub tokens: Range<usize>,
}

impl TokenMatch {
    /// Context column of the last frame the match consumed.
    pub fn end_frame(&self) -> usize {
        self.path.last().map(|&(_, t)| t).unwrap_or(0)
    }
}

/// Trellis matcher with acceptance thresholds.
#[derive(Debug, Clone)]
pub struct ViterbiMatcher {
    blank_token: TokenId,
    min_path_length: usize,
    min_mean_weight: f32,
}

/// Signed (row, frame) position; negative coordinates mark a path that walked
/// off the trellis.
type Pos = (i32, i32);

struct SearchCtx<'a> {
    min_len: i32,
    min_weight: f32,
    emissions: Emissions<'a>,
    backtrack: &'a Array2<i8>,
    tokens: &'a [TokenId],
}

impl SearchCtx<'_> {
    #[inline]
    fn prev(&self, pos: Pos) -> Pos {
        let step = self.backtrack[[pos.0 as usize, pos.1 as usize]] as i32;
        (pos.0 + step, pos.1 - 1)
    }

    #[inline]
    fn emission_at(&self, pos: Pos) -> f32 {
        self.emissions
            .prob(self.tokens[pos.0 as usize], pos.1 as usize)
    }
}

/// A candidate path identified by its tail, advanced backward one transition
/// at a time while the tail is trimmed to keep the transition count at the
/// configured length.
#[derive(Debug, Clone, Copy)]
struct Path {
    head: Pos,
    tail: Pos,
    weight_sum: f64,
}

impl Path {
    fn new(pos: Pos) -> Self {
        Self {
            head: pos,
            tail: pos,
            weight_sum: 0.0,
        }
    }

    /// Transition count crossed between head and tail.
    fn len(&self) -> i32 {
        self.tail.0 - self.head.0
    }

    /// Geometric mean of the per-transition emission probabilities.
    fn weight(&self) -> f32 {
        let len = self.len();
        if len > 0 {
            (self.weight_sum / len as f64).exp() as f32
        } else {
            0.0
        }
    }

    fn finished(&self) -> bool {
        self.head.0 < 0 || self.head.1 < 0
    }

    fn advance(&mut self, ctx: &SearchCtx<'_>) {
        // walk the head back to the next transition
        while !self.finished() {
            let prev = ctx.prev(self.head);
            let emission = ctx.emission_at(self.head);
            let old = self.head;
            self.head = prev;
            if self.head.0 != old.0 {
                self.weight_sum += emission as f64;
                break;
            }
        }

        // trim the tail so the length never exceeds the match length; the
        // tail walks the same backtrack chain and stops short of the head
        while self.tail.1 > self.head.1 + 1 {
            let prev = ctx.prev(self.tail);
            if self.tail.0 != prev.0 {
                if self.len() <= ctx.min_len {
                    break;
                }
                self.weight_sum -= ctx.emission_at(self.tail) as f64;
            }
            self.tail = prev;
        }
    }

    /// Materialize the path points from just after the head through the tail.
    fn track(&self, ctx: &SearchCtx<'_>) -> Vec<(usize, usize)> {
        let mut res = Vec::new();
        let mut pos = self.tail;
        while pos != self.head {
            res.push((pos.0 as usize, pos.1 as usize));
            pos = ctx.prev(pos);
        }
        res.reverse();
        res
    }
}

struct Search<'a> {
    ctx: SearchCtx<'a>,
    seen: HashSet<Pos>,
    best: Option<Path>,
}

impl Search<'_> {
    fn process(&mut self, mut path: Path) {
        while !path.finished() {
            path.advance(&self.ctx);
            if path.len() >= self.ctx.min_len {
                if !self.seen.insert(path.tail) {
                    break;
                }
                // Choose the first acceptable match in the token sequence,
                // not the strongest one, so the cursor cannot leap over words
                // the speaker has not reached yet.
                if path.weight() >= self.ctx.min_weight
                    && self.best.is_none_or(|best| path.tail.0 < best.tail.0)
                {
                    self.best = Some(path);
                }
            }
        }
    }
}

impl ViterbiMatcher {
    pub fn new(blank_token: TokenId, min_path_length: usize, min_mean_weight: f32) -> Self {
        Self {
            blank_token,
            min_path_length,
            min_mean_weight,
        }
    }

    /// Runtime override of the acceptance threshold.
    pub fn set_min_mean_weight(&mut self, weight: f32) {
        self.min_mean_weight = weight;
    }

    fn validate_tokens(emissions: Emissions<'_>, tokens: &[TokenId]) -> crate::Result<()> {
        let vocab = emissions.vocab() as TokenId;
        for &token in tokens {
            if token < 0 || token >= vocab {
                return Err(crate::Error::InvalidInput(format!(
                    "Invalid token (token: {token}, vocabulary: {vocab})"
                )));
            }
        }
        Ok(())
    }

    /// Fill the backtrack table. For every (i, t) the path either stays on the
    /// same token consuming BLANK, or advances from the previous token
    /// consuming the token's own emission; the prior column is treated as zero
    /// at t = 0.
    fn build_backtrack(
        &self,
        emissions: Emissions<'_>,
        tokens: &[TokenId],
    ) -> Array2<i8> {
        let frames = emissions.frames();
        let rows = tokens.len();
        let mut backtrack = Array2::<i8>::zeros((rows, frames));

        // only one trellis column is live at a time
        let mut prev_col = vec![0.0f32; rows];
        let mut curr_col = vec![0.0f32; rows];

        for t in 0..frames {
            let blank = emissions.prob(self.blank_token, t);
            for i in 0..rows {
                let (prev_stay, prev_advance) = if t == 0 {
                    (0.0, 0.0)
                } else {
                    (prev_col[i], prev_col[i.saturating_sub(1)])
                };
                let stay = prev_stay + blank;
                let advance = prev_advance + emissions.prob(tokens[i], t);
                if stay > advance {
                    curr_col[i] = stay;
                } else {
                    curr_col[i] = advance;
                    backtrack[[i, t]] = -1;
                }
            }
            std::mem::swap(&mut prev_col, &mut curr_col);
        }

        backtrack
    }
}

impl Matcher for ViterbiMatcher {
    fn find_match(
        &self,
        emissions: Emissions<'_>,
        tokens: &[TokenId],
    ) -> crate::Result<Option<TokenMatch>> {
        let frames = emissions.frames();
        let rows = tokens.len();
        if rows == 0 || frames == 0 {
            return Ok(None);
        }
        Self::validate_tokens(emissions, tokens)?;

        let backtrack = self.build_backtrack(emissions, tokens);

        let mut search = Search {
            ctx: SearchCtx {
                min_len: self.min_path_length as i32,
                min_weight: self.min_mean_weight,
                emissions,
                backtrack: &backtrack,
                tokens,
            },
            seen: HashSet::new(),
            best: None,
        };

        // every row of the rightmost column is a candidate tail
        for i in (0..rows).rev() {
            search.process(Path::new((i as i32, frames as i32 - 1)));
        }

        // interior tails sit immediately before a transition edge: the cell
        // one row and one frame up is a transition, its left neighbor is not
        for t in (0..frames.saturating_sub(1)).rev() {
            for i in (0..rows.saturating_sub(1)).rev() {
                let edge = search.ctx.backtrack[[i + 1, t + 1]] != 0;
                let settled = search.ctx.backtrack[[i + 1, t]] != 0;
                if edge && !settled {
                    search.process(Path::new((i as i32, t as i32)));
                }
            }
        }

        let Some(best) = search.best else {
            return Ok(None);
        };
        if best.weight() < self.min_mean_weight {
            return Ok(None);
        }

        let track = best.track(&search.ctx);
        if track.is_empty() {
            return Ok(None);
        }

        let first = track[0].0;
        let last = track[track.len() - 1].0;
        Ok(Some(TokenMatch {
            tokens: first..last + 1,
            path: track,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::emission::EmissionBuffer;

    const VOCAB: usize = 6;
    const BLANK: TokenId = 0;

    /// One frame per entry, peaked at the given token with probability 0.8.
    fn peaked(sequence: &[TokenId]) -> EmissionBuffer {
        let mut buf = EmissionBuffer::new(VOCAB);
        let low = (0.2f32 / (VOCAB as f32 - 1.0)).ln();
        let high = 0.8f32.ln();
        for &token in sequence {
            let mut frame = vec![low; VOCAB];
            frame[token as usize] = high;
            buf.push_frame(&frame);
        }
        buf
    }

    #[test]
    fn test_follows_clean_sequence() {
        let matcher = ViterbiMatcher::new(BLANK, 3, 0.35);
        let emissions = peaked(&[1, 0, 2, 0, 3, 0]);
        let m = matcher
            .find_match(emissions.view(), &[1, 2, 3])
            .unwrap()
            .expect("clean sequence should match");
        assert_eq!(m.tokens, 0..3);

        // rows non-decreasing, frames strictly increasing
        for pair in m.path.windows(2) {
            assert!(pair[1].0 >= pair[0].0);
            assert!(pair[1].1 > pair[0].1);
        }
    }

    #[test]
    fn test_all_blank_yields_nothing() {
        let matcher = ViterbiMatcher::new(BLANK, 2, 0.1);
        let emissions = peaked(&[0, 0, 0, 0, 0, 0]);
        let m = matcher.find_match(emissions.view(), &[1, 2, 3]).unwrap();
        assert!(m.is_none());
    }

    #[test]
    fn test_matched_range_is_contiguous() {
        let matcher = ViterbiMatcher::new(BLANK, 2, 0.1);
        let emissions = peaked(&[1, 0, 2, 0, 3, 0, 4, 0]);
        if let Some(m) = matcher
            .find_match(emissions.view(), &[1, 2, 3, 4])
            .unwrap()
        {
            assert!(m.tokens.start < m.tokens.end);
            assert!(m.tokens.end <= 4);
        }
    }

    #[test]
    fn test_prefers_earliest_tail_row() {
        // both halves of the token sequence have a strong aligned region; the
        // earliest one must win even though both pass the threshold
        let matcher = ViterbiMatcher::new(BLANK, 2, 0.35);
        let emissions = peaked(&[1, 0, 2, 0, 1, 0, 2, 0]);
        let m = matcher
            .find_match(emissions.view(), &[1, 2, 1, 2])
            .unwrap()
            .expect("should match somewhere");
        assert_eq!(m.tokens.start, 0, "match must anchor at the earliest row");
    }

    #[test]
    fn test_threshold_rejects_weak_paths() {
        let matcher = ViterbiMatcher::new(BLANK, 3, 0.95);
        let emissions = peaked(&[1, 0, 2, 0, 3, 0]);
        let m = matcher.find_match(emissions.view(), &[1, 2, 3]).unwrap();
        assert!(m.is_none());
    }

    #[test]
    fn test_short_paths_rejected() {
        // only one transition is achievable, two are required
        let matcher = ViterbiMatcher::new(BLANK, 2, 0.1);
        let emissions = peaked(&[1, 0]);
        let m = matcher.find_match(emissions.view(), &[1]).unwrap();
        assert!(m.is_none());
    }

    #[test]
    fn test_invalid_token_rejected() {
        let matcher = ViterbiMatcher::new(BLANK, 2, 0.1);
        let emissions = peaked(&[1, 2]);
        let err = matcher
            .find_match(emissions.view(), &[1, VOCAB as TokenId])
            .unwrap_err();
        assert!(matches!(err, crate::Error::InvalidInput(_)));
    }

    #[test]
    fn test_empty_inputs() {
        let matcher = ViterbiMatcher::new(BLANK, 2, 0.1);
        let emissions = peaked(&[1, 2]);
        assert!(matcher.find_match(emissions.view(), &[]).unwrap().is_none());
        let empty = EmissionBuffer::new(VOCAB);
        assert!(
            matcher
                .find_match(empty.view(), &[1, 2])
                .unwrap()
                .is_none()
        );
    }
}
