//! Online matcher
//!
//! Accumulates a bounded emission context across calls, runs the inner
//! matcher on sub-batches that fit the context, drops columns a match has
//! consumed and carries a trailing overlap of frames between sub-batches so
//! cross-chunk continuity is preserved without re-scanning history.

use super::emission::Emissions;
use super::{Matcher, TokenId};
use std::ops::Range;
use tracing::trace;

/// Streaming wrapper around a [`Matcher`] with a bounded emission context.
#[derive(Debug)]
pub struct OnlineMatcher<M> {
    inner: M,
    /// Context capacity in frames
    capacity: usize,
    /// Frames carried over after each sub-batch
    overlap: usize,
    /// Frame-major unconsumed columns
    context: Vec<f32>,
    vocab: usize,
}

impl<M: Matcher> OnlineMatcher<M> {
    pub fn new(inner: M, capacity: usize, overlap: usize) -> crate::Result<Self> {
        if capacity == 0 || overlap >= capacity {
            return Err(crate::Error::InvalidInput(format!(
                "Invalid context size (capacity: {capacity}, overlap: {overlap})"
            )));
        }
        Ok(Self {
            inner,
            capacity,
            overlap,
            context: Vec::new(),
            vocab: 0,
        })
    }

    pub fn inner_mut(&mut self) -> &mut M {
        &mut self.inner
    }

    /// Unconsumed context columns currently held.
    pub fn context_frames(&self) -> usize {
        if self.vocab == 0 { 0 } else { self.context.len() / self.vocab }
    }

    /// Drop all accumulated context. Called when the cursor is repositioned.
    pub fn reset(&mut self) {
        self.context.clear();
    }

    fn drop_leading_frames(&mut self, frames: usize) {
        self.context.drain(0..frames * self.vocab);
    }

    /// Feed new emission columns and attempt to align `tokens` against the
    /// context. A call with an empty batch still runs the inner matcher once
    /// against whatever context is held.
    ///
    /// Returns the last accepted matched range, as indices into `tokens`.
    pub fn feed(
        &mut self,
        emissions: Emissions<'_>,
        tokens: &[TokenId],
    ) -> crate::Result<Option<Range<usize>>> {
        if self.vocab == 0 {
            self.vocab = emissions.vocab();
        } else if !emissions.is_empty() && emissions.vocab() != self.vocab {
            return Err(crate::Error::InvalidInput(format!(
                "Emission vocabulary changed ({} -> {})",
                self.vocab,
                emissions.vocab()
            )));
        }

        let total = emissions.frames();
        let mut consumed = 0;
        let mut token_start = 0;
        let mut result: Option<Range<usize>> = None;

        loop {
            // fill the context up to capacity from the pending columns
            let room = self.capacity - self.context_frames();
            let take = room.min(total - consumed);
            if take > 0 {
                self.context
                    .extend_from_slice(emissions.frame_range(consumed, consumed + take));
                consumed += take;
            }
            if self.context_frames() > self.capacity {
                return Err(crate::Error::Internal(format!(
                    "Emission context overflow ({} > {})",
                    self.context_frames(),
                    self.capacity
                )));
            }

            if !self.context.is_empty() && token_start < tokens.len() {
                let context = Emissions::new(&self.context, self.vocab);
                if let Some(m) = self.inner.find_match(context, &tokens[token_start..])? {
                    let end_frame = m.end_frame();
                    trace!(
                        tokens = ?m.tokens,
                        end_frame,
                        "sub-batch match, dropping consumed columns"
                    );
                    // columns up to and including the match end are consumed
                    self.drop_leading_frames(end_frame + 1);
                    result = Some(token_start + m.tokens.start..token_start + m.tokens.end);
                    token_start += m.tokens.end;
                }
            }

            // carry over at most `overlap` trailing columns
            let held = self.context_frames();
            if held > self.overlap {
                self.drop_leading_frames(held - self.overlap);
            }

            if consumed >= total {
                break;
            }
        }

        Ok(result)
    }
}
