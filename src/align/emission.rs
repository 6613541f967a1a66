//! Emission matrix storage and views
//!
//! Emissions are per-frame log-probability vectors over the acoustic
//! vocabulary. Storage is frame-major: the values of one frame are contiguous,
//! frames follow each other in time order.

use super::TokenId;

/// Owned emission storage produced by a recognizer.
#[derive(Debug, Clone, Default)]
pub struct EmissionBuffer {
    data: Vec<f32>,
    vocab: usize,
}

impl EmissionBuffer {
    /// Create an empty buffer for the given vocabulary size.
    pub fn new(vocab: usize) -> Self {
        Self {
            data: Vec::new(),
            vocab,
        }
    }

    /// Create a buffer from frame-major data. The data length must be a
    /// multiple of the vocabulary size.
    pub fn from_frames(data: Vec<f32>, vocab: usize) -> crate::Result<Self> {
        if vocab == 0 || !data.len().is_multiple_of(vocab) {
            return Err(crate::Error::Internal(format!(
                "Emission data length {} is not a multiple of vocabulary size {}",
                data.len(),
                vocab
            )));
        }
        Ok(Self { data, vocab })
    }

    pub fn vocab(&self) -> usize {
        self.vocab
    }

    pub fn frames(&self) -> usize {
        if self.vocab == 0 { 0 } else { self.data.len() / self.vocab }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append one frame worth of log-probabilities.
    pub fn push_frame(&mut self, frame: &[f32]) {
        debug_assert_eq!(frame.len(), self.vocab);
        self.data.extend_from_slice(frame);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Borrow the whole buffer as a view.
    pub fn view(&self) -> Emissions<'_> {
        Emissions {
            data: &self.data,
            vocab: self.vocab,
        }
    }
}

/// Borrowed, read-only view of an emission matrix.
///
/// The matcher works exclusively on this type so emission storage is never
/// retained past a single call.
#[derive(Debug, Clone, Copy)]
pub struct Emissions<'a> {
    data: &'a [f32],
    vocab: usize,
}

impl<'a> Emissions<'a> {
    /// View over frame-major data; panics in debug builds on a ragged length.
    pub fn new(data: &'a [f32], vocab: usize) -> Self {
        debug_assert!(vocab > 0 && data.len().is_multiple_of(vocab));
        Self { data, vocab }
    }

    /// A view with zero frames, useful for running the matcher against
    /// previously accumulated context only.
    pub fn empty(vocab: usize) -> Self {
        Self { data: &[], vocab }
    }

    pub fn vocab(&self) -> usize {
        self.vocab
    }

    pub fn frames(&self) -> usize {
        if self.vocab == 0 { 0 } else { self.data.len() / self.vocab }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Log-probability of `token` at frame `t`.
    #[inline]
    pub fn prob(&self, token: TokenId, t: usize) -> f32 {
        self.data[t * self.vocab + token as usize]
    }

    /// One frame's log-probability vector.
    #[inline]
    pub fn frame(&self, t: usize) -> &'a [f32] {
        &self.data[t * self.vocab..(t + 1) * self.vocab]
    }

    /// The raw frame-major slice covering frames `[from, to)`.
    pub fn frame_range(&self, from: usize, to: usize) -> &'a [f32] {
        &self.data[from * self.vocab..to * self.vocab]
    }
}
