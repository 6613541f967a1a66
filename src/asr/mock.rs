//! Mock Acoustic Model
//!
//! Deterministic model for exercising the alignment pipeline without a real
//! acoustic backend. Each frame's emission peaks at the token id encoded in
//! the frame's first sample, so a test can script an exact emission stream by
//! choosing its input samples.

use super::model::{AcousticModel, Vocabulary};
use crate::align::emission::EmissionBuffer;
use crate::align::TokenId;
use std::sync::Arc;

/// Probability mass assigned to the encoded token of each frame.
const PEAK: f32 = 0.8;

/// Scriptable acoustic model for tests and pipeline dry runs.
pub struct MockModel {
    vocab: Arc<Vocabulary>,
    sample_rate: u32,
    frame_stride: usize,
}

impl MockModel {
    pub fn new(vocab: Arc<Vocabulary>, sample_rate: u32, frame_stride: usize) -> Self {
        Self {
            vocab,
            sample_rate,
            frame_stride,
        }
    }

    /// Encode one emission frame per entry: every sample of the frame carries
    /// the token id the emission should peak at.
    pub fn samples_for(&self, frame_tokens: &[TokenId]) -> Vec<f32> {
        let mut out = Vec::with_capacity(frame_tokens.len() * self.frame_stride);
        for &token in frame_tokens {
            out.extend(std::iter::repeat_n(token as f32, self.frame_stride));
        }
        out
    }
}

impl AcousticModel for MockModel {
    fn infer(&self, samples: &[f32]) -> crate::Result<EmissionBuffer> {
        let vocab_size = self.vocab.size();
        let frames = samples.len() / self.frame_stride;
        let low = ((1.0 - PEAK) / (vocab_size as f32 - 1.0)).ln();
        let high = PEAK.ln();

        let mut out = EmissionBuffer::new(vocab_size);
        let mut frame = vec![low; vocab_size];
        for f in 0..frames {
            let encoded = samples[f * self.frame_stride].round();
            let token = if encoded >= 0.0 && (encoded as usize) < vocab_size {
                encoded as usize
            } else {
                self.vocab.blank() as usize
            };
            frame.fill(low);
            frame[token] = high;
            out.push_frame(&frame);
        }
        Ok(out)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_stride(&self) -> usize {
        self.frame_stride
    }

    fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }
}

/// The character vocabulary of a wav2vec2-style CTC model: blank, specials,
/// the word delimiter and the English letters. Used by tests and dry runs.
pub fn char_vocabulary() -> Vocabulary {
    let tokens = [
        "<pad>", "<s>", "</s>", "<unk>", "|", "E", "T", "A", "O", "N", "I", "H", "S", "R", "D",
        "L", "U", "M", "W", "C", "F", "G", "Y", "P", "B", "V", "K", "'", "X", "J", "Q", "Z",
    ];
    Vocabulary::from_tokens(tokens.iter().map(|t| t.to_string()).collect())
        .expect("static vocabulary is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_vocabulary_layout() {
        let vocab = char_vocabulary();
        assert_eq!(vocab.blank(), 0);
        assert_eq!(vocab.word_delimiter(), Some(4));
        assert_eq!(vocab.id("E"), Some(5));
        assert_eq!(vocab.size(), 32);
    }

    #[test]
    fn test_emissions_follow_encoded_tokens() {
        let model = MockModel::new(Arc::new(char_vocabulary()), 16_000, 4);
        let samples = model.samples_for(&[5, 0, 7]);
        let out = model.infer(&samples).unwrap();
        assert_eq!(out.frames(), 3);
        let view = out.view();
        assert!(view.prob(5, 0) > view.prob(6, 0));
        assert!(view.prob(0, 1) > view.prob(5, 1));
        assert!(view.prob(7, 2) > view.prob(0, 2));
    }

    #[test]
    fn test_out_of_range_sample_becomes_blank() {
        let model = MockModel::new(Arc::new(char_vocabulary()), 16_000, 2);
        let out = model.infer(&model.samples_for(&[999])).unwrap();
        let view = out.view();
        assert!(view.prob(0, 0) > view.prob(1, 0));
    }

    #[test]
    fn test_partial_frame_ignored() {
        let model = MockModel::new(Arc::new(char_vocabulary()), 16_000, 4);
        let out = model.infer(&[5.0; 6]).unwrap();
        assert_eq!(out.frames(), 1);
    }
}
