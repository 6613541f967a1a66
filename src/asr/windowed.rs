//! Windowed Recognizer
//!
//! Drives an acoustic model over fixed-size sample chunks with left and right
//! context strides. The model's outermost frames are contaminated by the
//! chunk boundary, so only the stable inner frames are emitted downstream;
//! consecutive chunks overlap by the two strides to cover the discarded
//! regions. The right stride delays output by one chunk.

use super::model::AcousticModel;
use crate::align::emission::EmissionBuffer;
use std::sync::Arc;
use tracing::debug;

/// Streaming front-end over an [`AcousticModel`].
pub struct WindowedRecognizer {
    model: Arc<dyn AcousticModel>,
    /// Samples per model invocation
    chunk_len: usize,
    /// Leading samples whose frames are discarded
    left_stride: usize,
    /// Trailing samples whose frames are discarded
    right_stride: usize,
    buffer: Vec<f32>,
}

impl WindowedRecognizer {
    /// Build with window sizes in samples. All three must be multiples of the
    /// model frame stride, with `chunk_len >= left_stride + right_stride > 0`.
    pub fn new(
        model: Arc<dyn AcousticModel>,
        chunk_len: usize,
        left_stride: usize,
        right_stride: usize,
    ) -> crate::Result<Self> {
        let stride = model.frame_stride();
        if stride == 0 {
            return Err(crate::Error::Model(
                "Model reports a zero frame stride".to_string(),
            ));
        }
        for (name, value) in [
            ("chunk_len", chunk_len),
            ("left_stride", left_stride),
            ("right_stride", right_stride),
        ] {
            if !value.is_multiple_of(stride) {
                return Err(crate::Error::InvalidInput(format!(
                    "{name} ({value}) is not a multiple of the frame stride ({stride})"
                )));
            }
        }
        let strides = left_stride + right_stride;
        if strides == 0 || chunk_len < strides {
            return Err(crate::Error::InvalidInput(format!(
                "Chunk length ({chunk_len}) must cover both strides ({left_stride} + {right_stride})"
            )));
        }

        Ok(Self {
            model,
            chunk_len,
            left_stride,
            right_stride,
            buffer: Vec::with_capacity(chunk_len),
        })
    }

    /// Build with window sizes in seconds, quantized to the model frame
    /// stride.
    pub fn from_seconds(
        model: Arc<dyn AcousticModel>,
        chunk_secs: f32,
        left_secs: f32,
        right_secs: f32,
    ) -> crate::Result<Self> {
        let rate = model.sample_rate() as f32;
        let stride = model.frame_stride();
        let quantize =
            |secs: f32| (secs * rate / stride as f32).round().max(0.0) as usize * stride;
        let (chunk_len, left, right) =
            (quantize(chunk_secs), quantize(left_secs), quantize(right_secs));
        Self::new(model, chunk_len, left, right)
    }

    /// Append samples and return the emission frames that became stable.
    /// Output is empty until a full chunk has accumulated; leftover samples
    /// stay buffered for the next call.
    pub fn update(&mut self, samples: &[f32]) -> crate::Result<EmissionBuffer> {
        let stride = self.model.frame_stride();
        let left_frames = self.left_stride / stride;
        let right_frames = self.right_stride / stride;

        let mut out = EmissionBuffer::new(self.model.vocab().size());
        let mut samples = samples;

        while self.buffer.len() + samples.len() >= self.chunk_len {
            let take = self.chunk_len - self.buffer.len();
            self.buffer.extend_from_slice(&samples[..take]);
            samples = &samples[take..];

            let emissions = self.model.infer(&self.buffer)?;
            let frames = emissions.frames();
            let from = left_frames.min(frames);
            let to = frames.saturating_sub(right_frames).max(from);
            let view = emissions.view();
            for frame in from..to {
                out.push_frame(view.frame(frame));
            }
            debug!(
                chunk_frames = frames,
                emitted = to - from,
                "recognized chunk"
            );

            // the next chunk re-reads the samples behind both strides
            let shift = self.chunk_len - (self.left_stride + self.right_stride);
            self.buffer.drain(0..shift);
        }
        self.buffer.extend_from_slice(samples);

        Ok(out)
    }

    /// Drop buffered samples; downstream consumers should reset too.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::mock::{char_vocabulary, MockModel};

    const STRIDE: usize = 4;

    fn model() -> Arc<dyn AcousticModel> {
        Arc::new(MockModel::new(Arc::new(char_vocabulary()), 16_000, STRIDE))
    }

    /// Samples encoding one emission frame per entry.
    fn samples(frame_tokens: &[i64]) -> Vec<f32> {
        let mut out = Vec::with_capacity(frame_tokens.len() * STRIDE);
        for &token in frame_tokens {
            out.extend(std::iter::repeat_n(token as f32, STRIDE));
        }
        out
    }

    fn argmax_tokens(buf: &EmissionBuffer) -> Vec<i64> {
        let view = buf.view();
        (0..buf.frames())
            .map(|t| {
                let frame = view.frame(t);
                frame
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(i, _)| i as i64)
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_rejects_bad_geometry() {
        assert!(WindowedRecognizer::new(model(), 8 * STRIDE, 0, 0).is_err());
        assert!(WindowedRecognizer::new(model(), 2 * STRIDE, STRIDE, 2 * STRIDE).is_err());
        assert!(WindowedRecognizer::new(model(), 8 * STRIDE + 1, STRIDE, STRIDE).is_err());
        assert!(WindowedRecognizer::new(model(), 8 * STRIDE, STRIDE, STRIDE).is_ok());
    }

    #[test]
    fn test_no_output_before_full_chunk() {
        let mut recognizer = WindowedRecognizer::new(model(), 8 * STRIDE, STRIDE, STRIDE).unwrap();
        let out = recognizer.update(&samples(&[5, 6, 7])).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_emits_inner_frames_only() {
        // chunk of 8 frames, one frame trimmed on each side
        let mut recognizer = WindowedRecognizer::new(model(), 8 * STRIDE, STRIDE, STRIDE).unwrap();
        let out = recognizer
            .update(&samples(&[1, 2, 3, 4, 5, 6, 7, 8]))
            .unwrap();
        assert_eq!(argmax_tokens(&out), vec![2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_chunks_overlap_continuously() {
        // two chunks: the second re-reads the strides of the first, so the
        // emitted stream is gapless after the initial trimmed frame
        let frame_tokens: Vec<i64> = (1..=14).collect();
        let mut recognizer = WindowedRecognizer::new(model(), 8 * STRIDE, STRIDE, STRIDE).unwrap();
        let out = recognizer.update(&samples(&frame_tokens)).unwrap();
        assert_eq!(argmax_tokens(&out), (2..=13).collect::<Vec<i64>>());
    }

    #[test]
    fn test_prefix_stability() {
        // frames emitted for a prefix never change when more input arrives
        let frame_tokens: Vec<i64> = (1..=20).collect();

        let mut all_at_once = WindowedRecognizer::new(model(), 8 * STRIDE, STRIDE, STRIDE).unwrap();
        let whole = all_at_once.update(&samples(&frame_tokens)).unwrap();

        let mut dribbled = WindowedRecognizer::new(model(), 8 * STRIDE, STRIDE, STRIDE).unwrap();
        let mut collected = Vec::new();
        for chunk in samples(&frame_tokens).chunks(7) {
            let out = dribbled.update(chunk).unwrap();
            collected.extend(argmax_tokens(&out));
        }

        assert_eq!(argmax_tokens(&whole), collected);
    }

    #[test]
    fn test_reset_discards_buffer() {
        let mut recognizer = WindowedRecognizer::new(model(), 8 * STRIDE, STRIDE, STRIDE).unwrap();
        recognizer.update(&samples(&[1, 2, 3])).unwrap();
        recognizer.reset();
        // after reset the partial chunk is gone; a fresh full chunk starts over
        let out = recognizer
            .update(&samples(&[1, 2, 3, 4, 5, 6, 7, 8]))
            .unwrap();
        assert_eq!(argmax_tokens(&out), vec![2, 3, 4, 5, 6, 7]);
    }
}
