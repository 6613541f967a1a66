//! ONNX Runtime Backend
//!
//! Wav2vec2-style CTC acoustic model behind ONNX Runtime: raw samples in,
//! log-softmaxed emissions out. The session is shared across client sessions
//! behind a mutex; ONNX Runtime itself is initialized once per process.

use super::model::{AcousticModel, Vocabulary};
use crate::align::emission::EmissionBuffer;
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use ort::{session::Session, session::builder::GraphOptimizationLevel, value::Value};

// Initialize ONNX Runtime environment once at module load
use std::sync::Once;

static INIT_ORT: Once = Once::new();

fn init_ort_environment() {
    INIT_ORT.call_once(|| {
        let _ = ort::init().with_name("autocue").commit();
        info!("ONNX Runtime environment initialized");
    });
}

/// Model directory metadata (`config.json`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct ModelSpec {
    sampling_rate: u32,
    /// Input samples per output logit frame
    inputs_to_logits_ratio: usize,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            sampling_rate: 16_000,
            inputs_to_logits_ratio: 320,
        }
    }
}

/// ONNX Runtime acoustic backend.
pub struct OnnxModel {
    session: Mutex<Session>,
    vocab: Arc<Vocabulary>,
    spec: ModelSpec,
    model_dir: PathBuf,
}

impl OnnxModel {
    /// Load a model directory: `model.onnx`, its `config.json` and a
    /// vocabulary (`vocab.json` or `vocab.txt`).
    pub fn load(model_dir: &Path, threads: usize) -> crate::Result<Self> {
        info!("Loading acoustic model from: {:?}", model_dir);

        init_ort_environment();

        if !model_dir.is_dir() {
            return Err(crate::Error::Model(format!(
                "Model directory not found: {model_dir:?}"
            )));
        }

        let model_path = Self::find_model_path(model_dir)?;
        let spec = Self::load_spec(model_dir)?;
        let vocab = Arc::new(Self::load_vocab(model_dir)?);

        let model_bytes = std::fs::read(&model_path)
            .map_err(|e| crate::Error::Model(format!("Failed to read model file: {e}")))?;

        info!("Model file size: {} MB", model_bytes.len() / (1024 * 1024));

        let session = Session::builder()
            .map_err(|e| crate::Error::Model(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| crate::Error::Model(format!("Failed to set optimization level: {e}")))?
            .with_intra_threads(threads.max(1))
            .map_err(|e| crate::Error::Model(format!("Failed to set thread count: {e}")))?
            .commit_from_memory(&model_bytes)
            .map_err(|e| crate::Error::Model(format!("Failed to load ONNX model: {e}")))?;

        info!(
            "Acoustic model loaded (vocabulary: {}, sample rate: {}, frame stride: {})",
            vocab.size(),
            spec.sampling_rate,
            spec.inputs_to_logits_ratio
        );

        Ok(Self {
            session: Mutex::new(session),
            vocab,
            spec,
            model_dir: model_dir.to_path_buf(),
        })
    }

    /// The directory the model was loaded from; auxiliary assets (lexicon)
    /// live next to it.
    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn vocabulary(&self) -> Arc<Vocabulary> {
        Arc::clone(&self.vocab)
    }

    fn find_model_path(model_dir: &Path) -> crate::Result<PathBuf> {
        let candidates = [
            model_dir.join("model.int8.onnx"),
            model_dir.join("model.onnx"),
        ];
        for path in &candidates {
            if path.is_file() {
                info!("Found model at: {:?}", path);
                return Ok(path.clone());
            }
        }
        Err(crate::Error::Model(format!(
            "Model file not found in {model_dir:?}\nExpected one of: model.int8.onnx, model.onnx"
        )))
    }

    fn load_spec(model_dir: &Path) -> crate::Result<ModelSpec> {
        let config_path = model_dir.join("config.json");
        if !config_path.exists() {
            info!("config.json not found, using defaults");
            return Ok(ModelSpec::default());
        }
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| crate::Error::Model(format!("Failed to read config file: {e}")))?;
        serde_json::from_str(&content)
            .map_err(|e| crate::Error::Model(format!("Failed to parse config JSON: {e}")))
    }

    fn load_vocab(model_dir: &Path) -> crate::Result<Vocabulary> {
        let json_path = model_dir.join("vocab.json");
        if json_path.exists() {
            let content = std::fs::read_to_string(&json_path)
                .map_err(|e| crate::Error::Model(format!("Failed to read vocabulary: {e}")))?;
            return Vocabulary::from_json(&content);
        }
        let txt_path = model_dir.join("vocab.txt");
        if txt_path.exists() {
            let content = std::fs::read_to_string(&txt_path)
                .map_err(|e| crate::Error::Model(format!("Failed to read vocabulary: {e}")))?;
            return Vocabulary::from_lines(&content);
        }
        Err(crate::Error::Model(format!(
            "Vocabulary not found in {model_dir:?} (expected vocab.json or vocab.txt)"
        )))
    }

    /// Mean/variance normalization the model expects on its raw input.
    fn normalize(samples: &[f32]) -> Vec<f32> {
        let len = samples.len() as f64;
        let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / len;
        let variance = samples
            .iter()
            .map(|&s| (s as f64 - mean).powi(2))
            .sum::<f64>()
            / len;
        let std_deviation = (variance + 1e-5).sqrt();
        samples
            .iter()
            .map(|&s| ((s as f64 - mean) / std_deviation) as f32)
            .collect()
    }
}

impl AcousticModel for OnnxModel {
    fn infer(&self, samples: &[f32]) -> crate::Result<EmissionBuffer> {
        if samples.is_empty() {
            return Err(crate::Error::Model("No audio samples provided".to_string()));
        }

        let normalized: Box<[f32]> = Self::normalize(samples).into_boxed_slice();
        let shape = vec![1i64, samples.len() as i64];

        let input = Value::from_array((shape.as_slice(), normalized))
            .map_err(|e| crate::Error::Model(format!("Failed to create input tensor: {e}")))?;

        let vocab_size = self.vocab.size();
        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs!["input" => input])
            .map_err(|e| crate::Error::Model(format!("Inference failed: {e}")))?;

        // the logits tensor name varies between exports
        let output_names = ["output", "logits", "logprobs", "outputs"];
        let logits_value = output_names
            .iter()
            .find_map(|&name| outputs.get(name))
            .ok_or_else(|| {
                let available: Vec<String> = outputs.iter().map(|(k, _)| k.to_string()).collect();
                crate::Error::Model(format!(
                    "Could not find output tensor. Available outputs: {available:?}"
                ))
            })?;

        let logits = logits_value
            .try_extract_tensor::<f32>()
            .map_err(|e| crate::Error::Model(format!("Failed to extract logits tensor: {e}")))?;

        let shape = logits.0;
        let data = logits.1;

        if shape.len() != 3 || shape[0] != 1 {
            return Err(crate::Error::Model(format!(
                "Expected logits shape (1, frames, vocab), got: {shape:?}"
            )));
        }
        let frames = shape[1] as usize;
        if shape[2] as usize != vocab_size {
            return Err(crate::Error::Model(format!(
                "Logits vocabulary ({}) does not match the loaded vocabulary ({})",
                shape[2], vocab_size
            )));
        }

        debug!(frames, vocab = vocab_size, "model produced emissions");

        // log-softmax each frame so downstream sees log-probabilities
        let mut out = EmissionBuffer::new(vocab_size);
        let mut frame = vec![0.0f32; vocab_size];
        for t in 0..frames {
            let row = &data[t * vocab_size..(t + 1) * vocab_size];
            let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let log_sum = row.iter().map(|&v| (v - max).exp()).sum::<f32>().ln() + max;
            for (dst, &v) in frame.iter_mut().zip(row) {
                *dst = v - log_sum;
            }
            out.push_frame(&frame);
        }

        Ok(out)
    }

    fn sample_rate(&self) -> u32 {
        self.spec.sampling_rate
    }

    fn frame_stride(&self) -> usize {
        self.spec.inputs_to_logits_ratio
    }

    fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_centers_input() {
        let normalized = OnnxModel::normalize(&[1.0, 2.0, 3.0, 4.0]);
        let mean: f32 = normalized.iter().sum::<f32>() / normalized.len() as f32;
        assert!(mean.abs() < 1e-5);
        assert!(normalized[0] < 0.0 && normalized[3] > 0.0);
    }

    #[test]
    fn test_normalize_survives_silence() {
        let normalized = OnnxModel::normalize(&[0.0; 8]);
        assert!(normalized.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_missing_model_dir() {
        let err = OnnxModel::load(Path::new("/nonexistent/model"), 1).unwrap_err();
        assert!(matches!(err, crate::Error::Model(_)));
    }

    #[test]
    fn test_spec_defaults() {
        let spec: ModelSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(spec.sampling_rate, 16_000);
        assert_eq!(spec.inputs_to_logits_ratio, 320);
    }
}
