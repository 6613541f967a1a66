//! Acoustic recognition
//!
//! The acoustic model is an opaque frame-emitting black box behind the
//! [`AcousticModel`] trait; the windowed recognizer drives it over a raw
//! sample stream and keeps only boundary-clean frames.

pub mod mock;
pub mod model;
pub mod windowed;

#[cfg(feature = "onnx")]
pub mod onnx;

// Re-export commonly used types
pub use mock::MockModel;
pub use model::{AcousticModel, Vocabulary};
pub use windowed::WindowedRecognizer;

#[cfg(feature = "onnx")]
pub use onnx::OnnxModel;
