//! Configuration management
//!
//! Handles loading and validation of server and pipeline parameters.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub recognizer: RecognizerConfig,
    pub matcher: MatcherConfig,
    pub prompter: PrompterConfig,
}

/// Per-connection limits and framing caps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Maximum wire frame size in bytes
    pub max_message_bytes: usize,
    /// Maximum audio samples accepted in a single request
    pub max_samples_per_message: usize,
    /// Maximum script length in characters
    pub max_text_chars: usize,
}

/// Windowed recognition parameters, in seconds of audio
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Model invocation window
    pub chunk_secs: f32,
    /// Leading frames discarded as boundary-contaminated
    pub left_context_secs: f32,
    /// Trailing frames discarded as boundary-contaminated
    pub right_context_secs: f32,
    /// Intra-op threads for the model runtime
    pub threads: usize,
}

/// Alignment parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Emission context capacity, in frames
    pub context_frames: usize,
    /// Frames carried over between sub-batches
    pub overlap_frames: usize,
    /// Transitions required for a path to count as a match
    pub min_path_length: usize,
    /// Acceptance threshold on the geometric-mean transition emission
    pub min_match_weight: f32,
}

/// Cursor-advance parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrompterConfig {
    /// Minimum tokens per matcher sub-target
    pub min_chunk_tokens: usize,
    /// Maximum tokens past the cursor the matcher may consider
    pub lookahead_tokens: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            recognizer: RecognizerConfig::default(),
            matcher: MatcherConfig::default(),
            prompter: PrompterConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: 8 * 1024 * 1024,
            // 30 seconds of 16kHz audio per message is already generous
            max_samples_per_message: 480_000,
            max_text_chars: 100_000,
        }
    }
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            chunk_secs: 1.0,
            left_context_secs: 0.2,
            right_context_secs: 0.2,
            threads: 1,
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            context_frames: 150,
            overlap_frames: 50,
            min_path_length: 2,
            min_match_weight: 0.35,
        }
    }
}

impl Default for PrompterConfig {
    fn default() -> Self {
        Self {
            min_chunk_tokens: 5,
            lookahead_tokens: 25,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::InvalidInput(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> crate::Result<()> {
        if self.matcher.context_frames == 0 {
            return Err(crate::Error::InvalidInput(
                "matcher.context_frames must be positive".to_string(),
            ));
        }
        if self.matcher.overlap_frames >= self.matcher.context_frames {
            return Err(crate::Error::InvalidInput(format!(
                "matcher.overlap_frames ({}) must be less than matcher.context_frames ({})",
                self.matcher.overlap_frames, self.matcher.context_frames
            )));
        }
        if self.prompter.min_chunk_tokens == 0 {
            return Err(crate::Error::InvalidInput(
                "prompter.min_chunk_tokens must be positive".to_string(),
            ));
        }
        let strides = self.recognizer.left_context_secs + self.recognizer.right_context_secs;
        if strides <= 0.0 || self.recognizer.chunk_secs < strides {
            return Err(crate::Error::InvalidInput(
                "recognizer chunk must cover both context strides".to_string(),
            ));
        }
        Ok(())
    }
}
