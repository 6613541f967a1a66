//! Wire Protocol Definitions
//!
//! Binary messages using bincode, carried as length-delimited frames over a
//! reliable duplex stream. Requests are a bag of optional sections so a
//! client can combine a handshake, script text and audio in one message;
//! responses are a tagged union.

use serde::{Deserialize, Serialize};

/// Client request; every section is optional, but the first request of a
/// connection must carry a handshake.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
    pub handshake: Option<Handshake>,
    pub text_data: Option<TextData>,
    pub audio_data: Option<AudioData>,
    pub matcher_params: Option<MatcherParams>,
    /// Opaque payload echoed back to the client
    pub user_data: Option<Vec<u8>>,
}

/// Connection opening
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handshake {
    pub client_name: String,
}

/// Replaces the script being followed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextData {
    pub text: String,
    /// Initial cursor as a character offset
    pub text_pos: u32,
}

/// A block of encoded audio
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioData {
    pub meta: AudioMeta,
    pub data: Vec<u8>,
}

/// Audio block properties
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioMeta {
    pub sample_rate: u32,
    pub codec: Codec,
}

/// Supported audio encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Codec {
    /// Raw little-endian float32 PCM
    PcmF32le,
    /// Reserved; decoding is not provided by this server
    Opus,
}

/// Runtime matcher overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatcherParams {
    /// Tokens past the cursor the matcher may consider
    pub look_ahead: Option<u32>,
    /// Acceptance threshold on the mean transition emission
    pub min_match_weight: Option<f32>,
    /// Minimum tokens per matcher sub-target
    pub min_chunk_tokens: Option<u32>,
}

/// Server response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    /// Current position as a character offset into the script
    RecognitionResult { text_pos: u32 },
    /// Terminal failure; the server closes the connection after sending
    Error { code: i32, what: String },
    /// Echo of a request's user data
    UserData(Vec<u8>),
}

impl Request {
    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| crate::Error::Internal(format!("Failed to encode request: {e}")))
    }

    pub fn decode(bytes: &[u8]) -> crate::Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| crate::Error::InvalidInput(format!("Broken request message: {e}")))
    }
}

impl Response {
    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| crate::Error::Internal(format!("Failed to encode response: {e}")))
    }

    pub fn decode(bytes: &[u8]) -> crate::Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| crate::Error::InvalidInput(format!("Broken response message: {e}")))
    }

    /// The terminal response for a failed session.
    pub fn from_error(error: &crate::Error) -> Self {
        Response::Error {
            code: error.code(),
            what: error.to_string(),
        }
    }
}
