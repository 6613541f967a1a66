//! Client Session
//!
//! One connected client: requests are applied strictly in arrival order and
//! produce at most one response each. The session owns its Prompter and all
//! per-client buffers; any error is terminal for the session and never
//! touches server-global state.

use super::protocol::{AudioData, Codec, Request, Response};
use super::Engine;
use crate::prompter::Prompter;
use std::sync::Arc;
use tracing::{debug, info};

/// Per-connection state machine.
pub struct Session {
    engine: Arc<Engine>,
    prompter: Option<Prompter>,
    client_name: Option<String>,
    peer: String,
}

impl Session {
    pub fn new(engine: Arc<Engine>, peer: String) -> Self {
        info!(peer = %peer, "Client connected");
        Self {
            engine,
            prompter: None,
            client_name: None,
            peer,
        }
    }

    /// Apply one request. `Ok(None)` means the request needs no response;
    /// an `Err` is terminal and the caller closes the session after
    /// reporting it.
    pub fn handle(&mut self, request: Request) -> crate::Result<Option<Response>> {
        if self.client_name.is_none() {
            let Some(handshake) = &request.handshake else {
                return Err(crate::Error::InvalidInput(
                    "First request must carry a handshake".to_string(),
                ));
            };
            info!(peer = %self.peer, client = %handshake.client_name, "Handshake");
            self.client_name = Some(handshake.client_name.clone());
            self.prompter = Some(self.engine.create_prompter()?);
        }

        let samples = match &request.audio_data {
            Some(audio) => Some(self.decode_audio(audio)?),
            None => None,
        };

        let Some(prompter) = self.prompter.as_mut() else {
            return Err(crate::Error::Internal(
                "Session has no prompter after handshake".to_string(),
            ));
        };

        if let Some(text_data) = &request.text_data {
            let chars = text_data.text.chars().count();
            let cap = self.engine.config().server.max_text_chars;
            if chars > cap {
                return Err(crate::Error::ResourceExhausted(format!(
                    "Script of {chars} characters exceeds the cap of {cap}"
                )));
            }
            debug!(peer = %self.peer, chars, text_pos = text_data.text_pos, "Script replaced");
            prompter.set_text(&text_data.text, text_data.text_pos as usize)?;
        }

        if let Some(params) = &request.matcher_params {
            debug!(peer = %self.peer, ?params, "Matcher parameters changed");
            if let Some(look_ahead) = params.look_ahead {
                prompter.set_lookahead(look_ahead as usize);
            }
            if let Some(weight) = params.min_match_weight {
                prompter.set_min_match_weight(weight);
            }
            if let Some(min_chunk) = params.min_chunk_tokens {
                prompter.set_min_chunk_tokens(min_chunk as usize);
            }
        }

        if let Some(samples) = samples {
            prompter.update(&samples)?;
            return Ok(Some(Response::RecognitionResult {
                text_pos: prompter.cursor_offset() as u32,
            }));
        }

        if let Some(user_data) = request.user_data {
            return Ok(Some(Response::UserData(user_data)));
        }

        Ok(None)
    }

    /// Raw little-endian f32 PCM at the model rate; codec and resampler
    /// plumbing are deliberately not provided here.
    fn decode_audio(&self, audio: &AudioData) -> crate::Result<Vec<f32>> {
        if audio.meta.codec != Codec::PcmF32le {
            return Err(crate::Error::InvalidInput(format!(
                "Unsupported codec: {:?}",
                audio.meta.codec
            )));
        }

        let model_rate = self.engine.model().sample_rate();
        if audio.meta.sample_rate != model_rate {
            return Err(crate::Error::InvalidInput(format!(
                "Sample rate {} does not match the model rate {model_rate}",
                audio.meta.sample_rate
            )));
        }

        if !audio.data.len().is_multiple_of(4) {
            return Err(crate::Error::InvalidInput(format!(
                "Audio block of {} bytes is not whole f32 samples",
                audio.data.len()
            )));
        }

        let samples = audio.data.len() / 4;
        let cap = self.engine.config().server.max_samples_per_message;
        if samples > cap {
            return Err(crate::Error::ResourceExhausted(format!(
                "Audio block of {samples} samples exceeds the cap of {cap}"
            )));
        }

        Ok(audio
            .data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        info!(peer = %self.peer, "Client disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ServerConfig};
    use crate::server::protocol::{AudioMeta, Handshake, TextData};
    use crate::server::test_engine;

    fn session() -> Session {
        Session::new(test_engine(Config::default()), "test-peer".to_string())
    }

    fn handshake() -> Request {
        Request {
            handshake: Some(Handshake {
                client_name: "test".to_string(),
            }),
            ..Request::default()
        }
    }

    fn audio_request(samples: &[f32]) -> Request {
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Request {
            audio_data: Some(AudioData {
                meta: AudioMeta {
                    sample_rate: 16_000,
                    codec: Codec::PcmF32le,
                },
                data,
            }),
            ..Request::default()
        }
    }

    #[test]
    fn test_missing_handshake_is_terminal() {
        let mut session = session();
        let err = session.handle(Request::default()).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidInput(_)));
    }

    #[test]
    fn test_handshake_alone_has_no_response() {
        let mut session = session();
        let response = session.handle(handshake()).unwrap();
        assert!(response.is_none());
    }

    #[test]
    fn test_audio_produces_cursor_response() {
        let mut session = session();
        session.handle(handshake()).unwrap();
        session
            .handle(Request {
                text_data: Some(TextData {
                    text: "one two three".to_string(),
                    text_pos: 0,
                }),
                ..Request::default()
            })
            .unwrap();

        // silence: a response is still produced, cursor stays at zero
        let response = session.handle(audio_request(&[0.0; 256])).unwrap();
        assert!(matches!(
            response,
            Some(Response::RecognitionResult { text_pos: 0 })
        ));
    }

    #[test]
    fn test_user_data_is_echoed() {
        let mut session = session();
        session.handle(handshake()).unwrap();
        let response = session
            .handle(Request {
                user_data: Some(vec![9, 8, 7]),
                ..Request::default()
            })
            .unwrap();
        assert!(matches!(response, Some(Response::UserData(data)) if data == vec![9, 8, 7]));
    }

    #[test]
    fn test_unsupported_codec_rejected() {
        let mut session = session();
        session.handle(handshake()).unwrap();
        let request = Request {
            audio_data: Some(AudioData {
                meta: AudioMeta {
                    sample_rate: 16_000,
                    codec: Codec::Opus,
                },
                data: vec![0; 8],
            }),
            ..Request::default()
        };
        let err = session.handle(request).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidInput(_)));
    }

    #[test]
    fn test_mismatched_sample_rate_rejected() {
        let mut session = session();
        session.handle(handshake()).unwrap();
        let mut request = audio_request(&[0.0; 16]);
        request.audio_data.as_mut().unwrap().meta.sample_rate = 44_100;
        let err = session.handle(request).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidInput(_)));
    }

    #[test]
    fn test_ragged_audio_rejected() {
        let mut session = session();
        session.handle(handshake()).unwrap();
        let mut request = audio_request(&[0.0; 16]);
        request.audio_data.as_mut().unwrap().data.push(0);
        let err = session.handle(request).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidInput(_)));
    }

    #[test]
    fn test_oversized_audio_rejected() {
        let config = Config {
            server: ServerConfig {
                max_samples_per_message: 8,
                ..ServerConfig::default()
            },
            ..Config::default()
        };
        let mut session = Session::new(test_engine(config), "test-peer".to_string());
        session.handle(handshake()).unwrap();
        let err = session.handle(audio_request(&[0.0; 64])).unwrap_err();
        assert!(matches!(err, crate::Error::ResourceExhausted(_)));
    }

    #[test]
    fn test_oversized_script_rejected() {
        let config = Config {
            server: ServerConfig {
                max_text_chars: 4,
                ..ServerConfig::default()
            },
            ..Config::default()
        };
        let mut session = Session::new(test_engine(config), "test-peer".to_string());
        session.handle(handshake()).unwrap();
        let err = session
            .handle(Request {
                text_data: Some(TextData {
                    text: "way too long".to_string(),
                    text_pos: 0,
                }),
                ..Request::default()
            })
            .unwrap_err();
        assert!(matches!(err, crate::Error::ResourceExhausted(_)));
    }
}
