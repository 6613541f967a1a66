//! Teleprompter server
//!
//! Multi-client TCP server: one task per connection, length-delimited binary
//! frames, strictly sequential request handling within a session. The
//! acoustic model and tokenizer are shared across sessions; everything else
//! is per-session state.

pub mod protocol;
pub mod session;

// Re-export commonly used types
pub use protocol::{Request, Response};
pub use session::Session;

use crate::align::online::OnlineMatcher;
use crate::align::viterbi::ViterbiMatcher;
use crate::asr::model::AcousticModel;
use crate::asr::windowed::WindowedRecognizer;
use crate::config::Config;
use crate::prompter::Prompter;
use crate::text::Tokenizer;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::bytes::Bytes;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{error, info, warn};

/// Shared recognition stack: everything a new session needs to build its
/// Prompter.
pub struct Engine {
    model: Arc<dyn AcousticModel>,
    tokenizer: Arc<dyn Tokenizer>,
    config: Config,
}

impl Engine {
    pub fn new(
        model: Arc<dyn AcousticModel>,
        tokenizer: Arc<dyn Tokenizer>,
        config: Config,
    ) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self {
            model,
            tokenizer,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn model(&self) -> &Arc<dyn AcousticModel> {
        &self.model
    }

    /// Build the per-session recognition pipeline.
    pub fn create_prompter(&self) -> crate::Result<Prompter> {
        let recognizer = WindowedRecognizer::from_seconds(
            Arc::clone(&self.model),
            self.config.recognizer.chunk_secs,
            self.config.recognizer.left_context_secs,
            self.config.recognizer.right_context_secs,
        )?;
        let matcher = OnlineMatcher::new(
            ViterbiMatcher::new(
                self.tokenizer.blank_token(),
                self.config.matcher.min_path_length,
                self.config.matcher.min_match_weight,
            ),
            self.config.matcher.context_frames,
            self.config.matcher.overlap_frames,
        )?;
        Ok(Prompter::new(
            Arc::clone(&self.tokenizer),
            recognizer,
            matcher,
            self.config.prompter.min_chunk_tokens,
            self.config.prompter.lookahead_tokens,
        ))
    }
}

/// TCP accept loop.
pub struct Server {
    engine: Arc<Engine>,
}

impl Server {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Accept connections forever, one task per client. A failed session
    /// only ever takes itself down.
    pub async fn run(&self, listener: TcpListener) -> crate::Result<()> {
        info!("Listening on {}", listener.local_addr()?);
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let engine = Arc::clone(&self.engine);
                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(engine, stream, peer.to_string()).await
                        {
                            warn!(peer = %peer, "Session closed with error: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }
    }
}

async fn handle_connection(
    engine: Arc<Engine>,
    stream: TcpStream,
    peer: String,
) -> crate::Result<()> {
    let mut codec = LengthDelimitedCodec::new();
    codec.set_max_frame_length(engine.config().server.max_message_bytes);
    let mut framed = Framed::new(stream, codec);
    let mut session = Session::new(engine, peer);

    while let Some(frame) = framed.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                let err = crate::Error::InvalidInput(format!("Broken frame: {e}"));
                let _ = send_response(&mut framed, &Response::from_error(&err)).await;
                return Err(err);
            }
        };

        let request = match Request::decode(&frame) {
            Ok(request) => request,
            Err(err) => {
                let _ = send_response(&mut framed, &Response::from_error(&err)).await;
                return Err(err);
            }
        };

        match session.handle(request) {
            Ok(Some(response)) => send_response(&mut framed, &response).await?,
            Ok(None) => {}
            Err(err) => {
                // terminal: report once, then close the connection
                let _ = send_response(&mut framed, &Response::from_error(&err)).await;
                return Err(err);
            }
        }
    }

    Ok(())
}

async fn send_response(
    framed: &mut Framed<TcpStream, LengthDelimitedCodec>,
    response: &Response,
) -> crate::Result<()> {
    let bytes = response.encode()?;
    framed.send(Bytes::from(bytes)).await?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_engine(config: Config) -> Arc<Engine> {
    use crate::asr::mock::{char_vocabulary, MockModel};
    use crate::text::g2p::SpellingLexicon;
    use crate::text::tokenizer::ScriptTokenizer;

    let vocab = Arc::new(char_vocabulary());
    let model: Arc<dyn AcousticModel> =
        Arc::new(MockModel::new(Arc::clone(&vocab), 16_000, 320));
    let lexicon = Arc::new(SpellingLexicon::new(&vocab));
    let tokenizer: Arc<dyn Tokenizer> = Arc::new(ScriptTokenizer::new(vocab, lexicon));
    Arc::new(Engine::new(model, tokenizer, config).expect("test engine config is valid"))
}
