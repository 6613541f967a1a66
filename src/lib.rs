// Autocue - Real-Time Teleprompter Follower
// Main library entry point

#![warn(clippy::all)]

pub mod align;
pub mod asr;
pub mod config;
pub mod prompter;
pub mod server;
pub mod text;

// Re-export commonly used types
pub use config::Config;
pub use prompter::Prompter;

/// Result type alias for autocue operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for autocue
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed client input: bad token ids, unknown codec, missing
    /// handshake, undecodable message.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A configured cap was exceeded (frame size, audio block, script length).
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The acoustic model rejected input or failed internally.
    #[error("Model error: {0}")]
    Model(String),

    /// A programming invariant was violated. Reported instead of panicking so
    /// a broken session cannot take the server down.
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable numeric code carried in wire-protocol error responses.
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidInput(_) => 1,
            Error::ResourceExhausted(_) => 2,
            Error::Model(_) => 3,
            Error::Internal(_) => 4,
            Error::Io(_) => 5,
        }
    }
}
