//! Error types for Polyglot

use thiserror::Error;

/// Result type alias for Polyglot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// No speech started before the listen timeout elapsed
    #[error("no speech detected within timeout")]
    NoSpeech,

    /// Speech was captured but the recognizer could not understand it
    #[error("speech could not be understood")]
    Unintelligible,

    /// Speech recognition service error
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Translation service error
    #[error("translation error: {0}")]
    Translation(String),

    /// Speech synthesis error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Language model error
    #[error("model error: {0}")]
    Model(String),

    /// The input source has no more utterances
    #[error("input closed")]
    InputClosed,

    /// Custom command handler error
    #[error("command error: {0}")]
    Command(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error came from the speech recognition stage
    #[must_use]
    pub const fn is_recognition(&self) -> bool {
        matches!(
            self,
            Self::NoSpeech | Self::Unintelligible | Self::Recognition(_)
        )
    }
}
