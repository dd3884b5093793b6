//! Polyglot - a multilingual voice assistant
//!
//! This library provides the pieces of a wake-word voice assistant:
//! - Voice processing (capture, endpointing, wake word, STT, TTS)
//! - Command handling for time, date, weather, help and custom commands
//! - Translation to and from the model's pivot language
//! - A conversational language model client with rolling history
//!
//! # Architecture
//!
//! ```text
//! microphone ──► SpeechToText ──► wake word ──► CommandHandler ──┐
//!                                                   │ no match   │ match
//!                                                   ▼            │
//!                                  Translation ◄─► LanguageModel │
//!                                                   │            │
//!                                                   ▼            ▼
//!                                              TextToSpeech ──► speaker
//! ```

pub mod chatbot;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod setup;
pub mod translation;
pub mod utils;
pub mod voice;

pub use chatbot::{ChatState, Chatbot, ConversationTurn, TurnOutcome};
pub use commands::{CommandHandler, CommandKind, CommandPattern, CommandResponse, CustomHandler};
pub use config::Config;
pub use error::{Error, Result};
pub use model::{ChatModel, ConversationHistory, Exchange, LanguageModel};
pub use translation::{Translation, Translator};
