//! Configuration management for Polyglot
//!
//! Configuration is a JSON (or TOML) file layered under environment
//! overrides: env > file > default. Every key is optional.

pub mod file;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Assistant configuration, loaded once at startup and read-only afterwards
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Trigger phrase that wakes the assistant (e.g. "jarvis")
    pub wake_word: String,

    /// Conversational model settings
    pub model: ModelConfig,

    /// Speech input/output settings
    pub speech: SpeechConfig,

    /// Top-level Riva settings (takes precedence over `speech.riva`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub riva: Option<RivaConfig>,

    /// Language defaults and translation
    pub language: LanguageConfig,

    /// Command templates
    pub commands: CommandsConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// API keys for external services
    pub api_keys: ApiKeys,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wake_word: "jarvis".to_string(),
            model: ModelConfig::default(),
            speech: SpeechConfig::default(),
            riva: None,
            language: LanguageConfig::default(),
            commands: CommandsConfig::default(),
            logging: LoggingConfig::default(),
            api_keys: ApiKeys::default(),
        }
    }
}

/// Conversational model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model identifier served by the chat endpoint
    pub name: String,

    /// Base URL of an OpenAI-compatible chat completions API
    pub api_url: String,

    /// Number of past exchanges kept as context
    pub max_history: usize,

    /// Maximum number of new tokens per reply
    pub max_length: u32,

    /// Approximate token budget for history plus input
    pub max_context_tokens: usize,

    /// Sampling temperature
    pub temperature: f32,

    /// Nucleus sampling probability
    pub top_p: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "microsoft/DialoGPT-medium".to_string(),
            api_url: "http://localhost:8080/v1".to_string(),
            max_history: 5,
            max_length: 1000,
            max_context_tokens: 1024,
            temperature: 0.7,
            top_p: 0.9,
        }
    }
}

/// Speech configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Microphone and recognition settings
    pub input: SpeechInputConfig,

    /// Synthesis settings
    pub output: SpeechOutputConfig,

    /// NVIDIA Riva settings
    pub riva: RivaConfig,
}

/// Speech input configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechInputConfig {
    /// Recognition provider ("whisper" or "deepgram")
    pub provider: String,

    /// Recognition model (e.g. "whisper-1", "nova-2")
    pub model: String,

    /// Input device index (default device if unset or out of range)
    pub device_index: Option<usize>,

    /// Speech energy threshold on the 16-bit amplitude scale
    pub energy_threshold: f32,

    /// Seconds of silence that end a phrase
    pub pause_threshold: f32,

    /// Seconds to wait for speech to start
    pub timeout: f32,

    /// Maximum seconds of a single query
    pub phrase_time_limit: f32,
}

impl Default for SpeechInputConfig {
    fn default() -> Self {
        Self {
            provider: "whisper".to_string(),
            model: "whisper-1".to_string(),
            device_index: None,
            energy_threshold: 300.0,
            pause_threshold: 0.8,
            timeout: 5.0,
            phrase_time_limit: 10.0,
        }
    }
}

/// Speech output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechOutputConfig {
    /// Engine name: "local" (alias "pyttsx3"), "openai", "elevenlabs" or "riva"
    pub engine: String,

    /// Speaking rate in words per minute
    pub rate: u32,

    /// Volume from 0.0 to 1.0
    pub volume: f32,

    /// Engine-specific voice identifier
    pub voice_id: Option<String>,

    /// Engine-specific model (e.g. "tts-1")
    pub model: Option<String>,
}

impl Default for SpeechOutputConfig {
    fn default() -> Self {
        Self {
            engine: "local".to_string(),
            rate: 150,
            volume: 1.0,
            voice_id: None,
            model: None,
        }
    }
}

/// NVIDIA Riva speech synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RivaConfig {
    /// Use Riva when the output engine is "riva"
    pub enabled: bool,

    /// Riva HTTP server URL
    pub server_url: String,

    /// API key sent as a bearer token
    pub auth_key: Option<String>,

    /// Synthesis language code
    pub language_code: String,

    /// Riva voice name
    pub voice_name: String,

    /// Output sample rate
    pub sample_rate_hz: u32,
}

impl Default for RivaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: "http://localhost:9000".to_string(),
            auth_key: None,
            language_code: "en-US".to_string(),
            voice_name: "English-US.Female-1".to_string(),
            sample_rate_hz: 44100,
        }
    }
}

/// Language configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageConfig {
    /// Default language code for recognition and replies
    pub default: String,

    /// Detect the spoken language instead of assuming the default
    pub auto_detect: bool,

    /// Translate to and from the model's pivot language
    pub translation_enabled: bool,

    /// Translation backend ("google" or "libretranslate")
    pub translation_provider: String,

    /// Translation API base URL override
    pub translation_url: Option<String>,
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            default: "en".to_string(),
            auto_detect: true,
            translation_enabled: true,
            translation_provider: "google".to_string(),
            translation_url: None,
        }
    }
}

/// Command templates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Phrases that end the session when spoken on their own
    pub exit_commands: Vec<String>,

    /// Command kind to trigger phrases
    pub custom_commands: BTreeMap<String, Vec<String>>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        let phrases = |list: &[&str]| list.iter().map(ToString::to_string).collect();
        let custom_commands = BTreeMap::from([
            (
                "time".to_string(),
                phrases(&["what time is it", "current time", "tell me the time"]),
            ),
            (
                "date".to_string(),
                phrases(&["what day is it", "what's the date", "today's date"]),
            ),
            (
                "weather".to_string(),
                phrases(&["weather", "temperature outside", "is it raining"]),
            ),
            (
                "help".to_string(),
                phrases(&["help", "what can you do"]),
            ),
        ]);

        Self {
            exit_commands: phrases(&["exit", "quit", "goodbye", "bye", "stop"]),
            custom_commands,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging below `error`
    pub enabled: bool,

    /// Log level name (DEBUG, INFO, WARNING, ERROR, CRITICAL)
    pub level: String,

    /// Optional log file, appended to
    pub file: Option<PathBuf>,

    /// Write the conversation transcript on exit
    pub save_conversations: bool,

    /// Directory for saved transcripts
    pub conversation_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "INFO".to_string(),
            file: None,
            save_conversations: false,
            conversation_dir: None,
        }
    }
}

/// API keys for external services
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deepgram: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevenlabs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_translate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub libretranslate: Option<String>,
}

impl Config {
    /// Load configuration from `path`, or from the default location
    ///
    /// An explicit path must exist. Without one, the default file is used
    /// when present and built-in defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or the result is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => file::read_config_file(path)?,
            None => match file::config_file_path() {
                Some(path) if path.exists() => file::read_config_file(&path)?,
                _ => {
                    tracing::debug!("no config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from JSON
    ///
    /// # Errors
    ///
    /// Returns error if the JSON is malformed
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parse configuration from TOML
    ///
    /// # Errors
    ///
    /// Returns error if the TOML is malformed
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let keys = &mut self.api_keys;
        keys.openai = lookup("OPENAI_API_KEY").or_else(|| keys.openai.take());
        keys.deepgram = lookup("DEEPGRAM_API_KEY").or_else(|| keys.deepgram.take());
        keys.elevenlabs = lookup("ELEVENLABS_API_KEY").or_else(|| keys.elevenlabs.take());
        keys.google_translate =
            lookup("GOOGLE_TRANSLATE_API_KEY").or_else(|| keys.google_translate.take());
        keys.libretranslate =
            lookup("LIBRETRANSLATE_API_KEY").or_else(|| keys.libretranslate.take());

        if let Some(key) = lookup("RIVA_API_KEY") {
            match self.riva.as_mut() {
                Some(riva) => riva.auth_key = Some(key),
                None => self.speech.riva.auth_key = Some(key),
            }
        }

        if let Some(url) = lookup("POLYGLOT_MODEL_URL") {
            self.model.api_url = url;
        }

        if let Some(wake_word) = lookup("POLYGLOT_WAKE_WORD") {
            self.wake_word = wake_word;
        }
    }

    /// Check values that would make the assistant unusable
    ///
    /// # Errors
    ///
    /// Returns error describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.wake_word.trim().is_empty() {
            return Err(Error::Config("wake_word must not be empty".to_string()));
        }

        let input = &self.speech.input;
        if input.timeout <= 0.0 || input.pause_threshold <= 0.0 || input.phrase_time_limit <= 0.0
        {
            return Err(Error::Config(
                "speech.input timeout, pause_threshold and phrase_time_limit must be positive"
                    .to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.speech.output.volume) {
            return Err(Error::Config(format!(
                "speech.output.volume must be between 0.0 and 1.0, got {}",
                self.speech.output.volume
            )));
        }

        if self.model.max_history == 0 {
            return Err(Error::Config("model.max_history must be at least 1".to_string()));
        }

        Ok(())
    }

    /// Effective Riva settings
    #[must_use]
    pub fn riva(&self) -> &RivaConfig {
        self.riva.as_ref().unwrap_or(&self.speech.riva)
    }

    /// Override the default language (e.g. from the command line)
    pub fn set_default_language(&mut self, code: &str) {
        self.language.default = code.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.wake_word, "jarvis");
        assert!(config.commands.custom_commands.contains_key("time"));
    }

    #[test]
    fn test_partial_json_overlay() {
        let config = Config::from_json_str(
            r#"{
                "wake_word": "computer",
                "speech": { "input": { "timeout": 3.5 } },
                "language": { "default": "es" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.wake_word, "computer");
        assert!((config.speech.input.timeout - 3.5).abs() < f32::EPSILON);
        assert_eq!(config.speech.input.provider, "whisper");
        assert_eq!(config.language.default, "es");
        assert!(config.language.translation_enabled);
    }

    #[test]
    fn test_riva_top_level_takes_precedence() {
        let config = Config::from_json_str(
            r#"{
                "speech": { "riva": { "enabled": false } },
                "riva": { "enabled": true, "server_url": "http://riva:9000" }
            }"#,
        )
        .unwrap();

        assert!(config.riva().enabled);
        assert_eq!(config.riva().server_url, "http://riva:9000");
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::default();
        config.api_keys.openai = Some("from-file".to_string());
        config.api_keys.deepgram = Some("deepgram-file".to_string());

        config.apply_env_with(|key| match key {
            "OPENAI_API_KEY" => Some("from-env".to_string()),
            "POLYGLOT_WAKE_WORD" => Some("friday".to_string()),
            "RIVA_API_KEY" => Some("riva-key".to_string()),
            _ => None,
        });

        assert_eq!(config.api_keys.openai.as_deref(), Some("from-env"));
        assert_eq!(config.api_keys.deepgram.as_deref(), Some("deepgram-file"));
        assert_eq!(config.wake_word, "friday");
        assert_eq!(config.speech.riva.auth_key.as_deref(), Some("riva-key"));
    }

    #[test]
    fn test_validate_rejects_empty_wake_word() {
        let config = Config {
            wake_word: "   ".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_volume_out_of_range() {
        let mut config = Config::default();
        config.speech.output.volume = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_config() {
        let config = Config::from_toml_str(
            r#"
            wake_word = "hey polly"

            [model]
            max_history = 3

            [commands]
            exit_commands = ["adios"]
            "#,
        )
        .unwrap();

        assert_eq!(config.wake_word, "hey polly");
        assert_eq!(config.model.max_history, 3);
        assert_eq!(config.commands.exit_commands, vec!["adios"]);
    }
}
