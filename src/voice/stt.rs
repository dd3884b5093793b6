//! Speech-to-text (STT) processing

use serde::Deserialize;

use crate::config::Config;
use crate::translation::{base_code, language_code};
use crate::{Error, Result};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEEPGRAM_BASE_URL: &str = "https://api.deepgram.com/v1";
const DEFAULT_DEEPGRAM_MODEL: &str = "nova-2";

/// Response from OpenAI Whisper transcription API (`verbose_json`)
#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

/// Response from Deepgram transcription API
#[derive(Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
    #[serde(default)]
    detected_language: Option<String>,
}

#[derive(Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// Recognized speech
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcription {
    /// Transcript text
    pub text: String,
    /// Language code reported by the service, if any
    pub language: Option<String>,
}

/// STT provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SttProvider {
    Whisper,
    Deepgram,
}

/// Transcribes speech to text
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: String,
    model: String,
    provider: SttProvider,
    base_url: String,
}

impl SpeechToText {
    /// Create a new STT instance using `OpenAI` Whisper
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_whisper(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            provider: SttProvider::Whisper,
            base_url: OPENAI_BASE_URL.to_string(),
        })
    }

    /// Create a new STT instance using Deepgram
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_deepgram(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Deepgram API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            provider: SttProvider::Deepgram,
            base_url: DEEPGRAM_BASE_URL.to_string(),
        })
    }

    /// Create from configuration (`speech.input.provider`)
    ///
    /// # Errors
    ///
    /// Returns error if the provider is unknown or its API key is missing
    pub fn from_config(config: &Config) -> Result<Self> {
        let input = &config.speech.input;
        match input.provider.to_lowercase().as_str() {
            "whisper" | "openai" => Self::new_whisper(
                config.api_keys.openai.clone().unwrap_or_default(),
                input.model.clone(),
            ),
            "deepgram" => {
                let model = if input.model.starts_with("whisper") {
                    DEFAULT_DEEPGRAM_MODEL.to_string()
                } else {
                    input.model.clone()
                };
                Self::new_deepgram(config.api_keys.deepgram.clone().unwrap_or_default(), model)
            }
            other => Err(Error::Config(format!("unknown speech input provider: {other}"))),
        }
    }

    /// Point the client at a different API base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Transcribe audio to text
    ///
    /// # Arguments
    ///
    /// * `audio` - WAV audio bytes
    /// * `language` - Language hint; the service detects the language when `None`
    ///
    /// # Errors
    ///
    /// Returns `Unintelligible` for an empty transcript and `Recognition`
    /// when the service fails
    pub async fn transcribe(&self, audio: &[u8], language: Option<&str>) -> Result<Transcription> {
        let mut result = match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(audio, language).await?,
            SttProvider::Deepgram => self.transcribe_deepgram(audio, language).await?,
        };

        result.text = result.text.trim().to_string();
        if result.text.is_empty() {
            return Err(Error::Unintelligible);
        }

        // A hint is authoritative; otherwise keep what the service reported
        if let Some(hint) = language {
            result.language = Some(base_code(hint));
        }

        tracing::info!(
            transcript = %result.text,
            language = result.language.as_deref().unwrap_or("unknown"),
            "transcription complete"
        );
        Ok(result)
    }

    /// Transcribe using OpenAI Whisper
    async fn transcribe_whisper(
        &self,
        audio: &[u8],
        language: Option<&str>,
    ) -> Result<Transcription> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Recognition(e.to_string()))?,
            )
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");
        if let Some(language) = language {
            form = form.text("language", base_code(language));
        }

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                Error::Recognition(e.to_string())
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Recognition(format!(
                "Whisper API error {status}: {body}"
            )));
        }

        let result: WhisperResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            Error::Recognition(e.to_string())
        })?;

        Ok(Transcription {
            text: result.text,
            // Whisper reports a language name ("spanish")
            language: result.language.map(|name| language_code(&name)),
        })
    }

    /// Transcribe using Deepgram
    async fn transcribe_deepgram(
        &self,
        audio: &[u8],
        language: Option<&str>,
    ) -> Result<Transcription> {
        tracing::debug!(audio_bytes = audio.len(), "starting Deepgram transcription");

        let language_param = language.map_or_else(
            || "detect_language=true".to_string(),
            |code| format!("language={}", base_code(code)),
        );
        let url = format!(
            "{}/listen?model={}&punctuate=true&{language_param}",
            self.base_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Deepgram request failed");
                Error::Recognition(e.to_string())
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Deepgram API error");
            return Err(Error::Recognition(format!(
                "Deepgram API error {status}: {body}"
            )));
        }

        let result: DeepgramResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse Deepgram response");
            Error::Recognition(e.to_string())
        })?;

        let channel = result.results.channels.into_iter().next();
        let language = channel
            .as_ref()
            .and_then(|c| c.detected_language.as_deref())
            .map(base_code);
        let text = channel
            .and_then(|c| c.alternatives.into_iter().next())
            .map(|a| a.transcript)
            .unwrap_or_default();

        Ok(Transcription { text, language })
    }
}
