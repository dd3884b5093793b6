//! Text-to-speech (TTS) processing
//!
//! Engines: a local system speech command, OpenAI and ElevenLabs (MP3 over
//! HTTP), and NVIDIA Riva (WAV over HTTP). Anything that cannot be set up
//! falls back to the local engine.

use std::path::PathBuf;

use async_trait::async_trait;

use super::playback::AudioPlayback;
use crate::config::{Config, RivaConfig, SpeechOutputConfig};
use crate::translation::base_code;
use crate::{Error, Result};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io/v1";
const DEFAULT_OPENAI_VOICE: &str = "alloy";
const DEFAULT_OPENAI_MODEL: &str = "tts-1";
const DEFAULT_ELEVENLABS_VOICE: &str = "21m00Tcm4TlvDq8ikWAM";
const DEFAULT_ELEVENLABS_MODEL: &str = "eleven_multilingual_v2";

/// Words per minute treated as normal speed
const NORMAL_RATE: u32 = 150;

/// Something that can say text out loud
#[async_trait(?Send)]
pub trait SpeechOutput {
    /// Say `text` in `language`, returning once playback finishes
    async fn speak(&mut self, text: &str, language: &str) -> Result<()>;
}

/// Output that discards speech (`--mute`)
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

#[async_trait(?Send)]
impl SpeechOutput for Silent {
    async fn speak(&mut self, text: &str, _language: &str) -> Result<()> {
        tracing::debug!(text, "speech muted");
        Ok(())
    }
}

/// Synthesized audio ready for playback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesizedAudio {
    /// MP3 bytes
    Mp3(Vec<u8>),
    /// WAV bytes
    Wav(Vec<u8>),
}

/// Platform speech program used by the local engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalProgram {
    /// `espeak-ng` or `espeak` (Linux)
    Espeak,
    /// `say` (macOS)
    Say,
    /// `PowerShell` with System.Speech (Windows)
    Sapi,
}

/// Local engine: a speech program found on `PATH`
#[derive(Debug, Clone)]
pub struct LocalVoice {
    program: LocalProgram,
    path: PathBuf,
    rate: u32,
    volume: f32,
    voice: Option<String>,
}

impl LocalVoice {
    /// Find a speech program on this machine
    #[must_use]
    pub fn detect(output: &SpeechOutputConfig) -> Option<Self> {
        let candidates = [
            ("espeak-ng", LocalProgram::Espeak),
            ("espeak", LocalProgram::Espeak),
            ("say", LocalProgram::Say),
            ("powershell", LocalProgram::Sapi),
            ("pwsh", LocalProgram::Sapi),
        ];

        candidates.into_iter().find_map(|(bin, program)| {
            which::which(bin)
                .ok()
                .map(|path| Self::new(program, path, output))
        })
    }

    /// Use a specific program
    #[must_use]
    pub fn new(program: LocalProgram, path: PathBuf, output: &SpeechOutputConfig) -> Self {
        Self {
            program,
            path,
            rate: output.rate,
            volume: output.volume,
            voice: output.voice_id.clone(),
        }
    }

    /// Arguments passed to the speech program
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    #[must_use]
    pub fn args(&self, text: &str, language: &str) -> Vec<String> {
        match self.program {
            LocalProgram::Espeak => {
                let voice = self.voice.clone().unwrap_or_else(|| base_code(language));
                vec![
                    "-s".to_string(),
                    self.rate.to_string(),
                    "-a".to_string(),
                    ((self.volume * 100.0).round() as u32).to_string(),
                    "-v".to_string(),
                    voice,
                    text.to_string(),
                ]
            }
            LocalProgram::Say => {
                let mut args = vec!["-r".to_string(), self.rate.to_string()];
                if let Some(voice) = &self.voice {
                    args.push("-v".to_string());
                    args.push(voice.clone());
                }
                args.push(text.to_string());
                args
            }
            LocalProgram::Sapi => {
                let rate = ((self.rate as i32 - NORMAL_RATE as i32) / 15).clamp(-10, 10);
                let volume = (self.volume * 100.0).round() as u32;
                let select = self
                    .voice
                    .as_ref()
                    .map(|v| format!("$s.SelectVoice('{}'); ", v.replace('\'', "''")))
                    .unwrap_or_default();
                let script = format!(
                    "Add-Type -AssemblyName System.Speech; \
                     $s = New-Object System.Speech.Synthesis.SpeechSynthesizer; \
                     $s.Rate = {rate}; $s.Volume = {volume}; {select}\
                     $s.Speak('{}')",
                    text.replace('\'', "''")
                );
                vec!["-NoProfile".to_string(), "-Command".to_string(), script]
            }
        }
    }

    /// Speak through the program and wait for it to exit
    ///
    /// # Errors
    ///
    /// Returns error if the program cannot be run or fails
    pub async fn speak(&self, text: &str, language: &str) -> Result<()> {
        tracing::debug!(program = %self.path.display(), "speaking with local engine");

        let status = tokio::process::Command::new(&self.path)
            .args(self.args(text, language))
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| Error::Synthesis(format!("failed to run {}: {e}", self.path.display())))?;

        if !status.success() {
            return Err(Error::Synthesis(format!(
                "{} exited with {status}",
                self.path.display()
            )));
        }

        Ok(())
    }
}

/// Selected synthesis engine
#[derive(Debug, Clone)]
enum Engine {
    Local,
    OpenAi {
        api_key: String,
        voice: String,
        model: String,
        base_url: String,
    },
    ElevenLabs {
        api_key: String,
        voice_id: String,
        model: String,
        base_url: String,
    },
    Riva(RivaConfig),
}

/// Synthesizes speech from text and plays it
pub struct TextToSpeech {
    client: reqwest::Client,
    engine: Engine,
    local: Option<LocalVoice>,
    speed: f32,
}

impl TextToSpeech {
    /// Create from configuration
    ///
    /// Unknown engines, missing API keys and a disabled Riva fall back to
    /// the local engine with a warning.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let output = &config.speech.output;
        let engine = select_engine(config);

        tracing::info!(engine = engine_name(&engine), "text-to-speech initialized");

        #[allow(clippy::cast_precision_loss)]
        let speed = (output.rate as f32 / NORMAL_RATE as f32).clamp(0.25, 4.0);

        Self {
            client: reqwest::Client::new(),
            engine,
            local: LocalVoice::detect(output),
            speed,
        }
    }

    /// Replace the local engine (or remove it with `None`)
    #[must_use]
    pub fn with_local(mut self, local: Option<LocalVoice>) -> Self {
        self.local = local;
        self
    }

    /// Point the network engine at a different base URL
    #[must_use]
    pub fn with_base_url(mut self, url: &str) -> Self {
        let url = url.trim_end_matches('/').to_string();
        match &mut self.engine {
            Engine::Local => {}
            Engine::OpenAi { base_url, .. } | Engine::ElevenLabs { base_url, .. } => {
                *base_url = url;
            }
            Engine::Riva(riva) => riva.server_url = url,
        }
        self
    }

    /// Name of the selected engine
    #[must_use]
    pub fn engine_name(&self) -> &'static str {
        engine_name(&self.engine)
    }

    /// Synthesize `text` with a network engine
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails or the local engine is selected
    pub async fn synthesize(&self, text: &str, language: &str) -> Result<SynthesizedAudio> {
        match &self.engine {
            Engine::Local => Err(Error::Synthesis(
                "local engine speaks directly and produces no audio".to_string(),
            )),
            Engine::OpenAi {
                api_key,
                voice,
                model,
                base_url,
            } => self
                .synthesize_openai(api_key, voice, model, base_url, text)
                .await
                .map(SynthesizedAudio::Mp3),
            Engine::ElevenLabs {
                api_key,
                voice_id,
                model,
                base_url,
            } => self
                .synthesize_elevenlabs(api_key, voice_id, model, base_url, text)
                .await
                .map(SynthesizedAudio::Mp3),
            Engine::Riva(riva) => self
                .synthesize_riva(riva, text, language)
                .await
                .map(SynthesizedAudio::Wav),
        }
    }

    /// Speak `text` with the selected engine
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails
    pub async fn say(&self, text: &str, language: &str) -> Result<()> {
        if text.trim().is_empty() {
            tracing::warn!("empty text provided to text-to-speech");
            return Ok(());
        }

        tracing::debug!(text, language, engine = self.engine_name(), "speaking");

        match &self.engine {
            Engine::Local => self.speak_local(text, language).await,
            Engine::Riva(_) => {
                let spoken = match self.synthesize(text, language).await {
                    Ok(audio) => play(&audio),
                    Err(e) => Err(e),
                };
                if let Err(e) = spoken {
                    tracing::warn!(error = %e, "Riva synthesis failed, falling back to local engine");
                    return self.speak_local(text, language).await;
                }
                Ok(())
            }
            _ => {
                let audio = self.synthesize(text, language).await?;
                play(&audio)
            }
        }
    }

    async fn speak_local(&self, text: &str, language: &str) -> Result<()> {
        let local = self.local.as_ref().ok_or_else(|| {
            Error::Synthesis("no local speech program found (espeak, say or powershell)".to_string())
        })?;
        local.speak(text, language).await
    }

    async fn synthesize_openai(
        &self,
        api_key: &str,
        voice: &str,
        model: &str,
        base_url: &str,
        text: &str,
    ) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model,
            input: text,
            voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post(format!("{base_url}/audio/speech"))
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("OpenAI TTS request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;
        Ok(audio.to_vec())
    }

    async fn synthesize_elevenlabs(
        &self,
        api_key: &str,
        voice_id: &str,
        model: &str,
        base_url: &str,
        text: &str,
    ) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let request = ElevenLabsRequest {
            text,
            model_id: model,
        };

        let response = self
            .client
            .post(format!("{base_url}/text-to-speech/{voice_id}"))
            .header("xi-api-key", api_key)
            .header("Accept", "audio/mpeg")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("ElevenLabs request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!(
                "ElevenLabs TTS error {status}: {body}"
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;
        Ok(audio.to_vec())
    }

    async fn synthesize_riva(&self, riva: &RivaConfig, text: &str, language: &str) -> Result<Vec<u8>> {
        if base_code(&riva.language_code) != base_code(language) {
            tracing::debug!(
                voice_language = %riva.language_code,
                language,
                "Riva voice language differs from reply language"
            );
        }

        let form = reqwest::multipart::Form::new()
            .text("text", text.to_string())
            .text("language", riva.language_code.clone())
            .text("voice", riva.voice_name.clone())
            .text("sample_rate_hz", riva.sample_rate_hz.to_string());

        let mut request = self
            .client
            .post(format!(
                "{}/v1/audio/synthesize",
                riva.server_url.trim_end_matches('/')
            ))
            .multipart(form);
        if let Some(key) = &riva.auth_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("Riva request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("Riva TTS error {status}: {body}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;
        Ok(audio.to_vec())
    }
}

#[async_trait(?Send)]
impl SpeechOutput for TextToSpeech {
    async fn speak(&mut self, text: &str, language: &str) -> Result<()> {
        self.say(text, language).await
    }
}

fn play(audio: &SynthesizedAudio) -> Result<()> {
    let playback = AudioPlayback::new().map_err(|e| Error::Synthesis(e.to_string()))?;
    let played = match audio {
        SynthesizedAudio::Mp3(bytes) => playback.play_mp3(bytes),
        SynthesizedAudio::Wav(bytes) => playback.play_wav(bytes),
    };
    played.map_err(|e| Error::Synthesis(e.to_string()))
}

fn select_engine(config: &Config) -> Engine {
    let output = &config.speech.output;
    let keys = &config.api_keys;

    match output.engine.to_lowercase().as_str() {
        "local" | "pyttsx3" => Engine::Local,
        "openai" => match &keys.openai {
            Some(api_key) => Engine::OpenAi {
                api_key: api_key.clone(),
                voice: output
                    .voice_id
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OPENAI_VOICE.to_string()),
                model: output
                    .model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                base_url: OPENAI_BASE_URL.to_string(),
            },
            None => {
                tracing::warn!("OPENAI_API_KEY not set, falling back to local engine");
                Engine::Local
            }
        },
        "elevenlabs" => match &keys.elevenlabs {
            Some(api_key) => Engine::ElevenLabs {
                api_key: api_key.clone(),
                voice_id: output
                    .voice_id
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ELEVENLABS_VOICE.to_string()),
                model: output
                    .model
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ELEVENLABS_MODEL.to_string()),
                base_url: ELEVENLABS_BASE_URL.to_string(),
            },
            None => {
                tracing::warn!("ELEVENLABS_API_KEY not set, falling back to local engine");
                Engine::Local
            }
        },
        "riva" => {
            let riva = config.riva();
            if riva.enabled {
                Engine::Riva(riva.clone())
            } else {
                tracing::warn!("Riva engine selected but riva.enabled is false, using local engine");
                Engine::Local
            }
        }
        other => {
            tracing::warn!(engine = other, "unknown speech engine, using local engine");
            Engine::Local
        }
    }
}

const fn engine_name(engine: &Engine) -> &'static str {
    match engine {
        Engine::Local => "local",
        Engine::OpenAi { .. } => "openai",
        Engine::ElevenLabs { .. } => "elevenlabs",
        Engine::Riva(_) => "riva",
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn config_with_engine(engine: &str) -> Config {
        let mut config = Config::default();
        config.speech.output.engine = engine.to_string();
        config
    }

    #[test]
    fn test_engine_fallbacks() {
        assert_eq!(TextToSpeech::from_config(&config_with_engine("pyttsx3")).engine_name(), "local");
        assert_eq!(TextToSpeech::from_config(&config_with_engine("festival")).engine_name(), "local");
        assert_eq!(TextToSpeech::from_config(&config_with_engine("openai")).engine_name(), "local");
        assert_eq!(TextToSpeech::from_config(&config_with_engine("riva")).engine_name(), "local");

        let mut config = config_with_engine("riva");
        config.speech.riva.enabled = true;
        assert_eq!(TextToSpeech::from_config(&config).engine_name(), "riva");

        let mut config = config_with_engine("openai");
        config.api_keys.openai = Some("sk-test".to_string());
        assert_eq!(TextToSpeech::from_config(&config).engine_name(), "openai");
    }

    #[test]
    fn test_espeak_args() {
        let output = SpeechOutputConfig::default();
        let voice = LocalVoice::new(LocalProgram::Espeak, PathBuf::from("espeak-ng"), &output);

        let args = voice.args("hola", "es-ES");
        assert_eq!(args, ["-s", "150", "-a", "100", "-v", "es", "hola"]);
    }

    #[test]
    fn test_sapi_escapes_quotes() {
        let output = SpeechOutputConfig {
            rate: 180,
            volume: 0.5,
            ..SpeechOutputConfig::default()
        };
        let voice = LocalVoice::new(LocalProgram::Sapi, PathBuf::from("powershell"), &output);

        let args = voice.args("it's fine", "en");
        let script = &args[2];
        assert!(script.contains("$s.Rate = 2;"));
        assert!(script.contains("$s.Volume = 50;"));
        assert!(script.contains("Speak('it''s fine')"));
    }

    #[tokio::test]
    async fn test_empty_text_is_ignored() {
        let tts = TextToSpeech::from_config(&Config::default()).with_local(None);
        assert!(tts.say("   ", "en").await.is_ok());
        assert!(tts.say("hello", "en").await.is_err());
    }

    /// Whether `pid` is still running (zombies count as gone)
    #[cfg(unix)]
    fn is_running(pid: &str) -> bool {
        std::fs::read_to_string(format!("/proc/{pid}/stat")).is_ok_and(|stat| {
            stat.rsplit(')')
                .next()
                .is_some_and(|rest| !rest.trim_start().starts_with('Z'))
        })
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_interrupted_local_speech_is_killed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let program = dir.path().join("slow-say");
        std::fs::write(
            &program,
            format!("#!/bin/sh\necho $$ > '{}'\nexec sleep 30\n", pid_file.display()),
        )
        .unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        let voice = LocalVoice::new(LocalProgram::Say, program, &SpeechOutputConfig::default());
        let spoken =
            tokio::time::timeout(Duration::from_millis(500), voice.speak("hello", "en")).await;
        assert!(spoken.is_err(), "speech should still be running");

        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
        let mut stopped = false;
        for _ in 0..40 {
            if !is_running(&pid) {
                stopped = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(stopped, "speech process {pid} outlived the dropped turn");
    }
}
