//! Speech input sources: the microphone and a line-based text stream

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

use super::capture::{AudioCapture, SAMPLE_RATE, resample, samples_to_wav};
use super::segmenter::{Endpointing, Segment, Segmenter};
use super::stt::SpeechToText;
use super::wake_word::WakeWordDetector;
use crate::config::Config;
use crate::{Error, Result};

/// How often the capture buffer is drained
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One recognized utterance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Heard {
    /// Recognized text
    pub text: String,
    /// Language code reported by the recognizer
    pub language: Option<String>,
    /// Captured audio at 16kHz, when it came from a microphone
    pub audio: Option<Vec<f32>>,
}

impl Heard {
    /// Utterance with text only
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Source of user utterances
#[async_trait(?Send)]
pub trait SpeechInput {
    /// Capture and recognize one query
    ///
    /// Fails with `NoSpeech` when nothing is said before the timeout,
    /// `Unintelligible` or `Recognition` when recognition fails and
    /// `InputClosed` when the source is exhausted.
    async fn listen(&mut self) -> Result<Heard>;

    /// Capture one short phrase and report it if it contains the wake word
    async fn listen_for_wake_word(&mut self, wake_word: &WakeWordDetector)
    -> Result<Option<Heard>>;

    /// Whether queries must be preceded by the wake word
    fn requires_wake_word(&self) -> bool {
        true
    }

    /// Drop audio captured while the assistant was speaking
    fn discard_pending(&mut self) {}
}

/// Microphone input recognized by a speech-to-text service
pub struct MicrophoneListener {
    capture: AudioCapture,
    stt: SpeechToText,
    query: Endpointing,
    wake_phrase: Endpointing,
    language_hint: Option<String>,
}

impl MicrophoneListener {
    /// Open the configured microphone and start capturing
    ///
    /// # Errors
    ///
    /// Returns error if the microphone cannot be opened or the recognizer
    /// is misconfigured
    pub fn from_config(config: &Config) -> Result<Self> {
        let input = &config.speech.input;
        let stt = SpeechToText::from_config(config)?;
        let mut capture = AudioCapture::new(input.device_index)?;
        capture.start()?;

        let language_hint = (!config.language.auto_detect).then(|| config.language.default.clone());

        tracing::info!(
            provider = %input.provider,
            capture_rate = capture.sample_rate(),
            auto_detect = config.language.auto_detect,
            "microphone listener ready"
        );

        Ok(Self {
            capture,
            stt,
            query: Endpointing::query(input),
            wake_phrase: Endpointing::wake_phrase(input),
            language_hint,
        })
    }

    /// Wait for one phrase and return it at 16kHz
    async fn capture_phrase(&self, endpointing: Endpointing) -> Result<Vec<f32>> {
        let rate = self.capture.sample_rate();
        let mut segmenter = Segmenter::new(endpointing, rate);
        self.capture.clear_buffer();

        loop {
            tokio::time::sleep(POLL_INTERVAL).await;

            match segmenter.process(&self.capture.take_buffer()) {
                Segment::Pending => {}
                Segment::TimedOut => return Err(Error::NoSpeech),
                Segment::Complete(phrase) => return resample(&phrase, rate, SAMPLE_RATE),
            }
        }
    }

    async fn recognize(&self, audio: Vec<f32>) -> Result<Heard> {
        let wav = samples_to_wav(&audio, SAMPLE_RATE)?;
        let transcription = self
            .stt
            .transcribe(&wav, self.language_hint.as_deref())
            .await?;

        Ok(Heard {
            text: transcription.text,
            language: transcription.language,
            audio: Some(audio),
        })
    }
}

#[async_trait(?Send)]
impl SpeechInput for MicrophoneListener {
    async fn listen(&mut self) -> Result<Heard> {
        tracing::debug!("listening for query");
        let audio = self.capture_phrase(self.query).await?;
        self.recognize(audio).await
    }

    async fn listen_for_wake_word(
        &mut self,
        wake_word: &WakeWordDetector,
    ) -> Result<Option<Heard>> {
        let audio = self.capture_phrase(self.wake_phrase).await?;
        let heard = self.recognize(audio).await?;
        tracing::debug!(transcript = %heard.text, "heard while idle");

        Ok(wake_word.check_wake_word(&heard.text).then_some(heard))
    }

    fn discard_pending(&mut self) {
        self.capture.clear_buffer();
    }
}

/// Typed input, one utterance per line
pub struct TextInput<R> {
    lines: Lines<R>,
    prompt: bool,
}

impl TextInput<BufReader<Stdin>> {
    /// Read from standard input with a `You: ` prompt
    #[must_use]
    pub fn stdin() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            prompt: true,
        }
    }
}

impl<R: AsyncBufRead + Unpin> TextInput<R> {
    /// Read lines from any buffered reader without prompting
    #[must_use]
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            prompt: false,
        }
    }

    async fn next_line(&mut self) -> Result<Heard> {
        if self.prompt {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(b"You: ").await?;
            stdout.flush().await?;
        }

        let line = self.lines.next_line().await?.ok_or(Error::InputClosed)?;
        let line = line.trim();
        if line.is_empty() {
            return Err(Error::NoSpeech);
        }

        Ok(Heard::text(line))
    }
}

#[async_trait(?Send)]
impl<R: AsyncBufRead + Unpin> SpeechInput for TextInput<R> {
    async fn listen(&mut self) -> Result<Heard> {
        self.next_line().await
    }

    async fn listen_for_wake_word(
        &mut self,
        wake_word: &WakeWordDetector,
    ) -> Result<Option<Heard>> {
        let heard = self.next_line().await?;
        Ok(wake_word.check_wake_word(&heard.text).then_some(heard))
    }

    fn requires_wake_word(&self) -> bool {
        false
    }
}
